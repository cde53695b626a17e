// Granlock - multi-granularity lock manager

pub mod common;
pub mod transaction;

// Re-export key items for convenient access
pub use common::{Resource, ResourceId, ResourceKind, TxnId};
pub use transaction::concurrency::{LockTableSnapshot, ResourceSnapshot};
pub use transaction::{
    LockError, LockManager, LockManagerConfig, LockType, Request, Transaction, TransactionError,
    TransactionManager, TransactionStatus,
};
