// Granlock Transaction Management Module

pub mod concurrency;

// Public exports
pub use concurrency::{
    LockError, LockManager, LockManagerConfig, LockType, Request, Transaction, TransactionError,
    TransactionManager, TransactionStatus,
};
