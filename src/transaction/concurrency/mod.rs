// Transaction concurrency module exports

pub mod error;
pub mod hierarchy;
pub mod lock_manager;
pub mod lock_mode;
pub mod lock_table;
pub mod transaction;
pub mod transaction_manager;

// Public exports
pub use error::LockError;
pub use lock_manager::{LockManager, LockManagerConfig};
pub use lock_mode::{compatible, LockType, Request};
pub use lock_table::{LockTableSnapshot, ResourceSnapshot};
pub use transaction::{Transaction, TransactionError, TransactionStatus};
pub use transaction_manager::TransactionManager;
