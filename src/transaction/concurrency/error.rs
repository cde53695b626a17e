use thiserror::Error;

use crate::common::types::{ResourceId, TxnId};
use crate::transaction::concurrency::lock_mode::LockType;

/// Errors that can occur while acquiring or releasing locks.
///
/// Every variant is reported before the lock table is touched, so a failed
/// call never leaves a partially applied grant or queue entry behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Transaction {0} is blocked waiting for a lock")]
    BlockedTransaction(TxnId),

    #[error("Transaction {txn_id} already holds {lock_type} on resource {resource_id}")]
    DuplicateLock {
        txn_id: TxnId,
        resource_id: ResourceId,
        lock_type: LockType,
    },

    #[error("Transaction {txn_id} cannot downgrade {held} to {requested} on resource {resource_id}")]
    IllegalDowngrade {
        txn_id: TxnId,
        resource_id: ResourceId,
        held: LockType,
        requested: LockType,
    },

    #[error("Transaction {txn_id} cannot convert {held} to {requested} on resource {resource_id}")]
    UnsupportedConversion {
        txn_id: TxnId,
        resource_id: ResourceId,
        held: LockType,
        requested: LockType,
    },

    #[error("Intent lock {lock_type} requested directly on page {resource_id}")]
    IllegalIntentOnLeaf {
        resource_id: ResourceId,
        lock_type: LockType,
    },

    #[error("Transaction {txn_id} lacks the intent lock on table {table_id} required for {lock_type} on page {page_id}")]
    MissingParentLock {
        txn_id: TxnId,
        page_id: ResourceId,
        table_id: ResourceId,
        lock_type: LockType,
    },

    #[error("Resource {0} has no locks on it")]
    UnlockedResource(ResourceId),

    #[error("Transaction {txn_id} does not hold a lock on resource {resource_id}")]
    LockNotHeld {
        txn_id: TxnId,
        resource_id: ResourceId,
    },

    #[error("Transaction {txn_id} still holds a lock on page {page_id} of table {table_id}")]
    NonBottomUpRelease {
        txn_id: TxnId,
        table_id: ResourceId,
        page_id: ResourceId,
    },

    #[error("Lock table invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;
