// Transaction handle seen by the lock manager
//
// A transaction is either running or parked waiting for a lock. The lock
// manager flips it to Waiting while the lock table is still locked and parks
// the calling thread only after the table lock is dropped; promotion flips it
// back to Running and signals the condition variable.

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::TxnId;
use crate::transaction::concurrency::error::{self, LockError};

/// Lock-wait status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Running,
    Waiting,
}

/// Errors that can occur during transaction processing
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} not found")]
    NotFound(TxnId),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Transaction - the unit on whose behalf locks are held
#[derive(Debug)]
pub struct Transaction {
    /// Transaction ID
    id: TxnId,

    /// Current lock-wait status
    status: Mutex<TransactionStatus>,

    /// Signalled whenever the status returns to Running
    wakeup: Condvar,
}

impl Transaction {
    /// Create a new running transaction with the given ID
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            id: txn_id,
            status: Mutex::new(TransactionStatus::Running),
            wakeup: Condvar::new(),
        }
    }

    /// Get transaction ID
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Get transaction status
    pub fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    pub fn is_waiting(&self) -> bool {
        self.status() == TransactionStatus::Waiting
    }

    /// Suspend the calling thread until another thread calls `wake`.
    ///
    /// Only valid while Running; a Waiting transaction fails with
    /// `BlockedTransaction`.
    pub fn sleep(&self) -> Result<()> {
        self.suspend()?;
        self.wait_until_running();
        Ok(())
    }

    /// Resume a sleeping transaction. No-op when already Running.
    pub fn wake(&self) {
        let mut status = self.status.lock();
        if *status == TransactionStatus::Waiting {
            *status = TransactionStatus::Running;
            self.wakeup.notify_all();
        }
    }

    /// First half of `sleep`: mark the transaction Waiting without blocking
    pub(crate) fn suspend(&self) -> error::Result<()> {
        let mut status = self.status.lock();
        if *status == TransactionStatus::Waiting {
            return Err(LockError::BlockedTransaction(self.id));
        }
        *status = TransactionStatus::Waiting;
        Ok(())
    }

    /// Second half of `sleep`: block until the status is Running again
    pub(crate) fn wait_until_running(&self) {
        let mut status = self.status.lock();
        while *status == TransactionStatus::Waiting {
            self.wakeup.wait(&mut status);
        }
    }
}
