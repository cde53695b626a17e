use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{Transaction, TransactionError};

/// Transaction manager - responsible for creating and tracking transactions
pub struct TransactionManager {
    /// Next transaction ID to assign
    next_txn_id: AtomicU32,

    /// Lock manager the transactions lock through
    lock_manager: Arc<LockManager>,

    /// Active transactions map (txn_id -> Transaction)
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1), // Start from 1
            lock_manager,
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Begin a new transaction
    pub fn begin_transaction(&self) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id));
        self.active_transactions.lock().insert(txn_id, txn.clone());
        debug!("Began transaction {}", txn_id);
        txn
    }

    /// Commit a transaction, releasing all of its locks.
    /// Returns the number of locks released.
    pub fn commit_transaction(&self, txn_id: TxnId) -> Result<usize, TransactionError> {
        let released = self.finish(txn_id)?;
        debug!("Committed transaction {} ({} locks released)", txn_id, released);
        Ok(released)
    }

    /// Abort a transaction, releasing all of its locks.
    /// Returns the number of locks released.
    pub fn abort_transaction(&self, txn_id: TxnId) -> Result<usize, TransactionError> {
        let released = self.finish(txn_id)?;
        debug!("Aborted transaction {} ({} locks released)", txn_id, released);
        Ok(released)
    }

    /// Release every lock and forget the transaction. A transaction that is
    /// still waiting for a lock stays active.
    fn finish(&self, txn_id: TxnId) -> Result<usize, TransactionError> {
        let txn = self
            .get_transaction(txn_id)
            .ok_or(TransactionError::NotFound(txn_id))?;

        let released = self.lock_manager.release_all(&txn)?;
        self.active_transactions.lock().remove(&txn_id);
        Ok(released)
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    /// Check if a transaction exists
    pub fn transaction_exists(&self, txn_id: TxnId) -> bool {
        self.active_transactions.lock().contains_key(&txn_id)
    }

    /// Get all active transaction IDs
    pub fn get_active_transaction_ids(&self) -> Vec<TxnId> {
        let mut ids: Vec<_> = self.active_transactions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
