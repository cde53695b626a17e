// Multi-granularity lock manager
//
// One mutex guards the whole lock table. Acquire validates, then either grants
// or queues the request and parks the calling thread; release removes the
// owner entry and promotes the compatible prefix of the wait queue.

use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::common::resource::{Resource, ResourceKind};
use crate::common::types::{ResourceId, TxnId};
use crate::transaction::concurrency::error::{LockError, Result};
use crate::transaction::concurrency::hierarchy;
use crate::transaction::concurrency::lock_mode::{LockType, Request};
use crate::transaction::concurrency::lock_table::{LockTable, LockTableSnapshot, Waiter};
use crate::transaction::concurrency::transaction::Transaction;

/// Configuration for the lock manager
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// Number of resources the lock table is sized for up front
    pub initial_capacity: usize,

    /// Check the table invariants after every acquire/release. Violations
    /// are logged, and panic in debug builds.
    pub verify_invariants: bool,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            verify_invariants: false,
        }
    }
}

/// Lock manager - grants, queues and releases locks on behalf of transactions
pub struct LockManager {
    table: Mutex<LockTable>,
    config: LockManagerConfig,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    /// Create a lock manager with the default configuration
    pub fn new() -> Self {
        Self::with_config(LockManagerConfig::default())
    }

    pub fn with_config(config: LockManagerConfig) -> Self {
        Self {
            table: Mutex::new(LockTable::with_capacity(config.initial_capacity)),
            config,
        }
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    /// Acquire `lock_type` on `resource` for `txn`.
    ///
    /// Blocks the calling thread while the request conflicts with the current
    /// owners. Returns once the lock is held; validation failures return
    /// immediately without touching the lock table.
    pub fn acquire(&self, txn: &Arc<Transaction>, resource: &Resource, lock_type: LockType) -> Result<()> {
        let mut table = self.table.lock();

        let upgrade = Self::validate_acquire(&table, txn, resource, lock_type).inspect_err(|e| {
            warn!("Rejected {} on {} for transaction {}: {}", lock_type, resource, txn.id(), e);
        })?;

        let request = Request::new(txn.id(), lock_type);
        let state = table.state_mut(resource);
        if state.is_compatible(&request) {
            state.grant(request, upgrade);
            debug!("Granted {} on {} to transaction {}", lock_type, resource, txn.id());
            self.verify(&table);
            return Ok(());
        }

        // Waiting must be set while the table is still locked; a promotion
        // may run before the park below
        txn.suspend()?;
        table.enqueue(
            resource,
            Waiter {
                request,
                upgrade,
                txn: txn.clone(),
            },
        );
        debug!(
            "Queued {} on {} for transaction {}{}",
            lock_type,
            resource,
            txn.id(),
            if upgrade { " (upgrade)" } else { "" }
        );
        self.verify(&table);
        drop(table);

        // Only promotion dequeues a request. A wake from anywhere else finds
        // the request still queued and parks again.
        loop {
            txn.wait_until_running();
            let table = self.table.lock();
            if table.waiting_on(txn.id()).is_none() {
                break;
            }
            debug!("Transaction {} woken while still queued on {}", txn.id(), resource);
            // Fails only if something already marked it Waiting again
            let _ = txn.suspend();
        }
        debug!("Transaction {} resumed holding {} on {}", txn.id(), lock_type, resource);
        Ok(())
    }

    /// A transaction is blocked while it is marked Waiting or still has a
    /// request in some wait queue
    fn check_not_blocked(table: &LockTable, txn: &Transaction) -> Result<()> {
        if txn.is_waiting() || table.waiting_on(txn.id()).is_some() {
            return Err(LockError::BlockedTransaction(txn.id()));
        }
        Ok(())
    }

    /// Ownership and hierarchy checks for an acquire. Returns whether the
    /// request is an S -> X upgrade.
    fn validate_acquire(table: &LockTable, txn: &Transaction, resource: &Resource, lock_type: LockType) -> Result<bool> {
        Self::check_not_blocked(table, txn)?;

        let mut upgrade = false;
        if let Some(owned) = table.owned_by(txn.id(), resource.id()) {
            match (owned.lock_type, lock_type) {
                (held, requested) if held == requested => {
                    return Err(LockError::DuplicateLock {
                        txn_id: txn.id(),
                        resource_id: resource.id(),
                        lock_type,
                    });
                }
                (LockType::X, LockType::S) | (LockType::IX, LockType::IS) => {
                    return Err(LockError::IllegalDowngrade {
                        txn_id: txn.id(),
                        resource_id: resource.id(),
                        held: owned.lock_type,
                        requested: lock_type,
                    });
                }
                (LockType::S, LockType::X) => upgrade = true,
                (held, requested) => {
                    return Err(LockError::UnsupportedConversion {
                        txn_id: txn.id(),
                        resource_id: resource.id(),
                        held,
                        requested,
                    });
                }
            }
        }

        hierarchy::validate(table, txn.id(), resource, lock_type)?;
        Ok(upgrade)
    }

    /// Release the lock `txn` owns on `resource` and promote waiters.
    pub fn release(&self, txn: &Transaction, resource: &Resource) -> Result<()> {
        let mut table = self.table.lock();

        Self::validate_release(&table, txn, resource).inspect_err(|e| {
            warn!("Rejected release of {} by transaction {}: {}", resource, txn.id(), e);
        })?;

        self.release_owner(&mut table, txn, resource.id());
        self.verify(&table);
        Ok(())
    }

    fn validate_release(table: &LockTable, txn: &Transaction, resource: &Resource) -> Result<()> {
        Self::check_not_blocked(table, txn)?;

        let state = table
            .get(resource.id())
            .ok_or(LockError::UnlockedResource(resource.id()))?;

        if state.owned_by(txn.id()).is_none() {
            return Err(LockError::LockNotHeld {
                txn_id: txn.id(),
                resource_id: resource.id(),
            });
        }

        if resource.kind() == ResourceKind::Table {
            if let Some(page_id) = Self::held_child_page(table, txn.id(), resource) {
                return Err(LockError::NonBottomUpRelease {
                    txn_id: txn.id(),
                    table_id: resource.id(),
                    page_id,
                });
            }
        }

        Ok(())
    }

    /// A page of `table_resource` still locked by `txn_id`, looking at both
    /// the table's declared pages and pages the lock table has seen under it
    fn held_child_page(table: &LockTable, txn_id: TxnId, table_resource: &Resource) -> Option<ResourceId> {
        let declared = table_resource
            .child_pages()
            .iter()
            .copied()
            .find(|&page_id| table.owned_by(txn_id, page_id).is_some());

        declared.or_else(|| {
            table
                .locks_held(txn_id)
                .into_iter()
                .filter(|&(_, kind, _)| kind == ResourceKind::Page)
                .map(|(page_id, _, _)| page_id)
                .find(|&page_id| {
                    table
                        .get(page_id)
                        .is_some_and(|state| state.parent() == Some(table_resource.id()))
                })
        })
    }

    /// Remove `txn`'s owner entry on `resource_id`, wake it, and grant the
    /// compatible prefix of the wait queue. Callers have already validated.
    fn release_owner(&self, table: &mut LockTable, txn: &Transaction, resource_id: ResourceId) {
        let Some(state) = table.get_mut(resource_id) else {
            return;
        };

        if let Some(released) = state.remove_owner(txn.id()) {
            debug!("Released {} on resource {} by transaction {}", released.lock_type, resource_id, txn.id());
        }
        txn.wake();

        for waiter in table.promote(resource_id) {
            debug!(
                "Promoted {} on resource {} for transaction {}",
                waiter.request.lock_type, resource_id, waiter.request.txn_id
            );
            waiter.txn.wake();
        }
    }

    /// Release every lock `txn` owns, pages first, then tables, then
    /// databases. Returns the number of locks released.
    pub fn release_all(&self, txn: &Transaction) -> Result<usize> {
        let mut table = self.table.lock();
        Self::check_not_blocked(&table, txn)?;

        let mut held = table.locks_held(txn.id());
        held.sort_by_key(|&(id, kind, _)| {
            let level = match kind {
                ResourceKind::Page => 0,
                ResourceKind::Table => 1,
                ResourceKind::Database => 2,
            };
            (level, id)
        });

        for &(resource_id, _, _) in &held {
            self.release_owner(&mut table, txn, resource_id);
        }
        debug!("Released {} locks held by transaction {}", held.len(), txn.id());
        self.verify(&table);
        Ok(held.len())
    }

    /// Whether `txn` currently owns `lock_type` on `resource`. A resource that
    /// was never locked holds nothing.
    pub fn holds(&self, txn: &Transaction, resource: &Resource, lock_type: LockType) -> bool {
        self.table.lock().holds(txn.id(), resource.id(), lock_type)
    }

    /// Every lock owned by `txn_id`, sorted by resource id
    pub fn locks_held(&self, txn_id: TxnId) -> Vec<(ResourceId, LockType)> {
        self.table
            .lock()
            .locks_held(txn_id)
            .into_iter()
            .map(|(id, _, lock_type)| (id, lock_type))
            .collect()
    }

    /// Current owners of a resource
    pub fn owners(&self, resource_id: ResourceId) -> Vec<Request> {
        self.table
            .lock()
            .get(resource_id)
            .map(|state| state.owners().to_vec())
            .unwrap_or_default()
    }

    /// Queued requests on a resource, in the order they will be considered
    pub fn waiting_requests(&self, resource_id: ResourceId) -> Vec<Request> {
        self.table
            .lock()
            .get(resource_id)
            .map(|state| state.waiting().copied().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> LockTableSnapshot {
        self.table.lock().snapshot()
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.table.lock().check_invariants()
    }

    /// Check the table invariants when configured to. Violations are logged,
    /// and panic in debug builds.
    fn verify(&self, table: &LockTable) {
        if !self.config.verify_invariants {
            return;
        }
        if let Err(e) = table.check_invariants() {
            error!("{}", e);
            debug_assert!(false, "{}", e);
        }
    }
}
