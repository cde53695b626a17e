// Lock table: per-resource owner sets and wait queues

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::common::resource::{Resource, ResourceKind};
use crate::common::types::{ResourceId, TxnId};
use crate::transaction::concurrency::error::{LockError, Result};
use crate::transaction::concurrency::lock_mode::{compatible, compatible_with_all, LockType, Request};
use crate::transaction::concurrency::transaction::Transaction;

/// A request parked in a resource's wait queue
#[derive(Debug, Clone)]
pub(crate) struct Waiter {
    pub request: Request,
    /// S -> X upgrade; the old S entry is dropped when this is granted
    pub upgrade: bool,
    pub txn: Arc<Transaction>,
}

/// Lock state of one resource
#[derive(Debug)]
pub struct ResourceLockState {
    kind: ResourceKind,
    parent: Option<ResourceId>,
    owners: Vec<Request>,
    wait_queue: VecDeque<Waiter>,
}

impl ResourceLockState {
    fn new(resource: &Resource) -> Self {
        Self {
            kind: resource.kind(),
            parent: resource.parent_table(),
            owners: Vec::new(),
            wait_queue: VecDeque::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Parent table of a page resource
    pub fn parent(&self) -> Option<ResourceId> {
        self.parent
    }

    pub fn owners(&self) -> &[Request] {
        &self.owners
    }

    /// Queued requests in grant order
    pub fn waiting(&self) -> impl Iterator<Item = &Request> {
        self.wait_queue.iter().map(|waiter| &waiter.request)
    }

    /// The lock `txn_id` currently owns here, if any
    pub fn owned_by(&self, txn_id: TxnId) -> Option<Request> {
        self.owners.iter().find(|owner| owner.txn_id == txn_id).copied()
    }

    pub fn holds(&self, txn_id: TxnId, lock_type: LockType) -> bool {
        self.owners.contains(&Request::new(txn_id, lock_type))
    }

    pub fn is_compatible(&self, request: &Request) -> bool {
        compatible_with_all(&self.owners, request)
    }

    pub fn is_idle(&self) -> bool {
        self.owners.is_empty() && self.wait_queue.is_empty()
    }

    /// Add `request` to the owners. An upgrade replaces the transaction's S entry.
    pub(crate) fn grant(&mut self, request: Request, upgrade: bool) {
        if upgrade {
            self.owners
                .retain(|owner| !(owner.txn_id == request.txn_id && owner.lock_type == LockType::S));
        }
        self.owners.push(request);
    }

    /// Queue a waiter: upgrades jump to the head, everything else is FIFO
    pub(crate) fn enqueue(&mut self, waiter: Waiter) {
        if waiter.upgrade {
            self.wait_queue.push_front(waiter);
        } else {
            self.wait_queue.push_back(waiter);
        }
    }

    pub(crate) fn remove_owner(&mut self, txn_id: TxnId) -> Option<Request> {
        let pos = self.owners.iter().position(|owner| owner.txn_id == txn_id)?;
        Some(self.owners.swap_remove(pos))
    }

    /// Grant the longest compatible prefix of the wait queue.
    ///
    /// Stops at the first queued request that conflicts with the owners,
    /// including owners granted earlier in the same pass. Returns the granted
    /// waiters so the caller can wake them.
    pub(crate) fn promote(&mut self) -> Vec<Waiter> {
        let mut granted = Vec::new();
        while let Some(head) = self.wait_queue.front() {
            if !self.is_compatible(&head.request) {
                break;
            }
            if let Some(waiter) = self.wait_queue.pop_front() {
                self.grant(waiter.request, waiter.upgrade);
                granted.push(waiter);
            }
        }
        granted
    }
}

/// Owners and waiters of one resource at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    pub resource_id: ResourceId,
    pub kind: ResourceKind,
    pub owners: Vec<Request>,
    pub waiting: Vec<Request>,
}

/// Point-in-time copy of the whole lock table, sorted by resource id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockTableSnapshot {
    pub resources: Vec<ResourceSnapshot>,
}

impl LockTableSnapshot {
    pub fn resource(&self, resource_id: ResourceId) -> Option<&ResourceSnapshot> {
        self.resources.iter().find(|r| r.resource_id == resource_id)
    }
}

/// Mapping from resource to its lock state. Entries are created on first
/// reference and never removed.
#[derive(Debug, Default)]
pub struct LockTable {
    states: HashMap<ResourceId, ResourceLockState>,
    /// Resource each queued transaction is waiting on
    queued: HashMap<TxnId, ResourceId>,
}

impl LockTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: HashMap::with_capacity(capacity),
            queued: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, resource_id: ResourceId) -> Option<&ResourceLockState> {
        self.states.get(&resource_id)
    }

    pub(crate) fn get_mut(&mut self, resource_id: ResourceId) -> Option<&mut ResourceLockState> {
        self.states.get_mut(&resource_id)
    }

    /// Lock state for `resource`, created empty on first reference
    pub(crate) fn state_mut(&mut self, resource: &Resource) -> &mut ResourceLockState {
        self.states
            .entry(resource.id())
            .or_insert_with(|| ResourceLockState::new(resource))
    }

    /// Queue `waiter` on `resource` and remember where its transaction waits
    pub(crate) fn enqueue(&mut self, resource: &Resource, waiter: Waiter) {
        self.queued.insert(waiter.request.txn_id, resource.id());
        self.state_mut(resource).enqueue(waiter);
    }

    /// Promote the wait queue of `resource_id`; granted transactions are no
    /// longer queued
    pub(crate) fn promote(&mut self, resource_id: ResourceId) -> Vec<Waiter> {
        let granted = self
            .states
            .get_mut(&resource_id)
            .map(|state| state.promote())
            .unwrap_or_default();
        for waiter in &granted {
            self.queued.remove(&waiter.request.txn_id);
        }
        granted
    }

    /// The resource `txn_id` has a queued request on, if any
    pub fn waiting_on(&self, txn_id: TxnId) -> Option<ResourceId> {
        self.queued.get(&txn_id).copied()
    }

    /// The lock `txn_id` owns on `resource_id`, if any
    pub fn owned_by(&self, txn_id: TxnId, resource_id: ResourceId) -> Option<Request> {
        self.get(resource_id).and_then(|state| state.owned_by(txn_id))
    }

    pub fn holds(&self, txn_id: TxnId, resource_id: ResourceId, lock_type: LockType) -> bool {
        self.get(resource_id)
            .is_some_and(|state| state.holds(txn_id, lock_type))
    }

    /// Every lock owned by `txn_id`, sorted by resource id
    pub fn locks_held(&self, txn_id: TxnId) -> Vec<(ResourceId, ResourceKind, LockType)> {
        let mut held: Vec<_> = self
            .states
            .iter()
            .filter_map(|(&id, state)| state.owned_by(txn_id).map(|r| (id, state.kind, r.lock_type)))
            .collect();
        held.sort_by_key(|&(id, _, _)| id);
        held
    }

    pub fn snapshot(&self) -> LockTableSnapshot {
        let mut resources: Vec<_> = self
            .states
            .iter()
            .map(|(&resource_id, state)| {
                let mut owners = state.owners.clone();
                owners.sort_by_key(|owner| owner.txn_id);
                ResourceSnapshot {
                    resource_id,
                    kind: state.kind,
                    owners,
                    waiting: state.waiting().copied().collect(),
                }
            })
            .collect();
        resources.sort_by_key(|r| r.resource_id);
        LockTableSnapshot { resources }
    }

    /// Verify that owners are pairwise compatible, that no transaction owns
    /// two entries on one resource, and that every page lock is covered by
    /// the matching intent lock on its table.
    pub fn check_invariants(&self) -> Result<()> {
        for (&resource_id, state) in &self.states {
            for (i, a) in state.owners.iter().enumerate() {
                for b in &state.owners[i + 1..] {
                    if a.txn_id == b.txn_id {
                        return Err(LockError::InvariantViolation(format!(
                            "transaction {} owns {} and {} on resource {}",
                            a.txn_id, a.lock_type, b.lock_type, resource_id
                        )));
                    }
                    if !compatible(a, b) || !compatible(b, a) {
                        return Err(LockError::InvariantViolation(format!(
                            "incompatible owners {:?} and {:?} on resource {}",
                            a, b, resource_id
                        )));
                    }
                }
            }

            if state.kind != ResourceKind::Page {
                continue;
            }
            let table_id = state.parent.unwrap_or_default();
            for owner in &state.owners {
                let parent = self.owned_by(owner.txn_id, table_id).map(|r| r.lock_type);
                let covered = match owner.lock_type {
                    LockType::S => matches!(parent, Some(LockType::IS) | Some(LockType::IX)),
                    LockType::X => parent == Some(LockType::IX),
                    LockType::IS | LockType::IX => false,
                };
                if !covered {
                    return Err(LockError::InvariantViolation(format!(
                        "transaction {} holds {} on page {} but {:?} on table {}",
                        owner.txn_id, owner.lock_type, resource_id, parent, table_id
                    )));
                }
            }
        }
        Ok(())
    }
}
