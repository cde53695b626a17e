// Intent-lock checks for page requests
//
// A page may only carry S or X, and only while the requesting transaction
// holds IS/IX (for S) or IX (for X) on the page's table.

use log::trace;

use crate::common::resource::{Resource, ResourceKind};
use crate::common::types::TxnId;
use crate::transaction::concurrency::error::{LockError, Result};
use crate::transaction::concurrency::lock_mode::LockType;
use crate::transaction::concurrency::lock_table::LockTable;

/// Check that `txn_id` may request `lock_type` on `resource` given the locks
/// it already owns on the resource's ancestors. Never mutates the table.
pub fn validate(table: &LockTable, txn_id: TxnId, resource: &Resource, lock_type: LockType) -> Result<()> {
    if resource.kind() != ResourceKind::Page {
        return Ok(());
    }

    if lock_type.is_intent() {
        return Err(LockError::IllegalIntentOnLeaf {
            resource_id: resource.id(),
            lock_type,
        });
    }

    let missing = |table_id| LockError::MissingParentLock {
        txn_id,
        page_id: resource.id(),
        table_id,
        lock_type,
    };

    // A page without a table can never be covered
    let table_id = resource.parent_table().ok_or_else(|| missing(resource.id()))?;
    let parent = table.owned_by(txn_id, table_id).map(|owner| owner.lock_type);
    trace!(
        "Transaction {} requests {} on page {}, holds {:?} on table {}",
        txn_id, lock_type, resource.id(), parent, table_id
    );

    let covered = match lock_type {
        LockType::S => matches!(parent, Some(LockType::IS) | Some(LockType::IX)),
        LockType::X => parent == Some(LockType::IX),
        LockType::IS | LockType::IX => false,
    };

    if covered {
        Ok(())
    } else {
        Err(missing(table_id))
    }
}
