// Lock modes and the multi-granularity compatibility matrix

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::common::types::TxnId;

/// Lock modes supported by the lock manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LockType {
    /// Shared
    S,
    /// Exclusive
    X,
    /// Intent shared
    IS,
    /// Intent exclusive
    IX,
}

impl LockType {
    pub const ALL: [LockType; 4] = [LockType::IS, LockType::IX, LockType::S, LockType::X];

    pub fn is_intent(self) -> bool {
        matches!(self, LockType::IS | LockType::IX)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockType::S => "S",
            LockType::X => "X",
            LockType::IS => "IS",
            LockType::IX => "IX",
        };
        f.write_str(name)
    }
}

impl FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S" => Ok(LockType::S),
            "X" => Ok(LockType::X),
            "IS" => Ok(LockType::IS),
            "IX" => Ok(LockType::IX),
            other => Err(format!("unknown lock type '{}'", other)),
        }
    }
}

/// A transaction's claim on a resource, either granted or waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Request {
    pub txn_id: TxnId,
    pub lock_type: LockType,
}

impl Request {
    pub fn new(txn_id: TxnId, lock_type: LockType) -> Self {
        Self { txn_id, lock_type }
    }
}

/// Whether `requester` may be granted while `owner` is held.
///
/// S held / X requested is only allowed for the same transaction, which is
/// the upgrade path.
pub fn compatible(owner: &Request, requester: &Request) -> bool {
    use LockType::*;

    match (owner.lock_type, requester.lock_type) {
        (IS, IS) | (IS, IX) | (IS, S) => true,
        (IS, X) => false,
        (IX, IS) | (IX, IX) => true,
        (IX, S) | (IX, X) => false,
        (S, IS) | (S, S) => true,
        (S, IX) => false,
        (S, X) => owner.txn_id == requester.txn_id,
        (X, _) => false,
    }
}

/// Whether `requester` is compatible with every current owner
pub fn compatible_with_all<'a>(
    owners: impl IntoIterator<Item = &'a Request>,
    requester: &Request,
) -> bool {
    owners.into_iter().all(|owner| compatible(owner, requester))
}
