pub mod resource;
pub mod types;

pub use resource::{Resource, ResourceKind};
pub use types::{ResourceId, TxnId};
