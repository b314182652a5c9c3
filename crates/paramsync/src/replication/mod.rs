//! Replication graph: namespace rules, cached lookups and ad hoc sharing.

pub mod index;
pub mod share;
pub mod validator;

pub use index::ReplicationIndex;
pub use share::{share, ShareRequest};
pub use validator::{NamespaceRules, ReplicationGraphValidator};
