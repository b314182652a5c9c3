//! Reconciliation of a namespace against its manifest.

pub mod drift;
pub mod engine;
pub mod replication_only;
pub mod report;

pub use engine::{ReconciliationEngine, SyncOptions};
pub use replication_only::ReplicationOnlyRun;
pub use report::{ReconciliationReport, RecordError, RecordErrorKind};
