use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::ReplicationMapping;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordErrorKind {
    NamespaceViolation,
    AccessDenied,
    EncryptionContextDenied,
    MissingSource,
    MissingExpectedName,
    UnresolvedPlaceholder,
}

impl RecordErrorKind {
    pub fn from_store_error(err: &StoreError) -> Self {
        match err {
            StoreError::EncryptionContextDenied { .. } => RecordErrorKind::EncryptionContextDenied,
            StoreError::NotFound { .. } => RecordErrorKind::MissingSource,
            StoreError::AccessDenied { .. } | StoreError::Transport(_) => {
                RecordErrorKind::AccessDenied
            }
        }
    }
}

/// A failure confined to one record of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub subject: String,
    pub kind: RecordErrorKind,
    pub message: String,
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub errors_detected: bool,
    pub backfilled: usize,
    pub sources_backfilled: usize,
    pub replications_added: usize,
    pub replications_updated: usize,
    pub replications_validated: usize,
    pub merges_added: usize,
    pub merges_updated: usize,
    pub merges_validated: usize,
    pub stray_keys: Vec<String>,
    pub stray_mappings: Vec<ReplicationMapping>,
    pub awaiting_replication: Vec<String>,
    pub access_denied: BTreeSet<String>,
    pub errors: Vec<RecordError>,
}

impl ReconciliationReport {
    pub fn record(
        &mut self,
        subject: impl Into<String>,
        kind: RecordErrorKind,
        message: impl Into<String>,
    ) {
        let subject = subject.into();
        let message = message.into();
        tracing::warn!(%subject, ?kind, %message, "Record failed");
        self.errors.push(RecordError {
            subject,
            kind,
            message,
        });
        self.errors_detected = true;
    }

    /// Number of writes the run performed.
    pub fn mutations(&self) -> usize {
        self.backfilled
            + self.sources_backfilled
            + self.replications_added
            + self.replications_updated
            + self.merges_added
            + self.merges_updated
    }

    /// Expected names that are still missing and will not be filled by
    /// replication.
    pub fn missing(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.kind == RecordErrorKind::MissingExpectedName)
            .map(|e| e.subject.as_str())
            .collect()
    }

    pub fn errors_of(&self, kind: RecordErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }
}
