//! The only path by which parameters are deleted.
//!
//! A parameter that feeds a replication mapping is never deleted: the
//! destinations would silently lose their value. A parameter that is itself
//! a replication destination is only deleted together with its mapping,
//! after confirmation, otherwise the replication service would recreate it.

use std::sync::Arc;

use serde::Serialize;

use crate::decision::{Confirm, Decision};
use crate::error::ParamSyncError;
use crate::model::ReplicationMapping;
use crate::replication::ReplicationIndex;
use crate::store::{RemoteStore, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum DeleteOutcome {
    Deleted,
    Refused(RefusalReason),
    /// The user declined; nothing was changed.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum RefusalReason {
    ReplicationSource { destinations: Vec<ReplicationMapping> },
    AccessDenied { message: String },
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }

    /// The error a refusal to delete an active source surfaces as.
    pub fn source_locked(&self, name: &str) -> Option<ParamSyncError> {
        match self {
            DeleteOutcome::Refused(RefusalReason::ReplicationSource { destinations }) => {
                Some(ParamSyncError::ReplicationSourceLocked {
                    name: name.to_string(),
                    destinations: destinations.clone(),
                })
            }
            _ => None,
        }
    }
}

pub struct DeletionGuard {
    store: Arc<dyn RemoteStore>,
    index: ReplicationIndex,
}

impl DeletionGuard {
    pub fn new(index: ReplicationIndex) -> Self {
        Self {
            store: Arc::clone(index.store()),
            index,
        }
    }

    /// Mapping lookups go to the store, never the index's TTL caches: a
    /// mapping written elsewhere moments ago still protects its source.
    pub fn delete(&self, name: &str, decision: &mut dyn Decision) -> StoreResult<DeleteOutcome> {
        let destinations = self.store.mappings_by_source(name)?;
        if !destinations.is_empty() {
            tracing::warn!(
                name,
                destinations = destinations.len(),
                "Refusing to delete an active replication source"
            );
            return Ok(DeleteOutcome::Refused(RefusalReason::ReplicationSource {
                destinations,
            }));
        }

        if let Some(mapping) = self.store.mapping_by_destination(name)? {
            if !decision.confirm(Confirm::DeleteReplicatedParameter {
                name,
                mapping: &mapping,
            }) {
                tracing::info!(name, "Deletion of replicated parameter aborted");
                return Ok(DeleteOutcome::Aborted);
            }
            self.index.delete_mapping(&mapping)?;
            tracing::info!(name, source = %mapping.source, "Deleted replication mapping");
        }

        match self.store.delete(name) {
            Ok(()) => {
                tracing::info!(name, "Deleted parameter");
                Ok(DeleteOutcome::Deleted)
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(name, "Parameter already absent");
                Ok(DeleteOutcome::Deleted)
            }
            Err(StoreError::AccessDenied { message, .. }) => {
                tracing::warn!(name, %message, "Deletion denied");
                Ok(DeleteOutcome::Refused(RefusalReason::AccessDenied { message }))
            }
            Err(e) => Err(e),
        }
    }
}
