//! Read-only validation and interactive pruning of a namespace.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span};

use crate::decision::{Confirm, Decision};
use crate::error::ParamSyncError;
use crate::guard::{DeleteOutcome, DeletionGuard};
use crate::manifest::DesiredConfigSpec;
use crate::model::ReplicationMapping;
use crate::replication::ReplicationIndex;
use crate::store::{ListDepth, RemoteStore};
use crate::sync::drift;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub namespace: String,
    pub expected: usize,
    pub missing: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub deleted_keys: Vec<String>,
    pub refused_keys: Vec<String>,
    pub kept_keys: Vec<String>,
    pub deleted_mappings: Vec<ReplicationMapping>,
    pub kept_mappings: Vec<ReplicationMapping>,
}

pub struct OrphanDetector {
    store: Arc<dyn RemoteStore>,
    index: ReplicationIndex,
    guard: DeletionGuard,
}

impl OrphanDetector {
    pub fn new(index: ReplicationIndex) -> Self {
        Self {
            store: Arc::clone(index.store()),
            guard: DeletionGuard::new(index.clone()),
            index,
        }
    }

    /// Lists the namespace and reports every expected name that is absent.
    pub fn validate(&self, spec: &DesiredConfigSpec) -> Result<ValidationReport, ParamSyncError> {
        let _span = info_span!("validate", namespace = %spec.namespace).entered();
        let remote: std::collections::BTreeSet<String> = self
            .store
            .list_under_prefix(&spec.namespace, ListDepth::Recursive)?
            .into_iter()
            .collect();

        let expected = spec.expected_names();
        let missing: Vec<String> = expected
            .iter()
            .filter(|name| !remote.contains(*name))
            .cloned()
            .collect();

        for name in &missing {
            tracing::warn!(name = %name, "Expected parameter is missing");
        }
        info!(expected = expected.len(), missing = missing.len(), "Validation complete");

        Ok(ValidationReport {
            namespace: spec.namespace.clone(),
            expected: expected.len(),
            missing,
        })
    }

    /// Like [`validate`](Self::validate), failing when anything is missing.
    pub fn require_valid(&self, spec: &DesiredConfigSpec) -> Result<ValidationReport, ParamSyncError> {
        let report = self.validate(spec)?;
        if report.is_valid() {
            Ok(report)
        } else {
            Err(ParamSyncError::MissingExpectedNames {
                names: report.missing,
            })
        }
    }

    /// Offers every stray key and stray mapping for deletion. Keys go
    /// through the deletion guard; for mappings only the mapping is removed.
    pub fn prune(
        &self,
        spec: &DesiredConfigSpec,
        decision: &mut dyn Decision,
    ) -> Result<PruneReport, ParamSyncError> {
        let _span = info_span!("prune", namespace = %spec.namespace).entered();
        let mut report = PruneReport::default();

        let names = self
            .store
            .list_under_prefix(&spec.namespace, ListDepth::Recursive)?;
        for name in drift::stray_keys(spec, names) {
            if !decision.confirm(Confirm::DeleteStrayParameter { name: &name }) {
                report.kept_keys.push(name);
                continue;
            }
            match self.guard.delete(&name, decision)? {
                DeleteOutcome::Deleted => report.deleted_keys.push(name),
                DeleteOutcome::Refused(_) => report.refused_keys.push(name),
                DeleteOutcome::Aborted => report.kept_keys.push(name),
            }
        }

        let remote = self.store.list_mappings_under_namespace(&spec.namespace)?;
        for mapping in drift::stray_mappings(spec, remote) {
            if decision.confirm(Confirm::DeleteStrayMapping { mapping: &mapping }) {
                self.index.delete_mapping(&mapping)?;
                info!(mapping = %mapping, "Deleted stray replication mapping");
                report.deleted_mappings.push(mapping);
            } else {
                report.kept_mappings.push(mapping);
            }
        }

        info!(
            deleted_keys = report.deleted_keys.len(),
            refused_keys = report.refused_keys.len(),
            deleted_mappings = report.deleted_mappings.len(),
            "Prune complete"
        );
        Ok(report)
    }
}
