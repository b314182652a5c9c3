//! Restores one parameter to a version picked from its history.

use std::sync::Arc;

use tracing::{info, info_span};

use crate::decision::{Confirm, Decision, RestoreCandidate};
use crate::error::ParamSyncError;
use crate::model::{AuditAction, AuditEntry, Parameter, PutParameter};
use crate::replication::ReplicationIndex;
use crate::restore::check_authorized;
use crate::store::{RemoteStore, StoreError};

pub struct VersionRestorer {
    store: Arc<dyn RemoteStore>,
    index: ReplicationIndex,
    authorized: Vec<String>,
}

impl VersionRestorer {
    pub fn new(index: ReplicationIndex, authorized_namespaces: Vec<String>) -> Self {
        Self {
            store: Arc::clone(index.store()),
            index,
            authorized: authorized_namespaces,
        }
    }

    /// Every historical PUT of `name`, newest first, paired with the audit
    /// entry it came from. Versions the caller cannot decrypt carry no
    /// value.
    pub fn candidates(
        &self,
        name: &str,
    ) -> Result<Vec<(RestoreCandidate, AuditEntry)>, ParamSyncError> {
        let mut candidates = Vec::new();
        for entry in self.store.parameter_history(name)?.into_iter().rev() {
            if entry.action != AuditAction::Put {
                continue;
            }
            let value = match self.store.decrypt_history(&entry) {
                Ok(value) => Some(value),
                Err(StoreError::EncryptionContextDenied { .. }) => None,
                Err(e) => return Err(e.into()),
            };
            candidates.push((
                RestoreCandidate {
                    version: entry.version,
                    time: entry.time,
                    user: entry.user.clone(),
                    value,
                },
                entry,
            ));
        }
        Ok(candidates)
    }

    /// Writes the chosen historical version as the new latest version and
    /// reads it back. Returns `None` when the user declines.
    pub fn restore(
        &self,
        name: &str,
        decision: &mut dyn Decision,
    ) -> Result<Option<Parameter>, ParamSyncError> {
        let _span = info_span!("restore.single", name).entered();
        check_authorized(name, &self.authorized)?;

        if self.index.is_destination(name)? {
            return Err(ParamSyncError::ReplicationDestination {
                name: name.to_string(),
            });
        }

        let candidates = self.candidates(name)?;
        if candidates.is_empty() {
            return Err(ParamSyncError::InvalidInput(format!(
                "'{}' has no restorable history",
                name
            )));
        }

        let offered: Vec<RestoreCandidate> = candidates.iter().map(|(c, _)| c.clone()).collect();
        let (candidate, entry) = decision
            .select_version(name, &offered)
            .and_then(|i| candidates.into_iter().nth(i))
            .ok_or_else(|| ParamSyncError::AmbiguousRestoreTarget {
                name: name.to_string(),
            })?;
        let Some(value) = candidate.value else {
            return Err(ParamSyncError::AmbiguousRestoreTarget {
                name: name.to_string(),
            });
        };

        if !decision.confirm(Confirm::RestoreVersion {
            name,
            version: candidate.version,
        }) {
            info!(name, "Restore declined");
            return Ok(None);
        }

        let version = self.store.put(&PutParameter {
            name: name.to_string(),
            value: value.clone(),
            description: entry.description,
            kind: entry.kind,
            kms_key_id: entry.kms_key_id,
        })?;

        match self.store.get(name)? {
            Some(restored) if restored.value == value => {
                info!(name, from = candidate.version, version, "Restored parameter version");
                Ok(Some(restored))
            }
            _ => Err(ParamSyncError::InvalidInput(format!(
                "'{}' did not read back the restored value",
                name
            ))),
        }
    }
}
