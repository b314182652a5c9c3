//! Restores every parameter under a prefix to its state at a point in time.
//!
//! Names are processed one at a time in sorted order. A failure stops the
//! loop; what was already restored stays restored and the error carries the
//! last name attempted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::decision::{Confirm, Decision};
use crate::error::ParamSyncError;
use crate::guard::{DeleteOutcome, DeletionGuard};
use crate::model::{AuditAction, AuditEntry, Parameter, PutParameter};
use crate::replication::ReplicationIndex;
use crate::restore::{check_authorized, ParameterHistory};
use crate::store::{RemoteStore, StoreError, StoreResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub prefix: String,
    pub restore_time: Option<DateTime<Utc>>,
    /// The user declined to start; nothing was touched.
    pub cancelled: bool,
    pub restored: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    /// Names left as they are: declined deletions and guard refusals.
    pub kept: Vec<String>,
    /// Replication destinations and values that cannot be decrypted.
    pub unrestorable: Vec<String>,
}

impl RestoreReport {
    pub fn changes(&self) -> usize {
        self.restored.len() + self.deleted.len()
    }
}

enum Outcome {
    Restored,
    Deleted,
    Unchanged,
    Kept,
    Unrestorable,
}

pub struct PointInTimeRestorer {
    store: Arc<dyn RemoteStore>,
    index: ReplicationIndex,
    guard: DeletionGuard,
    authorized: Vec<String>,
}

impl PointInTimeRestorer {
    pub fn new(index: ReplicationIndex, authorized_namespaces: Vec<String>) -> Self {
        Self {
            store: Arc::clone(index.store()),
            guard: DeletionGuard::new(index.clone()),
            index,
            authorized: authorized_namespaces,
        }
    }

    pub fn restore(
        &self,
        prefix: &str,
        at: DateTime<Utc>,
        decision: &mut dyn Decision,
    ) -> Result<RestoreReport, ParamSyncError> {
        let _span = info_span!("restore.point_in_time", prefix, at = %at).entered();
        check_authorized(prefix, &self.authorized)?;

        let mut report = RestoreReport {
            prefix: prefix.to_string(),
            restore_time: Some(at),
            ..Default::default()
        };

        let histories = ParameterHistory::group(self.store.get_history_before(at, prefix)?);
        if histories.is_empty() {
            info!("No history at or before the restore point");
            return Ok(report);
        }

        if !decision.confirm(Confirm::StartRestore {
            prefix,
            count: histories.len(),
        }) {
            report.cancelled = true;
            return Ok(report);
        }

        for (name, history) in &histories {
            let outcome = self.restore_one(name, history, at, decision).map_err(|source| {
                ParamSyncError::RestoreAborted {
                    last_parameter: name.clone(),
                    restored: report.changes(),
                    source,
                }
            })?;
            let bucket = match outcome {
                Outcome::Restored => &mut report.restored,
                Outcome::Deleted => &mut report.deleted,
                Outcome::Unchanged => &mut report.unchanged,
                Outcome::Kept => &mut report.kept,
                Outcome::Unrestorable => &mut report.unrestorable,
            };
            bucket.push(name.clone());
        }

        info!(
            restored = report.restored.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged.len(),
            unrestorable = report.unrestorable.len(),
            "Restore complete"
        );
        Ok(report)
    }

    fn restore_one(
        &self,
        name: &str,
        history: &ParameterHistory,
        at: DateTime<Utc>,
        decision: &mut dyn Decision,
    ) -> StoreResult<Outcome> {
        if self.index.is_destination(name)? {
            warn!(name, "Skipping replication destination, restore its source instead");
            return Ok(Outcome::Unrestorable);
        }
        let Some(entry) = history.entry_at(at) else {
            return Ok(Outcome::Unchanged);
        };

        match entry.action {
            AuditAction::Put => self.restore_value(name, entry, history, at),
            AuditAction::Delete => self.restore_deletion(name, decision),
        }
    }

    fn restore_value(
        &self,
        name: &str,
        entry: &AuditEntry,
        history: &ParameterHistory,
        at: DateTime<Utc>,
    ) -> StoreResult<Outcome> {
        let historical = match self.store.decrypt_history(entry) {
            Ok(value) => value,
            Err(StoreError::EncryptionContextDenied { .. }) => {
                warn!(name, version = entry.version, "Historical value cannot be decrypted");
                return Ok(Outcome::Unrestorable);
            }
            Err(e) => return Err(e),
        };
        let current = match self.store.get(name) {
            Ok(current) => current,
            Err(StoreError::EncryptionContextDenied { .. }) => {
                warn!(name, "Current value cannot be decrypted");
                return Ok(Outcome::Unrestorable);
            }
            Err(e) => return Err(e),
        };

        if current
            .as_ref()
            .is_some_and(|p| matches_entry(p, entry, &historical))
        {
            return Ok(Outcome::Unchanged);
        }

        if current.is_some() {
            match self.store.delete(name) {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let mut replayed = 0usize;
        for put in history.puts_at_or_before(at) {
            let value = match self.store.decrypt_history(put) {
                Ok(value) => value,
                Err(StoreError::EncryptionContextDenied { .. }) => {
                    warn!(name, version = put.version, "Skipping undecryptable version");
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.store.put(&PutParameter {
                name: name.to_string(),
                value,
                description: put.description.clone(),
                kind: put.kind,
                kms_key_id: put.kms_key_id.clone(),
            })?;
            replayed += 1;
        }
        info!(name, replayed, "Restored parameter");
        Ok(Outcome::Restored)
    }

    fn restore_deletion(&self, name: &str, decision: &mut dyn Decision) -> StoreResult<Outcome> {
        let exists = match self.store.get(name) {
            Ok(current) => current.is_some(),
            Err(StoreError::EncryptionContextDenied { .. }) => true,
            Err(e) => return Err(e),
        };
        if !exists {
            return Ok(Outcome::Unchanged);
        }
        if !decision.confirm(Confirm::DeleteForRestore { name }) {
            return Ok(Outcome::Kept);
        }
        match self.guard.delete(name, decision)? {
            DeleteOutcome::Deleted => Ok(Outcome::Deleted),
            DeleteOutcome::Refused(reason) => {
                warn!(name, ?reason, "Restore deletion refused");
                Ok(Outcome::Kept)
            }
            DeleteOutcome::Aborted => Ok(Outcome::Kept),
        }
    }
}

fn matches_entry(current: &Parameter, entry: &AuditEntry, historical: &str) -> bool {
    current.value == historical
        && current.kind == entry.kind
        && current.description == entry.description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Answer, ScriptedDecision};
    use crate::model::{ReplicationMapping, ReplicationType};
    use crate::store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, PointInTimeRestorer) {
        let store = Arc::new(InMemoryStore::new());
        let restorer = PointInTimeRestorer::new(
            ReplicationIndex::new(Arc::clone(&store) as Arc<dyn RemoteStore>),
            vec!["/app/x/".to_string()],
        );
        (store, restorer)
    }

    fn value(store: &InMemoryStore, name: &str) -> Option<String> {
        store.get(name).unwrap().map(|p| p.value)
    }

    #[test]
    fn test_restores_values_and_deletions() {
        let (store, restorer) = setup();
        store.put(&PutParameter::plain("/app/x/a", "old")).unwrap();
        store.put(&PutParameter::plain("/app/x/b", "keep")).unwrap();
        let t = store.now();

        store.put(&PutParameter::plain("/app/x/a", "new")).unwrap();
        store.put(&PutParameter::plain("/app/x/later", "1")).unwrap();

        let mut decision = ScriptedDecision::new([Answer::Confirm(true)]);
        let report = restorer.restore("/app/x/", t, &mut decision).unwrap();

        assert_eq!(report.restored, vec!["/app/x/a"]);
        assert_eq!(report.unchanged, vec!["/app/x/b"]);
        assert_eq!(value(&store, "/app/x/a").as_deref(), Some("old"));
        // Created after the restore point, so it has no history before it.
        assert_eq!(value(&store, "/app/x/later").as_deref(), Some("1"));
    }

    #[test]
    fn test_deleted_at_restore_point_is_deleted_after_confirmation() {
        let (store, restorer) = setup();
        store.put(&PutParameter::plain("/app/x/a", "1")).unwrap();
        store.delete("/app/x/a").unwrap();
        let t = store.now();
        store.put(&PutParameter::plain("/app/x/a", "2")).unwrap();

        let mut decision = ScriptedDecision::new([Answer::Confirm(true), Answer::Confirm(true)]);
        let report = restorer.restore("/app/x/", t, &mut decision).unwrap();
        assert_eq!(report.deleted, vec!["/app/x/a"]);
        assert!(store.get("/app/x/a").unwrap().is_none());
    }

    #[test]
    fn test_restore_is_idempotent() {
        let (store, restorer) = setup();
        store.put(&PutParameter::plain("/app/x/a", "old")).unwrap();
        let t = store.now();
        store.put(&PutParameter::plain("/app/x/a", "new")).unwrap();

        restorer
            .restore("/app/x/", t, &mut ScriptedDecision::new([Answer::Confirm(true)]))
            .unwrap();
        let before = store.mutation_count();
        let second = restorer
            .restore("/app/x/", t, &mut ScriptedDecision::new([Answer::Confirm(true)]))
            .unwrap();
        assert_eq!(second.changes(), 0);
        assert_eq!(store.mutation_count(), before);
    }

    #[test]
    fn test_destination_is_unrestorable() {
        let (store, restorer) = setup();
        store.put(&PutParameter::plain("/app/x/copy", "old")).unwrap();
        let t = store.now();
        store.put(&PutParameter::plain("/app/x/copy", "new")).unwrap();
        store
            .put_mapping(&ReplicationMapping {
                source: "/shared/s".into(),
                destination: "/app/x/copy".to_string(),
                namespace: "/app/x/".to_string(),
                kind: ReplicationType::App,
                env: "dev".to_string(),
                user: "bob".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();

        let report = restorer
            .restore("/app/x/", t, &mut ScriptedDecision::new([Answer::Confirm(true)]))
            .unwrap();
        assert_eq!(report.unrestorable, vec!["/app/x/copy"]);
        assert_eq!(value(&store, "/app/x/copy").as_deref(), Some("new"));
    }

    #[test]
    fn test_unauthorized_prefix_rejected() {
        let (store, restorer) = setup();
        assert!(matches!(
            restorer.restore("/app/y/", store.now(), &mut ScriptedDecision::declining()),
            Err(ParamSyncError::NamespaceViolation { .. })
        ));
    }

    #[test]
    fn test_access_denied_aborts_with_last_parameter() {
        let (store, restorer) = setup();
        store.put(&PutParameter::plain("/app/x/a", "old")).unwrap();
        store.put(&PutParameter::plain("/app/x/b", "old")).unwrap();
        let t = store.now();
        store.put(&PutParameter::plain("/app/x/a", "new")).unwrap();
        store.put(&PutParameter::plain("/app/x/b", "new")).unwrap();
        store.deny("/app/x/b");

        let err = restorer
            .restore("/app/x/", t, &mut ScriptedDecision::new([Answer::Confirm(true)]))
            .unwrap_err();
        match err {
            ParamSyncError::RestoreAborted {
                last_parameter,
                restored,
                ..
            } => {
                assert_eq!(last_parameter, "/app/x/b");
                assert_eq!(restored, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(value(&store, "/app/x/a").as_deref(), Some("old"));
    }

    #[test]
    fn test_declined_start_changes_nothing() {
        let (store, restorer) = setup();
        store.put(&PutParameter::plain("/app/x/a", "old")).unwrap();
        let t = store.now();
        store.put(&PutParameter::plain("/app/x/a", "new")).unwrap();
        let before = store.mutation_count();

        let report = restorer
            .restore("/app/x/", t, &mut ScriptedDecision::declining())
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(store.mutation_count(), before);
    }
}
