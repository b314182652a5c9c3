//! Converges a namespace towards its manifest.
//!
//! Phases run strictly in order, each completing before the next starts:
//! backfill, stray keys, replication, merge keys, replication orphans,
//! existence check. A record-scoped failure is recorded and the run moves
//! on. A transport failure stops the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, info_span, warn};

use crate::decision::Decision;
use crate::error::ParamSyncError;
use crate::manifest::DesiredConfigSpec;
use crate::model::{MappingSource, PutParameter, ReplicationMapping, ReplicationType};
use crate::replication::{ReplicationGraphValidator, ReplicationIndex};
use crate::store::{probe, ListDepth, Presence, RemoteStore, StoreError, StoreResult};
use crate::sync::drift;
use crate::sync::report::{ReconciliationReport, RecordErrorKind};
use crate::warmup::WarmupPool;

/// Who is running the sync, recorded on every mapping it writes.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub env: String,
    pub user: String,
    pub warmup: WarmupPool,
}

impl SyncOptions {
    pub fn new(env: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            user: user.into(),
            warmup: WarmupPool::default(),
        }
    }

    pub fn with_warmup(mut self, warmup: WarmupPool) -> Self {
        self.warmup = warmup;
        self
    }
}

/// Result of trying to create a missing parameter.
pub(crate) enum Creation {
    Created,
    Declined,
    Refused(StoreError),
}

/// Result of writing a desired mapping.
pub(crate) enum MappingChange {
    Added,
    Updated,
    Unchanged,
}

pub struct ReconciliationEngine {
    store: Arc<dyn RemoteStore>,
    index: ReplicationIndex,
    options: SyncOptions,
}

impl ReconciliationEngine {
    pub fn new(index: ReplicationIndex, options: SyncOptions) -> Self {
        Self {
            store: Arc::clone(index.store()),
            index,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub(crate) fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn sync(
        &self,
        spec: &DesiredConfigSpec,
        decision: &mut dyn Decision,
    ) -> Result<ReconciliationReport, ParamSyncError> {
        let _span = info_span!("sync", namespace = %spec.namespace, env = %self.options.env).entered();
        let mut report = ReconciliationReport::default();

        match self.run_phases(spec, decision, &mut report) {
            Ok(()) => {
                info!(
                    backfilled = report.backfilled,
                    replications_added = report.replications_added,
                    replications_updated = report.replications_updated,
                    merges_added = report.merges_added,
                    errors = report.errors.len(),
                    "Sync complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    mutations = report.mutations(),
                    "Sync aborted, already applied changes are kept"
                );
                Err(e.into())
            }
        }
    }

    fn run_phases(
        &self,
        spec: &DesiredConfigSpec,
        decision: &mut dyn Decision,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let mut presence = self.warm_up(spec)?;

        self.backfill(spec, &mut presence, decision, report)?;
        self.find_stray_keys(spec, report)?;
        self.sync_replication(spec, &mut presence, decision, report)?;
        self.sync_merge_keys(spec, report)?;
        self.find_orphaned_mappings(spec, report)?;
        self.validate_expected(spec, report)?;
        Ok(())
    }

    /// Probes config keys and replication sources concurrently. Completes
    /// before any phase writes.
    fn warm_up(&self, spec: &DesiredConfigSpec) -> StoreResult<BTreeMap<String, Presence>> {
        let _step = info_span!("sync.warmup").entered();
        let mut names: Vec<String> = spec.config_keys.iter().cloned().collect();
        names.extend(spec.replication_pairs().into_keys());
        names.sort();
        names.dedup();
        self.options.warmup.probe_all(self.store.as_ref(), names)
    }

    fn presence_of(
        &self,
        presence: &mut BTreeMap<String, Presence>,
        name: &str,
    ) -> StoreResult<Presence> {
        if let Some(known) = presence.get(name) {
            return Ok(known.clone());
        }
        let probed = probe(self.store.as_ref(), name)?;
        presence.insert(name.to_string(), probed.clone());
        Ok(probed)
    }

    /// Phase A: create every missing config key.
    fn backfill(
        &self,
        spec: &DesiredConfigSpec,
        presence: &mut BTreeMap<String, Presence>,
        decision: &mut dyn Decision,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let _step = info_span!("sync.backfill", keys = spec.config_keys.len()).entered();

        for key in &spec.config_keys {
            match self.presence_of(presence, key)? {
                Presence::Present | Presence::Undecryptable => continue,
                Presence::Denied(message) => {
                    warn!(name = %key, %message, "Skipping config key, access denied");
                    report.access_denied.insert(key.clone());
                    continue;
                }
                Presence::Absent => {}
            }

            match self.create_parameter(key, presence, decision)? {
                Creation::Created => report.backfilled += 1,
                Creation::Declined => warn!(name = %key, "Backfill declined"),
                Creation::Refused(e) => {
                    warn!(name = %key, error = %e, "Backfill refused");
                    report.access_denied.insert(key.clone());
                }
            }
        }
        Ok(())
    }

    pub(crate) fn create_parameter(
        &self,
        name: &str,
        presence: &mut BTreeMap<String, Presence>,
        decision: &mut dyn Decision,
    ) -> StoreResult<Creation> {
        let Some(new) = decision.new_parameter(name) else {
            return Ok(Creation::Declined);
        };
        let request = PutParameter {
            name: name.to_string(),
            value: new.value,
            description: new.description,
            kind: new.kind,
            kms_key_id: new.kms_key_id,
        };
        match self.store.put(&request) {
            Ok(version) => {
                info!(name, version, kind = %request.kind, "Created parameter");
                presence.insert(name.to_string(), Presence::Present);
                Ok(Creation::Created)
            }
            Err(e) if e.is_record_scoped() => Ok(Creation::Refused(e)),
            Err(e) => Err(e),
        }
    }

    /// Phase B: names under the namespace that nothing expects.
    fn find_stray_keys(
        &self,
        spec: &DesiredConfigSpec,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let _step = info_span!("sync.stray_keys").entered();
        match self
            .store
            .list_under_prefix(&spec.namespace, ListDepth::Recursive)
        {
            Ok(names) => {
                report.stray_keys = drift::stray_keys(spec, names);
                for name in &report.stray_keys {
                    warn!(name = %name, "Stray parameter, not declared in the manifest");
                }
                Ok(())
            }
            Err(e) if e.is_record_scoped() => {
                report.access_denied.insert(spec.namespace.clone());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Phase C: one application mapping per declared replication.
    fn sync_replication(
        &self,
        spec: &DesiredConfigSpec,
        presence: &mut BTreeMap<String, Presence>,
        decision: &mut dyn Decision,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let pairs = spec.replication_pairs();
        let _step = info_span!("sync.replication", pairs = pairs.len()).entered();

        for (source, destination) in pairs {
            if let Err(e) = ReplicationGraphValidator::check_destination(&destination, &spec.namespace)
                .and_then(|_| ReplicationGraphValidator::check_source(&source, &spec.namespace, true))
            {
                report.record(&destination, RecordErrorKind::NamespaceViolation, e.to_string());
                continue;
            }

            if !self.ensure_source(&source, presence, decision, report)? {
                continue;
            }

            let desired = self.mapping(
                MappingSource::Single(source),
                destination,
                &spec.namespace,
                ReplicationType::App,
            );
            match self.apply_mapping(&desired, report)? {
                Some(MappingChange::Added) => report.replications_added += 1,
                Some(MappingChange::Updated) => report.replications_updated += 1,
                Some(MappingChange::Unchanged) => report.replications_validated += 1,
                None => {}
            }
        }
        Ok(())
    }

    /// Makes sure a replication source can be read, creating it if it is
    /// missing. Returns false if the mapping must be skipped.
    pub(crate) fn ensure_source(
        &self,
        source: &str,
        presence: &mut BTreeMap<String, Presence>,
        decision: &mut dyn Decision,
        report: &mut ReconciliationReport,
    ) -> StoreResult<bool> {
        match self.presence_of(presence, source)? {
            Presence::Present => Ok(true),
            Presence::Undecryptable => {
                report.record(
                    source,
                    RecordErrorKind::EncryptionContextDenied,
                    format!("no access to decrypt replication source {}", source),
                );
                Ok(false)
            }
            Presence::Denied(message) => {
                report.record(source, RecordErrorKind::AccessDenied, message);
                Ok(false)
            }
            Presence::Absent => match self.create_parameter(source, presence, decision)? {
                Creation::Created => {
                    report.sources_backfilled += 1;
                    Ok(true)
                }
                Creation::Declined => {
                    report.record(
                        source,
                        RecordErrorKind::MissingSource,
                        format!("replication source {} does not exist", source),
                    );
                    Ok(false)
                }
                Creation::Refused(e) => {
                    report.record(source, RecordErrorKind::from_store_error(&e), e.to_string());
                    Ok(false)
                }
            },
        }
    }

    pub(crate) fn mapping(
        &self,
        source: MappingSource,
        destination: String,
        namespace: &str,
        kind: ReplicationType,
    ) -> ReplicationMapping {
        ReplicationMapping {
            source,
            destination,
            namespace: namespace.to_string(),
            kind,
            env: self.options.env.clone(),
            user: self.options.user.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Creates or replaces the remote mapping for the desired destination.
    /// Record-scoped failures are recorded and yield `None`.
    pub(crate) fn apply_mapping(
        &self,
        desired: &ReplicationMapping,
        report: &mut ReconciliationReport,
    ) -> StoreResult<Option<MappingChange>> {
        let result = self
            .index
            .mapping_by_destination(&desired.destination)
            .and_then(|current| match current {
                None => {
                    self.index.put_mapping(desired)?;
                    info!(mapping = %desired, "Added replication mapping");
                    Ok(MappingChange::Added)
                }
                Some(current) if current.same_route(desired) => Ok(MappingChange::Unchanged),
                Some(current) => {
                    self.index.put_mapping(desired)?;
                    info!(previous = %current, mapping = %desired, "Replaced replication mapping");
                    Ok(MappingChange::Updated)
                }
            });

        match result {
            Ok(change) => Ok(Some(change)),
            Err(e) if e.is_record_scoped() => {
                report.record(
                    &desired.destination,
                    RecordErrorKind::from_store_error(&e),
                    e.to_string(),
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Phase D: one merge mapping per declared merge parameter.
    fn sync_merge_keys(
        &self,
        spec: &DesiredConfigSpec,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let _step = info_span!("sync.merge_keys", merges = spec.merge_map.len()).entered();

        for (destination, source) in &spec.merge_map {
            if let Err(e) = ReplicationGraphValidator::check_destination(destination, &spec.namespace)
                .and_then(|_| ReplicationGraphValidator::check_merge_source(source, &spec.namespace))
            {
                report.record(destination, RecordErrorKind::NamespaceViolation, e.to_string());
                continue;
            }

            let desired = self.mapping(
                source.clone(),
                destination.clone(),
                &spec.namespace,
                ReplicationType::Merge,
            );
            match self.apply_mapping(&desired, report)? {
                Some(MappingChange::Added) => report.merges_added += 1,
                Some(MappingChange::Updated) => report.merges_updated += 1,
                Some(MappingChange::Unchanged) => report.merges_validated += 1,
                None => {}
            }
        }
        Ok(())
    }

    /// Phase E: remote mappings into the namespace nobody declared.
    fn find_orphaned_mappings(
        &self,
        spec: &DesiredConfigSpec,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let _step = info_span!("sync.orphans").entered();
        let remote = self.store.list_mappings_under_namespace(&spec.namespace)?;
        report.stray_mappings = drift::stray_mappings(spec, remote);
        for mapping in &report.stray_mappings {
            warn!(mapping = %mapping, "Replication mapping is not declared in the manifest");
        }
        Ok(())
    }

    /// Phase F: every expected name must exist, unless replication is still
    /// going to create it.
    fn validate_expected(
        &self,
        spec: &DesiredConfigSpec,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let _step = info_span!("sync.validate").entered();

        for name in spec.expected_names() {
            match probe(self.store.as_ref(), &name)? {
                Presence::Present | Presence::Undecryptable => {}
                Presence::Denied(_) => {
                    report.access_denied.insert(name);
                }
                Presence::Absent if spec.is_replication_target(&name) => {
                    info!(name = %name, "Awaiting replication");
                    report.awaiting_replication.push(name);
                }
                Presence::Absent => {
                    let message = format!("{} is declared but does not exist", name);
                    report.record(name, RecordErrorKind::MissingExpectedName, message);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Answer, NewParameter, ScriptedDecision};
    use crate::manifest::{load_manifest_from_str, ManifestFormat};
    use crate::store::InMemoryStore;

    fn engine(store: &Arc<InMemoryStore>) -> ReconciliationEngine {
        ReconciliationEngine::new(
            ReplicationIndex::new(Arc::clone(store) as Arc<dyn RemoteStore>),
            SyncOptions::new("dev", "alice").with_warmup(WarmupPool::new(2)),
        )
    }

    fn spec(json: &str) -> DesiredConfigSpec {
        load_manifest_from_str(json, ManifestFormat::Json).unwrap()
    }

    #[test]
    fn test_namespace_violation_rejects_only_that_record() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/app/x/a", "1")).unwrap();
        store.put(&PutParameter::plain("/shared/ok", "1")).unwrap();
        let spec = spec(
            r#"{
                "namespace": "/app/x/",
                "config": ["/app/x/a"],
                "replicate_figs": {
                    "/app/other/secret": "/app/x/stolen",
                    "/shared/ok": "/app/x/ok",
                    "/shared/ok2": "/app/y/elsewhere"
                }
            }"#,
        );

        let report = engine(&store)
            .sync(&spec, &mut ScriptedDecision::declining())
            .unwrap();

        assert_eq!(report.errors_of(RecordErrorKind::NamespaceViolation), 2);
        assert_eq!(report.replications_added, 1);
        assert_eq!(store.mappings().len(), 1);
        assert_eq!(store.mappings()[0].destination, "/app/x/ok");
    }

    #[test]
    fn test_missing_source_is_backfilled() {
        let store = Arc::new(InMemoryStore::new());
        let spec = spec(
            r#"{
                "namespace": "/app/x/",
                "replicate_figs": { "/app/x/origin": "/app/x/copy" }
            }"#,
        );
        let mut decision = ScriptedDecision::new([Answer::Parameter(Some(NewParameter::plain("v")))]);

        let report = engine(&store).sync(&spec, &mut decision).unwrap();
        assert_eq!(report.sources_backfilled, 1);
        assert_eq!(report.replications_added, 1);
        assert_eq!(report.awaiting_replication, vec!["/app/x/copy"]);
        assert!(!report.errors_detected);
    }

    #[test]
    fn test_declined_source_skips_mapping() {
        let store = Arc::new(InMemoryStore::new());
        let spec = spec(
            r#"{
                "namespace": "/app/x/",
                "replicate_figs": { "/shared/missing": "/app/x/copy" }
            }"#,
        );

        let report = engine(&store)
            .sync(&spec, &mut ScriptedDecision::declining())
            .unwrap();
        assert_eq!(report.errors_of(RecordErrorKind::MissingSource), 1);
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_changed_route_is_replaced() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/shared/new", "1")).unwrap();
        store
            .put_mapping(&ReplicationMapping {
                source: "/shared/old".into(),
                destination: "/app/x/db".to_string(),
                namespace: "/app/x/".to_string(),
                kind: ReplicationType::App,
                env: "dev".to_string(),
                user: "bob".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        let spec = spec(
            r#"{
                "namespace": "/app/x/",
                "replicate_figs": { "/shared/new": "/app/x/db" }
            }"#,
        );

        let report = engine(&store)
            .sync(&spec, &mut ScriptedDecision::declining())
            .unwrap();
        assert_eq!(report.replications_updated, 1);
        assert_eq!(
            store.mapping_by_destination("/app/x/db").unwrap().unwrap().source,
            MappingSource::Single("/shared/new".to_string())
        );
    }

    #[test]
    fn test_merge_keys_created_and_validated() {
        let store = Arc::new(InMemoryStore::new());
        let spec = spec(
            r#"{
                "namespace": "/app/x/",
                "merge_parameters": {
                    "/app/x/url": ["postgres://", "${/shared/db/user}", "@db"],
                    "/app/x/bad": "${/app/other/pass}",
                    "/app/x/copied": "/app/other/secret"
                }
            }"#,
        );

        let first = engine(&store)
            .sync(&spec, &mut ScriptedDecision::declining())
            .unwrap();
        assert_eq!(first.merges_added, 1);
        assert_eq!(first.errors_of(RecordErrorKind::NamespaceViolation), 2);
        assert!(store.mapping_by_destination("/app/x/copied").unwrap().is_none());

        let second = engine(&store)
            .sync(&spec, &mut ScriptedDecision::declining())
            .unwrap();
        assert_eq!(second.merges_added, 0);
        assert_eq!(second.merges_validated, 1);
    }

    #[test]
    fn test_access_denied_config_key_is_not_fatal() {
        let store = Arc::new(InMemoryStore::new());
        store.deny("/app/x/locked");
        store.put(&PutParameter::plain("/app/x/open", "1")).unwrap();
        let spec = spec(
            r#"{ "namespace": "/app/x/", "config": ["/app/x/locked", "/app/x/open"] }"#,
        );

        let report = engine(&store)
            .sync(&spec, &mut ScriptedDecision::declining())
            .unwrap();
        assert!(report.access_denied.contains("/app/x/locked"));
        assert!(!report.errors_detected);
    }

    #[test]
    fn test_transport_failure_aborts() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_transport(Some("unreachable"));
        let spec = spec(r#"{ "namespace": "/app/x/", "config": ["/app/x/a"] }"#);

        assert!(matches!(
            engine(&store).sync(&spec, &mut ScriptedDecision::declining()),
            Err(ParamSyncError::Store(StoreError::Transport(_)))
        ));
    }
}
