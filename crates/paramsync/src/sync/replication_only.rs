//! Replication declared outside a service manifest.
//!
//! A replication file maps sources to destinations across any number of
//! service namespaces. Sources are unrestricted; each destination must sit
//! in a namespace under the service root.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, info_span, warn};

use crate::decision::Decision;
use crate::error::ParamSyncError;
use crate::manifest::{fill_placeholders, placeholders, ReplicationOnlyManifest};
use crate::model::{MappingSource, ReplicationType};
use crate::replication::NamespaceRules;
use crate::store::StoreResult;
use crate::sync::drift;
use crate::sync::engine::{MappingChange, ReconciliationEngine};
use crate::sync::report::{ReconciliationReport, RecordErrorKind};

pub struct ReplicationOnlyRun<'a> {
    engine: &'a ReconciliationEngine,
    rules: NamespaceRules,
}

impl<'a> ReplicationOnlyRun<'a> {
    pub fn new(engine: &'a ReconciliationEngine, rules: NamespaceRules) -> Self {
        Self { engine, rules }
    }

    pub fn run(
        &self,
        manifest: &ReplicationOnlyManifest,
        decision: &mut dyn Decision,
    ) -> Result<ReconciliationReport, ParamSyncError> {
        let _span = info_span!("sync.replication_only", pairs = manifest.replicate_figs.len()).entered();
        let mut report = ReconciliationReport::default();
        let pairs = resolve_placeholders(&manifest.replicate_figs, decision, &mut report);

        if let Err(e) = self.apply(&pairs, decision, &mut report) {
            tracing::error!(error = %e, mutations = report.mutations(), "Replication run aborted");
            return Err(e.into());
        }

        info!(
            added = report.replications_added,
            updated = report.replications_updated,
            validated = report.replications_validated,
            stray = report.stray_mappings.len(),
            "Replication run complete"
        );
        Ok(report)
    }

    fn apply(
        &self,
        pairs: &BTreeMap<String, String>,
        decision: &mut dyn Decision,
        report: &mut ReconciliationReport,
    ) -> StoreResult<()> {
        let store = self.engine.store();
        let mut presence = self
            .engine
            .options()
            .warmup
            .probe_all(store.as_ref(), pairs.keys().cloned().collect())?;

        let mut touched = BTreeSet::new();
        for (source, destination) in pairs {
            let namespace = match self.rules.destination_namespace(destination) {
                Ok(ns) => ns,
                Err(e) => {
                    report.record(destination, RecordErrorKind::NamespaceViolation, e.to_string());
                    continue;
                }
            };
            touched.insert(namespace.clone());

            if !self
                .engine
                .ensure_source(source, &mut presence, decision, report)?
            {
                continue;
            }

            let desired = self.engine.mapping(
                MappingSource::Single(source.clone()),
                destination.clone(),
                &namespace,
                ReplicationType::App,
            );
            match self.engine.apply_mapping(&desired, report)? {
                Some(MappingChange::Added) => report.replications_added += 1,
                Some(MappingChange::Updated) => report.replications_updated += 1,
                Some(MappingChange::Unchanged) => report.replications_validated += 1,
                None => {}
            }
        }

        let declared: BTreeSet<String> = pairs.keys().cloned().collect();
        for namespace in &touched {
            let remote = store.list_mappings_under_namespace(namespace)?;
            for mapping in drift::stray_app_mappings(remote, &declared, &self.rules) {
                warn!(mapping = %mapping, "Replication mapping is not declared in the replication file");
                report.stray_mappings.push(mapping);
            }
        }
        Ok(())
    }
}

/// Asks once for each distinct `${NAME}` placeholder and substitutes it in
/// every source and destination. Pairs left with an unanswered placeholder
/// are recorded as errors and dropped.
fn resolve_placeholders(
    pairs: &BTreeMap<String, String>,
    decision: &mut dyn Decision,
    report: &mut ReconciliationReport,
) -> BTreeMap<String, String> {
    let names = placeholders(
        pairs
            .iter()
            .flat_map(|(source, destination)| [source.as_str(), destination.as_str()]),
    );
    if names.is_empty() {
        return pairs.clone();
    }

    let values: BTreeMap<String, String> = names
        .into_iter()
        .filter_map(|name| {
            let value = decision.placeholder_value(&name).filter(|v| !v.is_empty())?;
            Some((name, value))
        })
        .collect();

    let mut resolved = BTreeMap::new();
    for (source, destination) in pairs {
        let unresolved: Vec<String> = placeholders([source.as_str(), destination.as_str()])
            .into_iter()
            .filter(|name| !values.contains_key(name))
            .collect();
        if !unresolved.is_empty() {
            report.record(
                destination.as_str(),
                RecordErrorKind::UnresolvedPlaceholder,
                format!("no value given for ${{{}}}", unresolved.join("}, ${")),
            );
            continue;
        }
        resolved.insert(
            fill_placeholders(source, &values),
            fill_placeholders(destination, &values),
        );
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Answer, ScriptedDecision};
    use crate::model::{PutParameter, ReplicationMapping};
    use crate::replication::ReplicationIndex;
    use crate::store::{InMemoryStore, RemoteStore};
    use crate::sync::SyncOptions;
    use chrono::Utc;
    use std::sync::Arc;

    fn engine(store: &Arc<InMemoryStore>) -> ReconciliationEngine {
        ReconciliationEngine::new(
            ReplicationIndex::new(Arc::clone(store) as Arc<dyn RemoteStore>),
            SyncOptions::new("dev", "alice"),
        )
    }

    fn manifest(pairs: &[(&str, &str)]) -> ReplicationOnlyManifest {
        ReplicationOnlyManifest {
            replicate_figs: pairs
                .iter()
                .map(|(s, d)| (s.to_string(), d.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_placeholders_prompted_once() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/other/qa/db", "1")).unwrap();
        store.put(&PutParameter::plain("/other/qa/cache", "1")).unwrap();
        let engine = engine(&store);
        let mut decision = ScriptedDecision::new([Answer::Text("qa".to_string())]);

        let report = ReplicationOnlyRun::new(&engine, NamespaceRules::default())
            .run(
                &manifest(&[
                    ("/other/${ENV}/db", "/app/x/${ENV}/db"),
                    ("/other/${ENV}/cache", "/app/x/cache"),
                ]),
                &mut decision,
            )
            .unwrap();

        assert_eq!(decision.asked().len(), 1);
        assert_eq!(decision.asked()[0], "placeholder ENV");
        assert_eq!(report.replications_added, 2);
        assert!(store.mapping_by_destination("/app/x/qa/db").unwrap().is_some());
    }

    #[test]
    fn test_destination_outside_service_root_rejected() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/shared/a", "1")).unwrap();
        let engine = engine(&store);

        let report = ReplicationOnlyRun::new(&engine, NamespaceRules::default())
            .run(
                &manifest(&[("/shared/a", "/shared/b")]),
                &mut ScriptedDecision::declining(),
            )
            .unwrap();
        assert_eq!(report.errors_of(RecordErrorKind::NamespaceViolation), 1);
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_destination_must_start_with_its_namespace() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/shared/a", "1")).unwrap();
        let engine = engine(&store);

        let report = ReplicationOnlyRun::new(&engine, NamespaceRules::default())
            .run(
                &manifest(&[("/shared/a", "//app/x/db")]),
                &mut ScriptedDecision::declining(),
            )
            .unwrap();
        assert_eq!(report.errors_of(RecordErrorKind::NamespaceViolation), 1);
        assert_eq!(report.replications_added, 0);
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_unanswered_placeholder_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/shared/a", "1")).unwrap();
        store.put(&PutParameter::plain("/shared/b", "1")).unwrap();
        let engine = engine(&store);

        let report = ReplicationOnlyRun::new(&engine, NamespaceRules::default())
            .run(
                &manifest(&[
                    ("/shared/a", "/app/${SERVICE}/db"),
                    ("/shared/b", "/app/x/b"),
                ]),
                &mut ScriptedDecision::declining(),
            )
            .unwrap();
        assert!(report.errors_detected);
        assert_eq!(report.errors_of(RecordErrorKind::UnresolvedPlaceholder), 1);
        assert_eq!(report.errors[0].subject, "/app/${SERVICE}/db");
        assert_eq!(report.replications_added, 1);
        let destinations: Vec<String> =
            store.mappings().into_iter().map(|m| m.destination).collect();
        assert_eq!(destinations, vec!["/app/x/b"]);
    }

    #[test]
    fn test_empty_placeholder_answer_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/shared/a", "1")).unwrap();
        let engine = engine(&store);
        let mut decision = ScriptedDecision::new([Answer::Text(String::new())]);

        let report = ReplicationOnlyRun::new(&engine, NamespaceRules::default())
            .run(&manifest(&[("/shared/a", "/app/${SERVICE}/db")]), &mut decision)
            .unwrap();
        assert_eq!(report.errors_of(RecordErrorKind::UnresolvedPlaceholder), 1);
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_unmanaged_app_mapping_reported_stray() {
        let store = Arc::new(InMemoryStore::new());
        store.put(&PutParameter::plain("/legacy/a", "1")).unwrap();
        let stale = ReplicationMapping {
            source: "/legacy/old".into(),
            destination: "/app/x/old".to_string(),
            namespace: "/app/x/".to_string(),
            kind: ReplicationType::App,
            env: "dev".to_string(),
            user: "bob".to_string(),
            timestamp: Utc::now(),
        };
        let shared = ReplicationMapping {
            source: "/shared/s".into(),
            destination: "/app/x/s".to_string(),
            ..stale.clone()
        };
        store.put_mapping(&stale).unwrap();
        store.put_mapping(&shared).unwrap();
        let engine = engine(&store);

        let report = ReplicationOnlyRun::new(&engine, NamespaceRules::default())
            .run(
                &manifest(&[("/legacy/a", "/app/x/a")]),
                &mut ScriptedDecision::declining(),
            )
            .unwrap();
        assert_eq!(report.replications_added, 1);
        assert_eq!(report.stray_mappings.len(), 1);
        assert_eq!(report.stray_mappings[0].destination, "/app/x/old");
    }
}
