//! Ad hoc sharing: one application mapping created outside any manifest.

use chrono::Utc;
use tracing::info;

use crate::error::ParamSyncError;
use crate::model::{MappingSource, ReplicationMapping, ReplicationType};
use crate::replication::{NamespaceRules, ReplicationIndex};
use crate::store::{probe, Presence, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub source: String,
    pub destination: String,
    pub env: String,
    pub user: String,
}

/// Shares `source` into a service namespace. The source must live outside
/// the service tree and be readable; the destination must be inside it.
pub fn share(
    index: &ReplicationIndex,
    rules: &NamespaceRules,
    request: &ShareRequest,
) -> Result<ReplicationMapping, ParamSyncError> {
    if request.source.starts_with(&rules.service_root) {
        return Err(ParamSyncError::namespace_violation(
            request.source.as_str(),
            rules.service_root.as_str(),
            "a shared source may not live in a service namespace",
        ));
    }

    let namespace = rules.destination_namespace(&request.destination)?;

    match probe(index.store().as_ref(), &request.source)? {
        Presence::Present => {}
        Presence::Absent => {
            return Err(StoreError::not_found(&request.source).into());
        }
        Presence::Undecryptable => {
            return Err(StoreError::EncryptionContextDenied {
                name: request.source.clone(),
            }
            .into());
        }
        Presence::Denied(message) => {
            return Err(StoreError::access_denied(&request.source, message).into());
        }
    }

    let mapping = ReplicationMapping {
        source: MappingSource::Single(request.source.clone()),
        destination: request.destination.clone(),
        namespace,
        kind: ReplicationType::App,
        env: request.env.clone(),
        user: request.user.clone(),
        timestamp: Utc::now(),
    };
    index.put_mapping(&mapping)?;
    info!(mapping = %mapping, "Shared parameter");
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PutParameter;
    use crate::store::{InMemoryStore, RemoteStore};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, ReplicationIndex) {
        let store = Arc::new(InMemoryStore::new());
        let index = ReplicationIndex::new(Arc::clone(&store) as Arc<dyn RemoteStore>);
        (store, index)
    }

    fn request(source: &str, destination: &str) -> ShareRequest {
        ShareRequest {
            source: source.to_string(),
            destination: destination.to_string(),
            env: "dev".to_string(),
            user: "alice".to_string(),
        }
    }

    #[test]
    fn test_share_creates_app_mapping() {
        let (store, index) = setup();
        store.put(&PutParameter::plain("/shared/db/host", "db")).unwrap();

        let mapping = share(
            &index,
            &NamespaceRules::default(),
            &request("/shared/db/host", "/app/x/db/host"),
        )
        .unwrap();
        assert_eq!(mapping.namespace, "/app/x/");
        assert_eq!(mapping.kind, ReplicationType::App);
        assert!(index.is_source("/shared/db/host").unwrap());
    }

    #[test]
    fn test_share_rejects_service_source_and_foreign_destination() {
        let (store, index) = setup();
        store.put(&PutParameter::plain("/app/y/a", "1")).unwrap();
        store.put(&PutParameter::plain("/shared/a", "1")).unwrap();
        let rules = NamespaceRules::default();

        assert!(matches!(
            share(&index, &rules, &request("/app/y/a", "/app/x/a")),
            Err(ParamSyncError::NamespaceViolation { .. })
        ));
        assert!(matches!(
            share(&index, &rules, &request("/shared/a", "/shared/b")),
            Err(ParamSyncError::NamespaceViolation { .. })
        ));
        assert!(matches!(
            share(&index, &rules, &request("/shared/a", "//app/x/a")),
            Err(ParamSyncError::NamespaceViolation { .. })
        ));
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_share_requires_existing_source() {
        let (store, index) = setup();
        assert!(matches!(
            share(&index, &NamespaceRules::default(), &request("/shared/none", "/app/x/a")),
            Err(ParamSyncError::Store(StoreError::NotFound { .. }))
        ));
        assert!(store.mappings().is_empty());
    }
}
