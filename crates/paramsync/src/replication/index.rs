//! Cached replication lookups shared by the components of one run.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::LookupCache;
use crate::model::ReplicationMapping;
use crate::store::{RemoteStore, StoreResult};

/// How long "is this a source / destination" answers stay valid.
pub const LOOKUP_TTL: Duration = Duration::from_secs(15);

const LOOKUP_CAPACITY: u64 = 10_000;

/// Wraps the mapping lookups of a store with explicit TTL caches. Writes
/// made through the index invalidate the affected entries; cloning shares
/// the caches.
#[derive(Clone)]
pub struct ReplicationIndex {
    store: Arc<dyn RemoteStore>,
    by_destination: LookupCache<String, Option<ReplicationMapping>>,
    by_source: LookupCache<String, Vec<ReplicationMapping>>,
}

impl ReplicationIndex {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self::with_ttl(store, LOOKUP_TTL)
    }

    pub fn with_ttl(store: Arc<dyn RemoteStore>, ttl: Duration) -> Self {
        Self {
            store,
            by_destination: LookupCache::new(ttl, LOOKUP_CAPACITY),
            by_source: LookupCache::new(ttl, LOOKUP_CAPACITY),
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn mapping_by_destination(&self, name: &str) -> StoreResult<Option<ReplicationMapping>> {
        self.by_destination
            .get_or_try_insert(name.to_string(), || self.store.mapping_by_destination(name))
    }

    pub fn mappings_by_source(&self, name: &str) -> StoreResult<Vec<ReplicationMapping>> {
        self.by_source
            .get_or_try_insert(name.to_string(), || self.store.mappings_by_source(name))
    }

    pub fn is_destination(&self, name: &str) -> StoreResult<bool> {
        Ok(self.mapping_by_destination(name)?.is_some())
    }

    pub fn is_source(&self, name: &str) -> StoreResult<bool> {
        Ok(!self.mappings_by_source(name)?.is_empty())
    }

    pub fn put_mapping(&self, mapping: &ReplicationMapping) -> StoreResult<()> {
        // The replaced mapping may have had a different source.
        if let Some(old) = self.store.mapping_by_destination(&mapping.destination)? {
            self.invalidate_sources(&old);
        }
        self.store.put_mapping(mapping)?;
        self.by_destination.invalidate(&mapping.destination);
        self.invalidate_sources(mapping);
        Ok(())
    }

    pub fn delete_mapping(&self, mapping: &ReplicationMapping) -> StoreResult<()> {
        self.store.delete_mapping(&mapping.destination)?;
        self.by_destination.invalidate(&mapping.destination);
        self.invalidate_sources(mapping);
        Ok(())
    }

    fn invalidate_sources(&self, mapping: &ReplicationMapping) {
        for fragment in mapping.source.fragments() {
            self.by_source.invalidate(&fragment.to_string());
            for name in crate::manifest::references(fragment) {
                self.by_source.invalidate(&name.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReplicationType;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn mapping(source: &str, destination: &str) -> ReplicationMapping {
        ReplicationMapping {
            source: source.into(),
            destination: destination.to_string(),
            namespace: "/app/x/".to_string(),
            kind: ReplicationType::App,
            env: "dev".to_string(),
            user: "alice".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_writes_invalidate_cached_answers() {
        let store: Arc<dyn RemoteStore> = Arc::new(InMemoryStore::new());
        let index = ReplicationIndex::new(Arc::clone(&store));

        assert!(!index.is_source("/shared/a").unwrap());
        assert!(!index.is_destination("/app/x/a").unwrap());

        index.put_mapping(&mapping("/shared/a", "/app/x/a")).unwrap();
        assert!(index.is_source("/shared/a").unwrap());
        assert!(index.is_destination("/app/x/a").unwrap());

        index.put_mapping(&mapping("/shared/b", "/app/x/a")).unwrap();
        assert!(!index.is_source("/shared/a").unwrap());
        assert!(index.is_source("/shared/b").unwrap());

        index.delete_mapping(&mapping("/shared/b", "/app/x/a")).unwrap();
        assert!(!index.is_source("/shared/b").unwrap());
        assert!(!index.is_destination("/app/x/a").unwrap());
    }

    #[test]
    fn test_answers_are_cached_within_ttl() {
        let memory = Arc::new(InMemoryStore::new());
        let index = ReplicationIndex::new(Arc::clone(&memory) as Arc<dyn RemoteStore>);

        assert!(!index.is_destination("/app/x/a").unwrap());
        // A write that bypasses the index is not seen until the entry expires.
        memory.put_mapping(&mapping("/shared/a", "/app/x/a")).unwrap();
        assert!(!index.is_destination("/app/x/a").unwrap());
    }
}
