//! Isolated store plus the components that operate on it.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use paramsync::cache::MemorySnapshotStore;
use paramsync::manifest::{load_manifest, DesiredConfigSpec};
use paramsync::store::ListDepth;
use paramsync::{
    DeletionGuard, InMemoryStore, KeyRing, OrphanDetector, ParameterNameCache,
    PointInTimeRestorer, ReconciliationEngine, RemoteStore, ReplicationIndex, SqliteStore,
    SyncOptions, WarmupPool,
};
use tempfile::TempDir;

pub const ENV: &str = "dev";
pub const USER: &str = "integration";

/// Logical clock start, so audit timestamps are reproducible across stores.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("manifests")
        .join(name)
}

pub fn fixture(name: &str) -> DesiredConfigSpec {
    load_manifest(fixture_path(name)).expect("Failed to load fixture manifest")
}

pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = InMemoryStore::new().with_user(USER);
        store.set_time(epoch());
        Self {
            store: Arc::new(store),
        }
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store) as Arc<dyn RemoteStore>
    }

    pub fn index(&self) -> ReplicationIndex {
        ReplicationIndex::new(self.remote())
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            self.index(),
            SyncOptions::new(ENV, USER).with_warmup(WarmupPool::new(4)),
        )
    }

    pub fn detector(&self) -> OrphanDetector {
        OrphanDetector::new(self.index())
    }

    pub fn guard(&self) -> DeletionGuard {
        DeletionGuard::new(self.index())
    }

    pub fn restorer(&self, authorized: &[&str]) -> PointInTimeRestorer {
        PointInTimeRestorer::new(
            self.index(),
            authorized.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn name_cache(&self) -> ParameterNameCache {
        ParameterNameCache::new(ENV, self.remote(), Arc::new(MemorySnapshotStore::new()))
    }

    /// Writes plain parameters.
    pub fn seed(&self, params: &[(&str, &str)]) {
        for (name, value) in params {
            self.store
                .put(&paramsync::PutParameter::plain(*name, *value))
                .expect("Failed to seed parameter");
        }
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.store.get(name).expect("Failed to read parameter").map(|p| p.value)
    }

    /// Every live parameter with its value.
    pub fn state(&self) -> BTreeMap<String, String> {
        self.store
            .names()
            .into_iter()
            .filter_map(|name| self.value(&name).map(|value| (name, value)))
            .collect()
    }
}

/// A SQLite store in a temporary directory, on the wall clock. Writes made
/// in quick succession share a millisecond, which the in-memory store's
/// logical clock never produces.
pub struct SqliteHarness {
    _dir: TempDir,
    pub store: Arc<SqliteStore>,
}

impl SqliteHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = SqliteStore::open(&dir.path().join("dev.db"), KeyRing::empty())
            .expect("Failed to open SQLite store")
            .with_user(USER);
        Self {
            _dir: dir,
            store: Arc::new(store),
        }
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store) as Arc<dyn RemoteStore>
    }

    pub fn restorer(&self, authorized: &[&str]) -> PointInTimeRestorer {
        PointInTimeRestorer::new(
            ReplicationIndex::new(self.remote()),
            authorized.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn name_cache(&self) -> ParameterNameCache {
        ParameterNameCache::new(ENV, self.remote(), Arc::new(MemorySnapshotStore::new()))
    }

    pub fn seed(&self, params: &[(&str, &str)]) {
        for (name, value) in params {
            self.store
                .put(&paramsync::PutParameter::plain(*name, *value))
                .expect("Failed to seed parameter");
        }
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.store.get(name).expect("Failed to read parameter").map(|p| p.value)
    }

    pub fn names(&self) -> std::collections::BTreeSet<String> {
        self.store
            .list_under_prefix("/", ListDepth::Recursive)
            .expect("Failed to list parameters")
            .into_iter()
            .collect()
    }
}
