//! Incrementally refreshed set of every parameter name in an environment.
//!
//! A full listing is expensive, so the cache keeps a snapshot per
//! environment and only asks the store for names that changed since the
//! snapshot was last written. A full refresh happens when no snapshot
//! exists or the last full refresh is older than the TTL.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::model::{NameChange, NameState};
use crate::store::RemoteStore;

/// Default interval between full refreshes.
pub const FULL_REFRESH_INTERVAL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub names: BTreeSet<String>,
    pub last_full_refresh: DateTime<Utc>,
    pub last_write: DateTime<Utc>,
}

/// Persistence for snapshots, one per environment.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, env: &str) -> Result<Option<CacheSnapshot>, CacheError>;
    fn save(&self, env: &str, snapshot: &CacheSnapshot) -> Result<(), CacheError>;
    fn wipe(&self, env: &str) -> Result<(), CacheError>;
}

/// One JSON file per environment under a cache directory.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<cache dir>/paramsync`, falling back to the temp dir.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("paramsync")
    }

    pub fn path_for(&self, env: &str) -> PathBuf {
        self.dir.join(format!("{}-parameter_names.json", env))
    }

    fn io_error(path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, env: &str) -> Result<Option<CacheSnapshot>, CacheError> {
        let path = self.path_for(env);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&path, e)),
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // An unreadable snapshot is rebuilt by the next full refresh.
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt name cache");
                Ok(None)
            }
        }
    }

    fn save(&self, env: &str, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;
        let path = self.path_for(env);
        let content = serde_json::to_string(snapshot).map_err(|e| CacheError::Corrupt {
            path: path.clone(),
            source: e,
        })?;
        // Readers never see a half-written snapshot.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| Self::io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Self::io_error(&path, e))
    }

    fn wipe(&self, env: &str) -> Result<(), CacheError> {
        let path = self.path_for(env);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<String, CacheSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, env: &str) -> Result<Option<CacheSnapshot>, CacheError> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(env).cloned())
    }

    fn save(&self, env: &str, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(env.to_string(), snapshot.clone());
        Ok(())
    }

    fn wipe(&self, env: &str) -> Result<(), CacheError> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.remove(env);
        Ok(())
    }
}

pub struct ParameterNameCache {
    env: String,
    store: Arc<dyn RemoteStore>,
    snapshots: Arc<dyn SnapshotStore>,
    full_refresh_interval: Duration,
}

impl ParameterNameCache {
    pub fn new(
        env: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            env: env.into(),
            store,
            snapshots,
            full_refresh_interval: Duration::days(FULL_REFRESH_INTERVAL_DAYS),
        }
    }

    pub fn with_full_refresh_interval(mut self, interval: Duration) -> Self {
        self.full_refresh_interval = interval;
        self
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn get_names(&self) -> Result<BTreeSet<String>, CacheError> {
        self.get_names_at(Utc::now())
    }

    /// Same as [`get_names`](Self::get_names) with an explicit clock.
    pub fn get_names_at(&self, now: DateTime<Utc>) -> Result<BTreeSet<String>, CacheError> {
        let snapshot = match self.snapshots.load(&self.env)? {
            Some(snapshot) if now - snapshot.last_full_refresh <= self.full_refresh_interval => {
                self.refresh_incremental(snapshot, now)?
            }
            _ => self.refresh_full(now)?,
        };
        self.snapshots.save(&self.env, &snapshot)?;
        Ok(snapshot.names)
    }

    /// Names under `prefix`, served from the cache.
    pub fn names_under(&self, prefix: &str) -> Result<BTreeSet<String>, CacheError> {
        Ok(self
            .get_names()?
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect())
    }

    /// Forces the next call to do a full refresh.
    pub fn wipe(&self) -> Result<(), CacheError> {
        self.snapshots.wipe(&self.env)
    }

    fn refresh_full(&self, now: DateTime<Utc>) -> Result<CacheSnapshot, CacheError> {
        let changes = self.store.list_all_names_since(DateTime::<Utc>::UNIX_EPOCH)?;
        let names = latest_states(changes)
            .into_iter()
            .filter(|(_, state)| *state == NameState::Active)
            .map(|(name, _)| name)
            .collect::<BTreeSet<_>>();

        tracing::info!(env = %self.env, names = names.len(), "Full parameter name refresh");
        Ok(CacheSnapshot {
            names,
            last_full_refresh: now,
            last_write: now,
        })
    }

    fn refresh_incremental(
        &self,
        mut snapshot: CacheSnapshot,
        now: DateTime<Utc>,
    ) -> Result<CacheSnapshot, CacheError> {
        let changes = self.store.list_all_names_since(snapshot.last_write)?;
        let mut added = 0usize;
        let mut removed = 0usize;
        for (name, state) in latest_states(changes) {
            match state {
                NameState::Active => {
                    if snapshot.names.insert(name) {
                        added += 1;
                    }
                }
                NameState::Deleted => {
                    if snapshot.names.remove(&name) {
                        removed += 1;
                    }
                }
            }
        }

        tracing::debug!(env = %self.env, added, removed, "Incremental parameter name refresh");
        snapshot.last_write = now;
        Ok(snapshot)
    }
}

/// Collapses a change feed to the latest state of each name.
fn latest_states(changes: Vec<NameChange>) -> BTreeMap<String, NameState> {
    let mut latest: BTreeMap<String, (DateTime<Utc>, NameState)> = BTreeMap::new();
    for change in changes {
        match latest.get(&change.name) {
            Some((time, _)) if *time > change.time => {}
            _ => {
                latest.insert(change.name, (change.time, change.state));
            }
        }
    }
    latest
        .into_iter()
        .map(|(name, (_, state))| (name, state))
        .collect()
}
