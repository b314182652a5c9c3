//! Remote parameter store boundary.
//!
//! The engine talks to the store only through [`RemoteStore`]. Two adapters
//! ship with the crate: [`memory::InMemoryStore`] for headless runs and
//! tests, and [`sqlite::SqliteStore`] for a persistent local store.

use chrono::{DateTime, Utc};

use crate::model::{AuditEntry, NameChange, Parameter, PutParameter, ReplicationMapping};

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StoreError, StoreErrorKind, StoreResult};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// How far below a prefix a listing descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDepth {
    /// Only names exactly one path segment below the prefix.
    OneLevel,
    Recursive,
}

pub trait RemoteStore: Send + Sync {
    /// Reads and decrypts a parameter. A missing parameter is `Ok(None)`.
    fn get(&self, name: &str) -> StoreResult<Option<Parameter>>;

    /// Writes a new version of the parameter and returns its version number.
    fn put(&self, request: &PutParameter) -> StoreResult<u64>;

    /// Deletes a parameter. Fails with `NotFound` when it does not exist.
    fn delete(&self, name: &str) -> StoreResult<()>;

    fn list_under_prefix(&self, prefix: &str, depth: ListDepth) -> StoreResult<Vec<String>>;

    /// Name change feed: every name whose state changed at or after
    /// `since`. Changes at the boundary may be reported twice across calls.
    fn list_all_names_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<NameChange>>;

    /// Audit entries at or before `at` for names under `prefix`, in log
    /// order (oldest first, writes of one instant in the order they happened).
    fn get_history_before(&self, at: DateTime<Utc>, prefix: &str) -> StoreResult<Vec<AuditEntry>>;

    /// Full audit history of one parameter, oldest first.
    fn parameter_history(&self, name: &str) -> StoreResult<Vec<AuditEntry>>;

    /// Recovers the plaintext of a historical value written by this store.
    fn decrypt_history(&self, entry: &AuditEntry) -> StoreResult<String>;

    fn mappings_by_source(&self, name: &str) -> StoreResult<Vec<ReplicationMapping>>;

    fn mapping_by_destination(&self, name: &str) -> StoreResult<Option<ReplicationMapping>>;

    /// Creates or replaces the mapping keyed by its destination.
    fn put_mapping(&self, mapping: &ReplicationMapping) -> StoreResult<()>;

    fn delete_mapping(&self, destination: &str) -> StoreResult<()>;

    /// Every mapping whose destination lies under `namespace`.
    fn list_mappings_under_namespace(&self, namespace: &str)
        -> StoreResult<Vec<ReplicationMapping>>;
}

/// Result of probing whether a parameter exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    /// Present, but the caller may not decrypt it.
    Undecryptable,
    Denied(String),
}

impl Presence {
    pub fn exists(&self) -> bool {
        matches!(self, Presence::Present | Presence::Undecryptable)
    }
}

/// Probes a parameter, folding record-scoped errors into [`Presence`].
/// Transport failures are returned as errors.
pub fn probe(store: &dyn RemoteStore, name: &str) -> StoreResult<Presence> {
    match store.get(name) {
        Ok(Some(_)) => Ok(Presence::Present),
        Ok(None) | Err(StoreError::NotFound { .. }) => Ok(Presence::Absent),
        Err(StoreError::EncryptionContextDenied { .. }) => Ok(Presence::Undecryptable),
        Err(StoreError::AccessDenied { message, .. }) => Ok(Presence::Denied(message)),
        Err(e @ StoreError::Transport(_)) => Err(e),
    }
}

/// Prefix allow-list applied by the bundled adapters. An empty list allows
/// every name.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed_prefixes: Vec<String>,
}

impl AccessPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn check(&self, name: &str) -> StoreResult<()> {
        if self.allowed_prefixes.is_empty()
            || self.allowed_prefixes.iter().any(|p| name.starts_with(p))
        {
            Ok(())
        } else {
            Err(StoreError::access_denied(
                name,
                "not within an authorized prefix",
            ))
        }
    }
}

/// Shared listing filter for adapters that hold a flat name set.
pub(crate) fn matches_depth(name: &str, prefix: &str, depth: ListDepth) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        return false;
    }
    match depth {
        ListDepth::Recursive => true,
        ListDepth::OneLevel => !rest.contains('/'),
    }
}
