//! SQLite-backed parameter store.
//!
//! Uses rusqlite with a thread-safe `Database` handle. All access is
//! serialized through a `Mutex<Connection>`. Secure values are sealed with
//! the [`KeyRing`] before they touch disk, in the live table and in the
//! audit history alike.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{matches_depth, AccessPolicy, ListDepth, RemoteStore, StoreError, StoreResult};
use crate::crypto::{KeyRing, KeyRingError};
use crate::model::{
    AuditAction, AuditEntry, MappingSource, NameChange, NameState, Parameter, ParameterType,
    PutParameter, ReplicationMapping, ReplicationType,
};

pub mod error;
pub mod history_repo;
pub mod mapping_repo;
pub mod migrations;
pub mod parameter_repo;

pub use error::DatabaseError;

use history_repo::HistoryRow;
use mapping_repo::MappingRow;
use parameter_repo::ParameterRow;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled for file databases.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Parameter store opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Returns the canonical store path for an environment:
/// `~/.paramsync/data/<env>.db`.
pub fn default_store_path(env: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".paramsync").join("data").join(format!("{}.db", env)))
}

pub struct SqliteStore {
    db: Database,
    keys: KeyRing,
    policy: AccessPolicy,
    user: String,
}

impl SqliteStore {
    pub fn open(path: &Path, keys: KeyRing) -> Result<Self, DatabaseError> {
        Ok(Self::with_database(Database::open(path)?, keys))
    }

    pub fn open_in_memory(keys: KeyRing) -> Result<Self, DatabaseError> {
        Ok(Self::with_database(Database::open_in_memory()?, keys))
    }

    pub fn with_database(db: Database, keys: KeyRing) -> Self {
        Self {
            db,
            keys,
            policy: AccessPolicy::allow_all(),
            user: "paramsync".to_string(),
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    fn seal(&self, request: &PutParameter) -> StoreResult<String> {
        if !request.kind.is_encrypted() {
            return Ok(request.value.clone());
        }
        let key_id = self.key_id_for(request)?;
        self.keys
            .encrypt(&key_id, &request.name, &request.value)
            .map_err(|e| decode_key_error(&request.name, e))
    }

    fn key_id_for(&self, request: &PutParameter) -> StoreResult<String> {
        request
            .kms_key_id
            .clone()
            .or_else(|| self.keys.key_ids().next().map(str::to_string))
            .ok_or_else(|| StoreError::EncryptionContextDenied {
                name: request.name.clone(),
            })
    }

    fn open_value(
        &self,
        name: &str,
        kind: ParameterType,
        kms_key_id: Option<&str>,
        stored: &str,
    ) -> StoreResult<String> {
        if !kind.is_encrypted() {
            return Ok(stored.to_string());
        }
        let key_id = kms_key_id.ok_or_else(|| StoreError::EncryptionContextDenied {
            name: name.to_string(),
        })?;
        self.keys
            .decrypt(key_id, name, stored)
            .map_err(|e| decode_key_error(name, e))
    }
}

/// Any failure to use a key means the caller lacks the encryption context
/// for that value.
fn decode_key_error(name: &str, err: KeyRingError) -> StoreError {
    log::debug!("Key ring refused '{}': {}", name, err);
    StoreError::EncryptionContextDenied {
        name: name.to_string(),
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_ms(table: &'static str, ms: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| DatabaseError::CorruptRow {
        table,
        reason: format!("timestamp out of range: {}", ms),
    })
}

fn parse_kind(table: &'static str, kind: &str) -> Result<ParameterType, DatabaseError> {
    ParameterType::parse(kind).ok_or_else(|| DatabaseError::CorruptRow {
        table,
        reason: format!("unknown parameter type '{}'", kind),
    })
}

fn history_to_entry(row: HistoryRow) -> Result<AuditEntry, DatabaseError> {
    let action = AuditAction::parse(&row.action).ok_or_else(|| DatabaseError::CorruptRow {
        table: "parameter_history",
        reason: format!("unknown action '{}'", row.action),
    })?;
    Ok(AuditEntry {
        time: from_ms("parameter_history", row.time_ms)?,
        kind: parse_kind("parameter_history", &row.kind)?,
        parameter_name: row.name,
        action,
        value: row.value,
        description: row.description,
        kms_key_id: row.kms_key_id,
        version: row.version.max(0) as u64,
        user: row.user,
    })
}

fn mapping_to_model(row: MappingRow) -> Result<ReplicationMapping, DatabaseError> {
    let source: MappingSource =
        serde_json::from_str(&row.source_json).map_err(|e| DatabaseError::CorruptRow {
            table: "replication_mappings",
            reason: e.to_string(),
        })?;
    let kind = ReplicationType::parse(&row.kind).ok_or_else(|| DatabaseError::CorruptRow {
        table: "replication_mappings",
        reason: format!("unknown replication type '{}'", row.kind),
    })?;
    Ok(ReplicationMapping {
        source,
        timestamp: from_ms("replication_mappings", row.time_ms)?,
        destination: row.destination,
        namespace: row.namespace,
        kind,
        env: row.env,
        user: row.user,
    })
}

impl RemoteStore for SqliteStore {
    fn get(&self, name: &str) -> StoreResult<Option<Parameter>> {
        self.policy.check(name)?;
        let Some(row) = self.db.with_conn(|conn| parameter_repo::find(conn, name))? else {
            return Ok(None);
        };

        let kind = parse_kind("parameters", &row.kind)?;
        let value = self.open_value(name, kind, row.kms_key_id.as_deref(), &row.value)?;
        Ok(Some(Parameter {
            last_modified: from_ms("parameters", row.last_modified_ms)?,
            name: row.name,
            value,
            description: row.description,
            kind,
            kms_key_id: row.kms_key_id,
            version: row.version.max(0) as u64,
        }))
    }

    fn put(&self, request: &PutParameter) -> StoreResult<u64> {
        self.policy.check(&request.name)?;
        let stored = self.seal(request)?;
        let kms_key_id = if request.kind.is_encrypted() {
            Some(self.key_id_for(request)?)
        } else {
            None
        };
        let time_ms = now_ms();

        let version = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let version = parameter_repo::find(&tx, &request.name)?
                .map(|r| r.version + 1)
                .unwrap_or(1);

            parameter_repo::upsert(
                &tx,
                &ParameterRow {
                    name: request.name.clone(),
                    value: stored.clone(),
                    description: request.description.clone(),
                    kind: request.kind.as_str().to_string(),
                    kms_key_id: kms_key_id.clone(),
                    version,
                    last_modified_ms: time_ms,
                },
            )?;
            history_repo::append(
                &tx,
                &HistoryRow {
                    name: request.name.clone(),
                    action: AuditAction::Put.as_str().to_string(),
                    value: Some(stored.clone()),
                    description: request.description.clone(),
                    kind: request.kind.as_str().to_string(),
                    kms_key_id: kms_key_id.clone(),
                    version,
                    user: self.user.clone(),
                    time_ms,
                },
            )?;
            history_repo::record_name_change(
                &tx,
                &request.name,
                NameState::Active.as_str(),
                time_ms,
            )?;
            tx.commit()?;
            Ok(version)
        })?;

        log::debug!("Stored {} version {}", request.name, version);
        Ok(version.max(0) as u64)
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        self.policy.check(name)?;
        let time_ms = now_ms();

        let deleted = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(existing) = parameter_repo::find(&tx, name)? else {
                return Ok(false);
            };
            parameter_repo::remove(&tx, name)?;
            history_repo::append(
                &tx,
                &HistoryRow {
                    name: name.to_string(),
                    action: AuditAction::Delete.as_str().to_string(),
                    value: None,
                    description: existing.description,
                    kind: existing.kind,
                    kms_key_id: existing.kms_key_id,
                    version: existing.version,
                    user: self.user.clone(),
                    time_ms,
                },
            )?;
            history_repo::record_name_change(&tx, name, NameState::Deleted.as_str(), time_ms)?;
            tx.commit()?;
            Ok(true)
        })?;

        if deleted {
            Ok(())
        } else {
            Err(StoreError::not_found(name))
        }
    }

    fn list_under_prefix(&self, prefix: &str, depth: ListDepth) -> StoreResult<Vec<String>> {
        self.policy.check(prefix)?;
        let names = self
            .db
            .with_conn(|conn| parameter_repo::names_with_prefix(conn, prefix))?;
        Ok(names
            .into_iter()
            .filter(|n| matches_depth(n, prefix, depth))
            .collect())
    }

    fn list_all_names_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<NameChange>> {
        let rows = self
            .db
            .with_conn(|conn| history_repo::name_changes_since(conn, since.timestamp_millis()))?;

        let mut changes = Vec::with_capacity(rows.len());
        for (name, state, updated_ms) in rows {
            let state = NameState::parse(&state).ok_or_else(|| DatabaseError::CorruptRow {
                table: "name_changes",
                reason: format!("unknown state '{}'", state),
            })?;
            changes.push(NameChange {
                name,
                state,
                time: from_ms("name_changes", updated_ms)?,
            });
        }
        Ok(changes)
    }

    fn get_history_before(&self, at: DateTime<Utc>, prefix: &str) -> StoreResult<Vec<AuditEntry>> {
        self.policy.check(prefix)?;
        let rows = self
            .db
            .with_conn(|conn| history_repo::list_before(conn, at.timestamp_millis(), prefix))?;
        Ok(rows
            .into_iter()
            .map(history_to_entry)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn parameter_history(&self, name: &str) -> StoreResult<Vec<AuditEntry>> {
        self.policy.check(name)?;
        let rows = self
            .db
            .with_conn(|conn| history_repo::list_for_name(conn, name))?;
        Ok(rows
            .into_iter()
            .map(history_to_entry)
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn decrypt_history(&self, entry: &AuditEntry) -> StoreResult<String> {
        let stored = entry
            .value
            .as_deref()
            .ok_or_else(|| StoreError::not_found(&entry.parameter_name))?;
        self.open_value(
            &entry.parameter_name,
            entry.kind,
            entry.kms_key_id.as_deref(),
            stored,
        )
    }

    fn mappings_by_source(&self, name: &str) -> StoreResult<Vec<ReplicationMapping>> {
        let rows = self
            .db
            .with_conn(|conn| mapping_repo::list_mentioning(conn, name))?;
        let mut mappings = Vec::new();
        for row in rows {
            let mapping = mapping_to_model(row)?;
            if mapping.reads_from(name) {
                mappings.push(mapping);
            }
        }
        Ok(mappings)
    }

    fn mapping_by_destination(&self, name: &str) -> StoreResult<Option<ReplicationMapping>> {
        let row = self
            .db
            .with_conn(|conn| mapping_repo::find_by_destination(conn, name))?;
        Ok(row.map(mapping_to_model).transpose()?)
    }

    fn put_mapping(&self, mapping: &ReplicationMapping) -> StoreResult<()> {
        self.policy.check(&mapping.destination)?;
        let source_json = serde_json::to_string(&mapping.source)
            .map_err(|e| StoreError::Transport(format!("Failed to encode mapping source: {}", e)))?;
        let row = MappingRow {
            destination: mapping.destination.clone(),
            source_json,
            namespace: mapping.namespace.clone(),
            kind: mapping.kind.as_str().to_string(),
            env: mapping.env.clone(),
            user: mapping.user.clone(),
            time_ms: mapping.timestamp.timestamp_millis(),
        };
        self.db.with_conn(|conn| mapping_repo::upsert(conn, &row))?;
        Ok(())
    }

    fn delete_mapping(&self, destination: &str) -> StoreResult<()> {
        self.policy.check(destination)?;
        self.db
            .with_conn(|conn| mapping_repo::remove(conn, destination))?;
        Ok(())
    }

    fn list_mappings_under_namespace(
        &self,
        namespace: &str,
    ) -> StoreResult<Vec<ReplicationMapping>> {
        let rows = self
            .db
            .with_conn(|conn| mapping_repo::list_under(conn, namespace))?;
        Ok(rows
            .into_iter()
            .map(mapping_to_model)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
