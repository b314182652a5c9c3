use std::path::PathBuf;
use thiserror::Error;

use crate::model::ReplicationMapping;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ParamSyncError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key ring error: {0}")]
    KeyRing(#[from] crate::crypto::KeyRingError),

    #[error("Database error: {0}")]
    Database(#[from] crate::store::sqlite::DatabaseError),

    #[error("'{name}' is outside namespace '{namespace}': {reason}")]
    NamespaceViolation {
        name: String,
        namespace: String,
        reason: String,
    },

    #[error("'{name}' is the source of {} replication mapping(s)", .destinations.len())]
    ReplicationSourceLocked {
        name: String,
        destinations: Vec<ReplicationMapping>,
    },

    #[error("Missing expected parameters: {}", .names.join(", "))]
    MissingExpectedNames { names: Vec<String> },

    #[error("No version selected for '{name}'")]
    AmbiguousRestoreTarget { name: String },

    #[error("'{name}' is a replication destination and is managed by its source")]
    ReplicationDestination { name: String },

    #[error("Restore stopped at '{last_parameter}' after {restored} restore(s): {source}")]
    RestoreAborted {
        last_parameter: String,
        restored: usize,
        #[source]
        source: StoreError,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ParamSyncError {
    pub fn namespace_violation(
        name: impl Into<String>,
        namespace: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ParamSyncError::NamespaceViolation {
            name: name.into(),
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse manifest YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Manifest validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Settings validation failed: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to access cache file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache file '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to refresh parameter names: {0}")]
    Refresh(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ParamSyncError>;
