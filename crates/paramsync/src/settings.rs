//! User settings: which environments exist, where their stores live and
//! which namespaces the user may restore.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::KEYRING_ENV_VAR;
use crate::error::SettingsError;
use crate::model::normalize_namespace;
use crate::replication::NamespaceRules;
use crate::warmup::{DEFAULT_WORKERS, MAX_WORKERS};

pub const ENV_VAR_ENVIRONMENT: &str = "PARAMSYNC_ENV";
pub const ENV_VAR_STORE: &str = "PARAMSYNC_STORE";
pub const ENV_VAR_USER: &str = "PARAMSYNC_USER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Environment commands run against unless told otherwise.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Every environment known to the user, e.g. for cache priming.
    #[serde(default = "default_environments")]
    pub environments: Vec<String>,

    /// SQLite store file. Defaults to `~/.paramsync/data/<env>.db`.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Directory for parameter name snapshots.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_service_namespace")]
    pub service_namespace: String,

    #[serde(default = "default_shared_namespace")]
    pub shared_namespace: String,

    /// Namespaces the user may restore.
    #[serde(default)]
    pub authorized_namespaces: Vec<String>,

    /// Identity recorded on mappings and audit entries.
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default = "default_warmup_workers")]
    pub warmup_workers: usize,

    /// Maximum number of store clients kept open at once.
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: u64,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub keys: KeySourceSettings,
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_environments() -> Vec<String> {
    vec!["dev".to_string()]
}

fn default_service_namespace() -> String {
    "/app/".to_string()
}

fn default_shared_namespace() -> String {
    "/shared/".to_string()
}

fn default_warmup_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_registry_capacity() -> u64 {
    8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Where the key ring is read from. First non-empty source wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySourceSettings {
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_keys_env_var")]
    pub env_var: String,
}

fn default_keys_env_var() -> String {
    KEYRING_ENV_VAR.to_string()
}

impl Default for KeySourceSettings {
    fn default() -> Self {
        Self {
            file: None,
            env_var: default_keys_env_var(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            environments: default_environments(),
            store_path: None,
            cache_dir: None,
            service_namespace: default_service_namespace(),
            shared_namespace: default_shared_namespace(),
            authorized_namespaces: Vec::new(),
            user: None,
            warmup_workers: DEFAULT_WORKERS,
            registry_capacity: default_registry_capacity(),
            logging: LoggingSettings::default(),
            keys: KeySourceSettings::default(),
        }
    }
}

impl Settings {
    /// `~/.paramsync/settings.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".paramsync").join("settings.yaml"))
    }

    /// Loads settings from `path`, or from the default location when it
    /// exists, then applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content).map_err(|e| SettingsError::ParseYaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Applies `PARAMSYNC_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup(ENV_VAR_ENVIRONMENT).filter(|v| !v.is_empty()) {
            self.environment = env;
        }
        if let Some(store) = lookup(ENV_VAR_STORE).filter(|v| !v.is_empty()) {
            self.store_path = Some(PathBuf::from(store));
        }
        if let Some(user) = lookup(ENV_VAR_USER).filter(|v| !v.is_empty()) {
            self.user = Some(user);
        }
    }

    fn normalize(&mut self) {
        self.service_namespace = normalize_namespace(&self.service_namespace);
        self.shared_namespace = normalize_namespace(&self.shared_namespace);
        for ns in &mut self.authorized_namespaces {
            *ns = normalize_namespace(ns);
        }
        if !self.environments.contains(&self.environment) {
            self.environments.push(self.environment.clone());
        }
    }

    /// Collects every problem before failing.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut errors = Vec::new();

        if self.environment.trim().is_empty() {
            errors.push("environment must not be empty".to_string());
        }
        for (field, ns) in [
            ("serviceNamespace", &self.service_namespace),
            ("sharedNamespace", &self.shared_namespace),
        ] {
            if !ns.starts_with('/') {
                errors.push(format!("{} '{}' must start with '/'", field, ns));
            }
        }
        if self.service_namespace == self.shared_namespace {
            errors.push("serviceNamespace and sharedNamespace must differ".to_string());
        }
        for ns in &self.authorized_namespaces {
            if !ns.starts_with('/') {
                errors.push(format!("authorized namespace '{}' must start with '/'", ns));
            }
        }
        if self.warmup_workers == 0 || self.warmup_workers > MAX_WORKERS {
            errors.push(format!(
                "warmupWorkers must be between 1 and {}, got {}",
                MAX_WORKERS, self.warmup_workers
            ));
        }
        if self.registry_capacity == 0 {
            errors.push("registryCapacity must be at least 1".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            errors.push(format!("invalid logging level '{}'", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Validation(errors.join("; ")))
        }
    }

    pub fn namespace_rules(&self) -> NamespaceRules {
        NamespaceRules {
            service_root: self.service_namespace.clone(),
            shared_root: self.shared_namespace.clone(),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(crate::cache::FileSnapshotStore::default_dir)
    }

    /// Store file for `env`. An explicit `storePath` only applies to the
    /// default environment.
    pub fn store_path_for(&self, env: &str) -> PathBuf {
        match &self.store_path {
            Some(path) if env == self.environment => path.clone(),
            _ => crate::store::sqlite::default_store_path(env)
                .unwrap_or_else(|| std::env::temp_dir().join("paramsync").join(format!("{}.db", env))),
        }
    }

    /// Configured user, then `$USER`, then "unknown".
    pub fn user(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
