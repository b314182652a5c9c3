//! Everything a command needs, built once per invocation.

use std::sync::Arc;

use anyhow::Context as _;
use paramsync::cache::{ClientKey, ClientRegistry, FileSnapshotStore, ParameterNameCache, SnapshotStore};
use paramsync::crypto::{resolve_key_material, KeyRing, KeyRingError};
use paramsync::replication::{NamespaceRules, ReplicationIndex};
use paramsync::settings::Settings;
use paramsync::store::{RemoteStore, SqliteStore};
use paramsync::sync::{ReconciliationEngine, SyncOptions};
use paramsync::warmup::WarmupPool;

/// Registry role of the clients the CLI opens.
const STORE_ROLE: &str = "default";

pub struct CommandContext {
    pub settings: Settings,
    pub env: String,
    pub user: String,
    pub registry: ClientRegistry,
    snapshots: Arc<dyn SnapshotStore>,
    default_key_id: Option<String>,
}

impl CommandContext {
    pub fn new(settings: Settings, env_override: Option<String>) -> anyhow::Result<Self> {
        let env = env_override.unwrap_or_else(|| settings.environment.clone());
        let user = settings.user();
        let keys = load_key_ring(&settings)?;
        let default_key_id = keys.key_ids().next().map(str::to_string);

        let factory_settings = settings.clone();
        let factory_user = user.clone();
        let registry = ClientRegistry::new(
            settings.registry_capacity,
            Box::new(move |key: &ClientKey| {
                let path = factory_settings.store_path_for(&key.env);
                let store = SqliteStore::open(&path, keys.clone())?.with_user(factory_user.clone());
                Ok(Arc::new(store) as Arc<dyn RemoteStore>)
            }),
        );

        let snapshots: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(settings.cache_dir()));

        Ok(Self {
            settings,
            env,
            user,
            registry,
            snapshots,
            default_key_id,
        })
    }

    pub fn default_key_id(&self) -> Option<String> {
        self.default_key_id.clone()
    }

    pub fn store(&self) -> anyhow::Result<Arc<dyn RemoteStore>> {
        self.store_for(&self.env)
    }

    pub fn store_for(&self, env: &str) -> anyhow::Result<Arc<dyn RemoteStore>> {
        self.registry
            .for_env(env, STORE_ROLE)
            .with_context(|| format!("Failed to open the {} store", env))
    }

    pub fn index(&self) -> anyhow::Result<ReplicationIndex> {
        Ok(ReplicationIndex::new(self.store()?))
    }

    pub fn rules(&self) -> NamespaceRules {
        self.settings.namespace_rules()
    }

    pub fn warmup(&self) -> WarmupPool {
        WarmupPool::new(self.settings.warmup_workers)
    }

    pub fn engine(&self) -> anyhow::Result<ReconciliationEngine> {
        let options = SyncOptions::new(&self.env, &self.user).with_warmup(self.warmup());
        Ok(ReconciliationEngine::new(self.index()?, options))
    }

    pub fn name_cache(&self, env: &str) -> anyhow::Result<ParameterNameCache> {
        Ok(ParameterNameCache::new(
            env,
            self.store_for(env)?,
            Arc::clone(&self.snapshots),
        ))
    }

    pub fn role(&self) -> &'static str {
        STORE_ROLE
    }
}

/// A missing key source is not an error: plain parameters still work and
/// secure ones fail per record.
fn load_key_ring(settings: &Settings) -> anyhow::Result<KeyRing> {
    let material = match resolve_key_material(
        None,
        settings.keys.file.as_deref(),
        Some(settings.keys.env_var.as_str()),
    ) {
        Ok(material) => material,
        Err(KeyRingError::NoSourceProvided | KeyRingError::EnvVarNotSet { .. }) => {
            tracing::debug!("No key material configured, SecureString values are unavailable");
            return Ok(KeyRing::empty());
        }
        Err(e) => return Err(e).context("Failed to load key material"),
    };
    KeyRing::from_material(&material).context("Invalid key material")
}
