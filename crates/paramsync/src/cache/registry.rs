//! Bounded registry of store clients keyed by environment and role.

use std::sync::Arc;

use moka::sync::Cache;

use crate::error::Result;
use crate::store::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub env: String,
    pub role: String,
}

impl ClientKey {
    pub fn new(env: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            role: role.into(),
        }
    }
}

/// Builds a store client for a key. Session acquisition lives behind this.
pub type StoreFactory = Box<dyn Fn(&ClientKey) -> Result<Arc<dyn RemoteStore>> + Send + Sync>;

/// Creates clients on first use and keeps at most `max_capacity` of them;
/// the least recently used client is evicted first.
pub struct ClientRegistry {
    clients: Cache<ClientKey, Arc<dyn RemoteStore>>,
    factory: StoreFactory,
}

impl ClientRegistry {
    pub fn new(max_capacity: u64, factory: StoreFactory) -> Self {
        Self {
            clients: Cache::builder().max_capacity(max_capacity).build(),
            factory,
        }
    }

    pub fn get(&self, key: &ClientKey) -> Result<Arc<dyn RemoteStore>> {
        if let Some(client) = self.clients.get(key) {
            return Ok(client);
        }
        tracing::debug!(env = %key.env, role = %key.role, "Creating store client");
        let client = (self.factory)(key)?;
        self.clients.insert(key.clone(), Arc::clone(&client));
        Ok(client)
    }

    pub fn for_env(&self, env: &str, role: &str) -> Result<Arc<dyn RemoteStore>> {
        self.get(&ClientKey::new(env, role))
    }

    /// Drops a client, e.g. after its session expired.
    pub fn evict(&self, key: &ClientKey) {
        self.clients.invalidate(key);
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.clients.contains_key(key)
    }
}
