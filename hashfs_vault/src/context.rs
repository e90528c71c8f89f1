//! Wiring for an unlocked vault session: keys, store handle, tunables.

use hashfs_core::VaultKeys;
use hashfs_core::store::KvStore;
use std::sync::Arc;

/// Engine tunables; hosts usually keep the defaults.
#[derive(Debug, Clone, Copy)]
pub struct VaultConfig {
    /// Maximum retained versions per file.
    pub version_limit: usize,
    /// Capacity of the in-memory chain cache.
    pub chain_cache_capacity: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            version_limit: crate::DEFAULT_VERSION_LIMIT,
            chain_cache_capacity: crate::DEFAULT_CHAIN_CACHE_CAPACITY,
        }
    }
}

/// Everything an unlocked engine needs to touch storage.
///
/// The key set scrubs itself on drop, so tearing down the context ends
/// the session cryptographically.
pub struct VaultContext {
    pub keys: VaultKeys,
    pub store: Arc<dyn KvStore>,
    pub config: VaultConfig,
}

impl VaultContext {
    pub fn new(keys: VaultKeys, store: Arc<dyn KvStore>, config: VaultConfig) -> Self {
        Self {
            keys,
            store,
            config,
        }
    }
}

impl std::fmt::Debug for VaultContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultContext")
            .field("keys", &self.keys)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
