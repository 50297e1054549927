//! Named store handles, opened lazily and shared.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::info;

use crate::config::OgmConfig;
use crate::Result;

use super::GraphStore;

/// Explicit connection cache keyed by store name.
///
/// Handles are never invalidated behind the caller's back; `close`
/// drops the pool's reference and the store goes away once the last
/// `Arc` held elsewhere is released.
pub struct StorePool<S: GraphStore> {
    stores: Mutex<HashMap<String, Arc<S>>>,
}

impl<S: GraphStore> Default for StorePool<S> {
    fn default() -> Self {
        Self { stores: Mutex::new(HashMap::new()) }
    }
}

impl<S: GraphStore> StorePool<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store registered under `config.store_name`, opened with
    /// `factory` on first use.
    pub fn open<F>(&self, config: &OgmConfig, factory: F) -> Result<Arc<S>>
    where
        F: FnOnce(&OgmConfig) -> Result<S>,
    {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(&config.store_name) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(factory(config)?);
        info!(name = %config.store_name, url = %config.store_url, "opened store");
        stores.insert(config.store_name.clone(), Arc::clone(&store));
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<Arc<S>> {
        self.stores.lock().get(name).cloned()
    }

    /// Forget the named store. Returns whether it was open.
    pub fn close(&self, name: &str) -> bool {
        let closed = self.stores.lock().remove(name).is_some();
        if closed {
            info!(name, "closed store");
        }
        closed
    }

    pub fn close_all(&self) {
        let mut stores = self.stores.lock();
        let count = stores.len();
        stores.clear();
        info!(count, "closed all stores");
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::Error;

    #[test]
    fn test_open_is_lazy_and_shared() {
        let pool: StorePool<MemoryStore> = StorePool::new();
        let config = OgmConfig::default();
        let a = pool.open(&config, |_| Ok(MemoryStore::new())).unwrap();
        let b = pool
            .open(&config, |_| Err(Error::ConfigError("factory must not run twice".into())))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_close() {
        let pool: StorePool<MemoryStore> = StorePool::new();
        let mut config = OgmConfig::default();
        pool.open(&config, |_| Ok(MemoryStore::new())).unwrap();
        config.store_name = "analytics".into();
        pool.open(&config, |_| Ok(MemoryStore::new())).unwrap();

        assert!(pool.close("default"));
        assert!(!pool.close("default"));
        assert!(pool.get("analytics").is_some());
        pool.close_all();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_factory_error_leaves_pool_empty() {
        let pool: StorePool<MemoryStore> = StorePool::new();
        let result = pool.open(&OgmConfig::default(), |_| Err(Error::ConfigError("unreachable".into())));
        assert!(result.is_err());
        assert!(pool.is_empty());
    }
}
