// SPDX-License-Identifier: PMPL-1.0-or-later
//! Per-namespace plan caches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::cache::PlanCache;
use crate::config::CacheConfig;
use crate::error::PlanCacheError;

/// Owns one [`PlanCache`] per collection namespace (`db.collection`).
pub struct PlanCacheRegistry {
    config: CacheConfig,
    caches: Mutex<HashMap<String, Arc<PlanCache>>>,
}

impl Default for PlanCacheRegistry {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
            caches: Mutex::new(HashMap::new()),
        }
    }
}

impl PlanCacheRegistry {
    /// Create a registry whose caches all use `config`.
    pub fn new(config: CacheConfig) -> Result<Self, PlanCacheError> {
        config.validate()?;
        Ok(Self {
            config,
            caches: Mutex::new(HashMap::new()),
        })
    }

    /// The cache for `namespace`, created on first use.
    pub fn get_or_create(&self, namespace: &str) -> Arc<PlanCache> {
        let mut caches = self.lock();
        if let Some(cache) = caches.get(namespace) {
            return Arc::clone(cache);
        }
        let cache = Arc::new(PlanCache::new(self.config.clone()).unwrap_or_default());
        caches.insert(namespace.to_string(), Arc::clone(&cache));
        info!(namespace, "Created plan cache");
        cache
    }

    /// The cache for `namespace`, if the collection has one.
    pub fn get(&self, namespace: &str) -> Option<Arc<PlanCache>> {
        self.lock().get(namespace).cloned()
    }

    /// Forget a collection's cache. Returns whether one existed.
    pub fn drop_namespace(&self, namespace: &str) -> bool {
        let removed = self.lock().remove(namespace).is_some();
        if removed {
            info!(namespace, "Dropped plan cache");
        }
        removed
    }

    /// Namespaces with a cache, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<PlanCache>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
