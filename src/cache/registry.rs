//! Named cache backends.
//!
//! Backends are built once at startup from configuration. Looking up a name
//! that was never declared yields the process-default backend.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::config::{CacheBackendConfig, CacheConfig, DEFAULT_BACKEND};
use super::instrumented::{CacheStats, InstrumentedCache};
use super::local::LocalCache;
use super::provider::CacheProvider;

/// Registered backend with optional handle to its counters.
#[derive(Clone)]
pub struct RegisteredBackend {
    pub provider: Arc<dyn CacheProvider>,
    pub stats: Option<Arc<InstrumentedCache<LocalCache>>>,
}

impl RegisteredBackend {
    pub fn plain(provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            provider,
            stats: None,
        }
    }

    pub fn instrumented(cache: Arc<InstrumentedCache<LocalCache>>) -> Self {
        Self {
            provider: cache.clone(),
            stats: Some(cache),
        }
    }

    pub fn stats(&self) -> Option<CacheStats> {
        self.stats.as_ref().map(|cache| cache.stats())
    }
}

pub struct CacheRegistry {
    backends: HashMap<String, RegisteredBackend>,
    default: RegisteredBackend,
}

impl CacheRegistry {
    /// Registry holding only the given default backend.
    pub fn new(default: RegisteredBackend) -> Self {
        Self {
            backends: HashMap::new(),
            default,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let mut default = None;
        let mut backends = HashMap::with_capacity(config.backends.len());

        for (name, backend) in &config.backends {
            let local = LocalCache::new(backend.capacity_non_zero());
            let registered = if backend.instrumented {
                RegisteredBackend::instrumented(Arc::new(InstrumentedCache::new(local)))
            } else {
                RegisteredBackend::plain(Arc::new(local))
            };
            info!(
                backend = %name,
                capacity = backend.capacity,
                instrumented = backend.instrumented,
                "Cache backend configured"
            );

            if name == DEFAULT_BACKEND {
                default = Some(registered);
            } else {
                backends.insert(name.clone(), registered);
            }
        }

        let default = default.unwrap_or_else(|| {
            let local = LocalCache::new(CacheBackendConfig::default().capacity_non_zero());
            RegisteredBackend::plain(Arc::new(local))
        });

        Self { backends, default }
    }

    pub fn register(&mut self, name: impl Into<String>, backend: RegisteredBackend) {
        let name = name.into();
        if name == DEFAULT_BACKEND {
            self.default = backend;
        } else {
            self.backends.insert(name, backend);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        name == DEFAULT_BACKEND || self.backends.contains_key(name)
    }

    pub fn default_backend(&self) -> &RegisteredBackend {
        &self.default
    }

    /// Backend registered under `name`, else the default one.
    pub fn resolve(&self, name: &str) -> RegisteredBackend {
        match self.backends.get(name) {
            Some(backend) => backend.clone(),
            None => {
                if name != DEFAULT_BACKEND {
                    debug!(backend = %name, "Cache backend not declared, using default");
                }
                self.default.clone()
            }
        }
    }
}
