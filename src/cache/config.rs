//! Cache configuration.
//!
//! Controls named cache backends and publish-time warming via `djedi.toml`.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use serde::Deserialize;

pub const DEFAULT_BACKEND: &str = "default";
pub const DEFAULT_CACHE_NAME: &str = "djedi";
const DEFAULT_CAPACITY: usize = 1024;

/// One named backend.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheBackendConfig {
    /// Maximum entries kept in the LRU.
    pub capacity: usize,
    /// Wrap the backend with traffic counters.
    pub instrumented: bool,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            instrumented: false,
        }
    }
}

impl CacheBackendConfig {
    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend the node cache uses; falls back to `default` when undeclared.
    pub name: String,
    /// Store the new latest revision right after publishing.
    pub warm_on_publish: bool,
    pub backends: BTreeMap<String, CacheBackendConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(DEFAULT_BACKEND.to_string(), CacheBackendConfig::default());
        Self {
            name: DEFAULT_CACHE_NAME.to_string(),
            warm_on_publish: true,
            backends,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            name: settings.name.clone(),
            warm_on_publish: settings.warm_on_publish,
            backends: settings.backends.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.name, "djedi");
        assert!(config.warm_on_publish);
        assert_eq!(
            config.backends.get(DEFAULT_BACKEND),
            Some(&CacheBackendConfig {
                capacity: 1024,
                instrumented: false
            })
        );
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let backend = CacheBackendConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(backend.capacity_non_zero().get(), 1);
    }
}
