//! Djedi node cache.
//!
//! Nodes are cached as codec-framed byte strings in a named backend chosen
//! once at startup:
//!
//! - [`CacheProvider`] is the byte-level provider interface; [`LocalCache`]
//!   is the in-process LRU implementation.
//! - [`InstrumentedCache`] wraps any provider with traffic counters.
//! - [`CacheRegistry`] resolves a backend name, falling back to `default`.
//! - [`NodeCache`] frames nodes and degrades provider failures to misses.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! name = "djedi"
//! warm_on_publish = true
//!
//! [cache.backends.default]
//! capacity = 1024
//!
//! [cache.backends.djedi]
//! capacity = 4096
//! instrumented = true
//! ```

mod backend;
pub mod codec;
mod config;
mod instrumented;
mod local;
mod lock;
mod provider;
mod registry;

pub use backend::NodeCache;
pub use config::{CacheBackendConfig, CacheConfig, DEFAULT_BACKEND, DEFAULT_CACHE_NAME};
pub use instrumented::{
    CacheStats, InstrumentedCache, METRIC_CACHE_CALLS, METRIC_CACHE_HIT, METRIC_CACHE_MISS,
    METRIC_CACHE_SET,
};
pub use local::LocalCache;
pub use provider::{CacheError, CacheProvider, Timeout};
pub use registry::{CacheRegistry, RegisteredBackend};
