//! Traffic-counting decorator for any cache provider.
//!
//! Each `get`/`get_many` is one call and records a hit or miss per key.
//! Each `set`/`set_many` is one call and one set, whatever the payload size.
//! Deletes and clears are forwarded uncounted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use metrics::counter;

use super::provider::{CacheError, CacheProvider, Timeout};

pub const METRIC_CACHE_CALLS: &str = "djedi_cache_calls_total";
pub const METRIC_CACHE_HIT: &str = "djedi_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "djedi_cache_miss_total";
pub const METRIC_CACHE_SET: &str = "djedi_cache_set_total";

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub calls: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

impl CacheStats {
    /// Traffic recorded between `earlier` and `self`.
    pub fn since(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            calls: self.calls.saturating_sub(earlier.calls),
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            sets: self.sets.saturating_sub(earlier.sets),
        }
    }
}

pub struct InstrumentedCache<P> {
    inner: P,
    calls: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl<P: CacheProvider> InstrumentedCache<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            calls: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            calls: self.calls.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_CALLS).increment(1);
    }

    fn record_lookups(&self, hits: u64, misses: u64) {
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(misses, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT).increment(hits);
        counter!(METRIC_CACHE_MISS).increment(misses);
    }

    fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_SET).increment(1);
    }
}

impl<P: CacheProvider> CacheProvider for InstrumentedCache<P> {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let result = self.inner.get(key)?;
        self.record_call();
        match result {
            Some(_) => self.record_lookups(1, 0),
            None => self.record_lookups(0, 1),
        }
        Ok(result)
    }

    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError> {
        let found = self.inner.get_many(keys)?;
        self.record_call();
        let hits = found.len() as u64;
        self.record_lookups(hits, (keys.len() as u64).saturating_sub(hits));
        Ok(found)
    }

    fn set(&self, key: &str, value: Bytes, timeout: Timeout) -> Result<(), CacheError> {
        self.inner.set(key, value, timeout)?;
        self.record_call();
        self.record_set();
        Ok(())
    }

    fn set_many(&self, entries: Vec<(String, Bytes)>, timeout: Timeout) -> Result<(), CacheError> {
        self.inner.set_many(entries, timeout)?;
        self.record_call();
        self.record_set();
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key)
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        self.inner.delete_many(keys)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear()
    }
}
