//! In-process cache provider.
//!
//! LRU-bounded map of encoded node values. This is the process-default
//! backend that named backends fall back to.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::Instant;

use bytes::Bytes;
use lru::LruCache;

use super::lock;
use super::provider::{CacheError, CacheProvider, Timeout};

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

pub struct LocalCache {
    entries: RwLock<LruCache<String, Entry>>,
}

impl LocalCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        lock::read(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(value: Bytes, timeout: Timeout) -> Entry {
        let expires_at = match timeout {
            Timeout::Never => None,
            Timeout::After(ttl) => Some(Instant::now() + ttl),
        };
        Entry { value, expires_at }
    }
}

/// Read a live entry, dropping it when expired.
fn lookup(entries: &mut LruCache<String, Entry>, key: &str, now: Instant) -> Option<Bytes> {
    let (expired, value) = entries
        .get(key)
        .map(|entry| (entry.is_expired(now), entry.value.clone()))?;
    if expired {
        entries.pop(key);
        return None;
    }
    Some(value)
}

impl CacheProvider for LocalCache {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = lock::write(&self.entries, "get");
        Ok(lookup(&mut entries, key, now))
    }

    fn set(&self, key: &str, value: Bytes, timeout: Timeout) -> Result<(), CacheError> {
        lock::write(&self.entries, "set").put(key.to_string(), Self::entry(value, timeout));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        lock::write(&self.entries, "delete").pop(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        lock::write(&self.entries, "clear").clear();
        Ok(())
    }

    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = lock::write(&self.entries, "get_many");
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = lookup(&mut entries, key, now) {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn set_many(&self, items: Vec<(String, Bytes)>, timeout: Timeout) -> Result<(), CacheError> {
        let mut entries = lock::write(&self.entries, "set_many");
        for (key, value) in items {
            entries.put(key, Self::entry(value, timeout));
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = lock::write(&self.entries, "delete_many");
        for key in keys {
            entries.pop(key.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    use super::*;

    fn cache(capacity: usize) -> LocalCache {
        LocalCache::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    #[test]
    fn set_get_delete() {
        let cache = cache(8);
        assert!(cache.get("a").expect("get").is_none());

        cache.set("a", Bytes::from("1"), Timeout::Never).expect("set");
        assert_eq!(cache.get("a").expect("get"), Some(Bytes::from("1")));

        cache.delete("a").expect("delete");
        assert!(cache.get("a").expect("get").is_none());

        // deleting again is a no-op
        cache.delete("a").expect("delete missing");
    }

    #[test]
    fn bulk_operations_skip_absent_keys() {
        let cache = cache(8);
        cache
            .set_many(
                vec![
                    ("a".to_string(), Bytes::from("1")),
                    ("b".to_string(), Bytes::from("2")),
                ],
                Timeout::Never,
            )
            .expect("set_many");

        let found = cache
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .expect("get_many");
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("b"), Some(&Bytes::from("2")));

        cache
            .delete_many(&["a".to_string(), "c".to_string()])
            .expect("delete_many");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_read_as_missing() {
        let cache = cache(8);
        cache
            .set("a", Bytes::from("1"), Timeout::After(Duration::ZERO))
            .expect("set");
        assert!(cache.get("a").expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction() {
        let cache = cache(2);
        cache.set("a", Bytes::from("1"), Timeout::Never).expect("set");
        cache.set("b", Bytes::from("2"), Timeout::Never).expect("set");
        assert!(cache.get("a").expect("get").is_some());

        cache.set("c", Bytes::from("3"), Timeout::Never).expect("set");

        assert!(cache.get("b").expect("get").is_none()); // Evicted
        assert!(cache.get("a").expect("get").is_some());
        assert!(cache.get("c").expect("get").is_some());
    }

    #[test]
    fn clear_flushes_everything() {
        let cache = cache(8);
        cache.set("a", Bytes::from("1"), Timeout::Never).expect("set");
        cache.clear().expect("clear");
        assert!(cache.is_empty());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = cache(8);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.set("a", Bytes::from("1"), Timeout::Never).expect("set");
        assert!(cache.get("a").expect("get").is_some());
    }
}
