//! Node cache over an external provider.
//!
//! Values are framed with [`codec`](super::codec) and stored without expiry;
//! the storage engine owns invalidation. Every failure (provider error,
//! undecodable value, unparseable uri) is logged and reads as a miss.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::domain::node::Node;
use crate::domain::uri::Uri;

use super::codec;
use super::provider::{CacheProvider, Timeout};

const SOURCE: &str = "cache::backend";

#[derive(Clone)]
pub struct NodeCache {
    provider: Arc<dyn CacheProvider>,
}

impl NodeCache {
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self { provider }
    }

    pub fn get(&self, key: &str) -> Option<Node> {
        match self.provider.get(key) {
            Ok(value) => value.and_then(|value| decode_node(key, &value)),
            Err(err) => {
                warn!(target: SOURCE, key, error = %err, "Cache get failed, treating as miss");
                None
            }
        }
    }

    /// Cached nodes by key; misses are omitted.
    pub fn get_many(&self, keys: &[String]) -> HashMap<String, Node> {
        if keys.is_empty() {
            return HashMap::new();
        }
        match self.provider.get_many(keys) {
            Ok(values) => values
                .into_iter()
                .filter_map(|(key, value)| decode_node(&key, &value).map(|node| (key, node)))
                .collect(),
            Err(err) => {
                warn!(
                    target: SOURCE,
                    keys = keys.len(),
                    error = %err,
                    "Cache get_many failed, treating as misses"
                );
                HashMap::new()
            }
        }
    }

    pub fn set(&self, key: &str, node: &Node) {
        let value = codec::encode(&node.uri.to_string(), node.content.as_deref());
        if let Err(err) = self.provider.set(key, value, Timeout::Never) {
            warn!(target: SOURCE, key, error = %err, "Cache set failed");
        }
    }

    pub fn set_many<'a, I>(&self, nodes: I)
    where
        I: IntoIterator<Item = (String, &'a Node)>,
    {
        let entries: Vec<_> = nodes
            .into_iter()
            .map(|(key, node)| {
                let value = codec::encode(&node.uri.to_string(), node.content.as_deref());
                (key, value)
            })
            .collect();
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        if let Err(err) = self.provider.set_many(entries, Timeout::Never) {
            warn!(target: SOURCE, keys = count, error = %err, "Cache set_many failed");
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(err) = self.provider.delete(key) {
            warn!(target: SOURCE, key, error = %err, "Cache delete failed");
        }
    }

    pub fn delete_many(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Err(err) = self.provider.delete_many(keys) {
            warn!(target: SOURCE, keys = keys.len(), error = %err, "Cache delete_many failed");
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.provider.clear() {
            warn!(target: SOURCE, error = %err, "Cache clear failed");
        }
    }
}

fn decode_node(key: &str, value: &[u8]) -> Option<Node> {
    let decoded = match codec::decode(value) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(target: SOURCE, key, error = %err, "Discarding undecodable cache value");
            return None;
        }
    };
    let Some(raw_uri) = decoded.uri else {
        warn!(target: SOURCE, key, "Discarding cache value without uri");
        return None;
    };
    match Uri::parse(&raw_uri) {
        Ok(uri) => Some(Node {
            uri,
            content: decoded.content,
            meta: None,
        }),
        Err(err) => {
            warn!(target: SOURCE, key, error = %err, "Discarding cache value with malformed uri");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use bytes::Bytes;

    use super::*;
    use crate::cache::local::LocalCache;
    use crate::cache::provider::CacheError;

    struct Unavailable;

    impl CacheProvider for Unavailable {
        fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        fn set(&self, _key: &str, _value: Bytes, _timeout: Timeout) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    fn local() -> (Arc<LocalCache>, NodeCache) {
        let provider = Arc::new(LocalCache::new(NonZeroUsize::new(16).expect("capacity")));
        (provider.clone(), NodeCache::new(provider))
    }

    fn node(uri: &str, content: Option<&str>) -> Node {
        Node {
            uri: Uri::parse(uri).expect("uri"),
            content: content.map(str::to_string),
            meta: None,
        }
    }

    #[test]
    fn stores_encoded_values() {
        let (provider, cache) = local();
        let stored = node("i18n://sv-se@page/title.md#1", Some("# Djedi"));
        cache.set("i18n://sv-se@page/title", &stored);

        let raw = provider
            .get("i18n://sv-se@page/title")
            .expect("get")
            .expect("value");
        assert_eq!(&raw[..], b"i18n://sv-se@page/title.md#1|# Djedi");

        assert_eq!(cache.get("i18n://sv-se@page/title"), Some(stored));
    }

    #[test]
    fn absent_content_is_a_hit() {
        let (_, cache) = local();
        cache.set("k", &node("i18n://sv-se@page/empty.txt#draft", None));

        let hit = cache.get("k").expect("hit");
        assert_eq!(hit.content, None);
        assert_eq!(hit.uri.to_string(), "i18n://sv-se@page/empty.txt#draft");
    }

    #[test]
    fn bulk_roundtrip_omits_misses() {
        let (_, cache) = local();
        let a = node("i18n://sv-se@page/a.txt#1", Some("A"));
        let b = node("i18n://sv-se@page/b.txt#1", Some("B"));
        cache.set_many([("a".to_string(), &a), ("b".to_string(), &b)]);

        let found = cache.get_many(&["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("b"), Some(&b));

        cache.delete_many(&["a".to_string()]);
        assert!(cache.get("a").is_none());
        cache.clear();
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn garbage_values_read_as_misses() {
        let (provider, cache) = local();
        provider
            .set("bad", Bytes::from_static(&[0xff, 0xfe]), Timeout::Never)
            .expect("set");
        provider
            .set("no-uri", Bytes::from_static(b"|content"), Timeout::Never)
            .expect("set");
        assert!(cache.get("bad").is_none());
        assert!(cache.get("no-uri").is_none());
    }

    #[test]
    fn provider_failures_degrade_to_misses() {
        let cache = NodeCache::new(Arc::new(Unavailable));
        let stored = node("i18n://sv-se@page/title.txt#1", Some("x"));

        cache.set("k", &stored);
        cache.set_many([("k".to_string(), &stored)]);
        assert!(cache.get("k").is_none());
        assert!(cache.get_many(&["k".to_string()]).is_empty());
        cache.delete("k");
        cache.delete_many(&["k".to_string()]);
        cache.clear();
    }
}
