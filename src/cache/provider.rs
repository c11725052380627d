//! External cache provider interface.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Expiry policy for a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Keep until explicitly deleted or evicted.
    Never,
    After(Duration),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache provider unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Byte-oriented key/value cache.
///
/// Bulk methods default to looping over the single-key methods; providers
/// with native bulk commands should override them. Deleting a missing key is
/// not an error.
pub trait CacheProvider: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    fn set(&self, key: &str, value: Bytes, timeout: Timeout) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn clear(&self) -> Result<(), CacheError>;

    /// Fetch several keys; absent keys are omitted from the result.
    fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, CacheError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn set_many(&self, entries: Vec<(String, Bytes)>, timeout: Timeout) -> Result<(), CacheError> {
        for (key, value) in entries {
            self.set(&key, value, timeout)?;
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}
