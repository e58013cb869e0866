//! In-memory cache backend.

use dashmap::DashMap;

use super::{CacheResult, ContentCache};
use crate::scanner::Digest;

/// Concurrent in-memory cache, lost when the process exits.
///
/// Reverse lookups scan every entry. A `put` racing with a scan may or may
/// not be seen by it; the engine only scans after indexing has finished.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Digest>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentCache for MemoryCache {
    fn put(&self, key: &str, digest: &Digest) -> CacheResult<()> {
        self.entries.insert(key.to_string(), *digest);
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Option<Digest>> {
        Ok(self.entries.get(key).map(|entry| *entry.value()))
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn get_by_digest(&self, digest: &Digest) -> CacheResult<Option<String>> {
        Ok(self
            .entries
            .iter()
            .find(|entry| entry.value() == digest)
            .map(|entry| entry.key().clone()))
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}
