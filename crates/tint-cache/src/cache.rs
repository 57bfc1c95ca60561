//! Attribute cache using moka
//!
//! Holds at most one record per normalized entity id. Entries never expire
//! within a session; the cache is cleared only by an explicit reset.

use moka::future::Cache;
use std::sync::Arc;
use tint_core::AttributeRecord;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Entity id → attribute record store
///
/// Keys are [`tint_core::EntityId::cache_key`] values, so fetched and
/// snapshot-sourced entries for the same entity collide.
#[derive(Debug, Clone)]
pub struct AttributeCache {
    inner: Cache<String, Arc<AttributeRecord>>,
}

impl AttributeCache {
    /// Create an unbounded cache; entries live for the whole session
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    /// Look up record by normalized key
    #[inline]
    pub async fn get(&self, key: &str) -> Option<Arc<AttributeRecord>> {
        self.inner.get(key).await
    }

    /// Store record, replacing any previous record for the entity
    pub async fn insert(&self, record: AttributeRecord) -> Arc<AttributeRecord> {
        let key = record.entity_id.cache_key();
        let record = Arc::new(record);
        self.inner.insert(key, Arc::clone(&record)).await;
        record
    }

    /// Store record only if the entity has no record yet
    ///
    /// Returns `true` when the record was inserted.
    pub async fn insert_if_absent(&self, record: AttributeRecord) -> bool {
        let key = record.entity_id.cache_key();
        self.inner
            .entry(key)
            .or_insert(Arc::new(record))
            .await
            .is_fresh()
    }

    /// Check if cache holds a record for the key
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Drop every record
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Exact entry count, after flushing pending maintenance
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get cache statistics (approximate count)
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for AttributeCache {
    fn default() -> Self {
        Self::new()
    }
}
