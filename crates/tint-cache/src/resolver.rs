//! Attribute resolver
//!
//! Front door for attribute lookups. Combines the [`AttributeCache`] with an
//! in-flight table so that at most one fetch per entity is outstanding, no
//! matter how many callers ask concurrently. Each fetch runs as its own task,
//! so it settles and clears its in-flight entry even if every caller waiting
//! on it is dropped.

use crate::cache::AttributeCache;
use crate::coordinator::FetchCoordinator;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tint_core::{AttributeRecord, EntityId};

type PendingFetch = Shared<BoxFuture<'static, Option<Arc<AttributeRecord>>>>;

/// Removes the in-flight entry when the fetch settles or is dropped
struct InFlightGuard {
    table: Arc<DashMap<String, PendingFetch>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

/// Cached, de-duplicated attribute lookups
///
/// Cloning is cheap; clones share the cache, coordinator and in-flight table.
#[derive(Clone)]
pub struct AttributeResolver {
    cache: Arc<AttributeCache>,
    coordinator: Arc<FetchCoordinator>,
    in_flight: Arc<DashMap<String, PendingFetch>>,
    coalesced: Arc<AtomicU64>,
}

impl AttributeResolver {
    /// Create resolver over a cache and a coordinator
    #[must_use]
    pub fn new(cache: Arc<AttributeCache>, coordinator: Arc<FetchCoordinator>) -> Self {
        Self {
            cache,
            coordinator,
            in_flight: Arc::new(DashMap::new()),
            coalesced: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<AttributeCache> {
        &self.cache
    }

    /// Shared coordinator
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    /// Get attributes for an entity
    ///
    /// 1. cached record → returned without any fetch
    /// 2. fetch already in flight → await that fetch
    /// 3. otherwise start a fetch, cache a successful result
    ///
    /// Failures yield `None` and are not cached, so a later call retries.
    /// Must be called from within a tokio runtime.
    pub async fn get_attributes(&self, entity_id: &EntityId) -> Option<Arc<AttributeRecord>> {
        if entity_id.is_empty() {
            return None;
        }
        let key = entity_id.cache_key();

        if let Some(record) = self.cache.get(&key).await {
            return Some(record);
        }

        let pending = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(entity = %entity_id, "joining in-flight fetch");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let task = tokio::spawn(self.clone().fetch_and_store(entity_id.clone(), key));
                let fetch = task
                    .map(|joined| match joined {
                        Ok(record) => record,
                        Err(err) => {
                            tracing::error!("attribute fetch task failed: {err}");
                            None
                        }
                    })
                    .boxed()
                    .shared();
                slot.insert(fetch.clone());
                fetch
            }
        };

        pending.await
    }

    async fn fetch_and_store(self, entity_id: EntityId, key: String) -> Option<Arc<AttributeRecord>> {
        let _cleanup = InFlightGuard {
            table: Arc::clone(&self.in_flight),
            key: key.clone(),
        };

        // a fetch that settled between the cache miss and registration
        if let Some(record) = self.cache.get(&key).await {
            return Some(record);
        }

        let record = self.coordinator.fetch(&entity_id).await?;
        Some(self.cache.insert(record).await)
    }

    /// Fetches currently outstanding
    #[inline]
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Callers that joined an existing fetch instead of starting one
    #[inline]
    #[must_use]
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for AttributeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeResolver")
            .field("cache", &self.cache)
            .field("coordinator", &self.coordinator)
            .field("in_flight", &self.in_flight.len())
            .field("coalesced", &self.coalesced_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SourceError, SourceResult};
    use crate::source::AttributeSource;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct CountingRemote {
        calls: AtomicUsize,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl AttributeSource for CountingRemote {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn is_remote(&self) -> bool {
            true
        }

        async fn fetch(&self, entity_id: &EntityId) -> SourceResult<Option<AttributeRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SourceError::status(entity_id.as_str(), 502));
            }
            Ok(Some(AttributeRecord::new(entity_id.clone(), ["admin"])))
        }
    }

    fn resolver(remote: Arc<CountingRemote>) -> AttributeResolver {
        let coordinator = FetchCoordinator::new(3, Duration::ZERO).with_source(remote);
        AttributeResolver::new(Arc::new(AttributeCache::new()), Arc::new(coordinator))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_fetch() {
        let remote = Arc::new(CountingRemote::default());
        let resolver = resolver(remote.clone());
        let alice = EntityId::new("alice");

        let (a, b) = tokio::join!(resolver.get_attributes(&alice), resolver.get_attributes(&alice));

        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(resolver.coalesced_count(), 1);
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_result_skips_fetch() {
        let remote = Arc::new(CountingRemote::default());
        let resolver = resolver(remote.clone());

        resolver.get_attributes(&EntityId::new("Alice")).await.unwrap();
        resolver.get_attributes(&EntityId::new("alice")).await.unwrap();

        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_not_cached() {
        let remote = Arc::new(CountingRemote::default());
        remote.failures_left.store(1, Ordering::SeqCst);
        let resolver = resolver(remote.clone());
        let bob = EntityId::new("bob");

        assert!(resolver.get_attributes(&bob).await.is_none());
        assert!(!resolver.cache().contains("bob"));
        assert_eq!(resolver.in_flight_count(), 0);

        let retried = resolver.get_attributes(&bob).await.unwrap();
        assert_eq!(retried.categories[0].as_str(), "admin");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_still_completes() {
        let remote = Arc::new(CountingRemote::default());
        let coordinator = FetchCoordinator::new(1, Duration::ZERO).with_source(remote.clone());
        let resolver =
            AttributeResolver::new(Arc::new(AttributeCache::new()), Arc::new(coordinator));

        let alice = EntityId::new("alice");
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), resolver.get_attributes(&alice)).await;
        assert!(abandoned.is_err());

        let bob = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.get_attributes(&EntityId::new("bob")),
        )
        .await
        .expect("bob waited on an abandoned fetch");
        assert!(bob.is_some());

        // the abandoned fetch ran to completion and was cached
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert!(resolver.cache().contains("alice"));
        assert_eq!(resolver.in_flight_count(), 0);
        assert!(resolver.get_attributes(&alice).await.is_some());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_id_is_skipped() {
        let remote = Arc::new(CountingRemote::default());
        let resolver = resolver(remote.clone());

        assert!(resolver.get_attributes(&EntityId::new("   ")).await.is_none());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }
}
