//! Fetch coordinator
//!
//! Performs attribute lookups against the configured sources in priority
//! order. Remote lookups are rate limited:
//! - at most `max_concurrent` remote fetches execute at once
//! - consecutive fetch starts are at least `min_start_spacing` apart
//!
//! Waiters queue on a semaphore for a slot, then on a FIFO start gate that
//! enforces the spacing.

use crate::source::AttributeSource;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tint_core::{AttributeRecord, EntityId, FetchConfig};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep_until, Instant};

/// Coordinator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Remote fetches started
    pub remote_started: u64,
    /// Remote fetches that failed (transport, status or payload)
    pub remote_failed: u64,
    /// Lookups answered by a local source
    pub local_hits: u64,
    /// Highest number of simultaneously executing remote fetches
    pub peak_concurrency: usize,
}

#[derive(Debug, Default)]
struct Counters {
    remote_started: AtomicU64,
    remote_failed: AtomicU64,
    local_hits: AtomicU64,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the active count even if the fetch future is dropped
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded-concurrency, rate-limited attribute fetcher
#[derive(Debug)]
pub struct FetchCoordinator {
    /// Sources in priority order
    sources: Vec<Arc<dyn AttributeSource>>,
    /// Remote execution slots
    slots: Semaphore,
    /// Minimum spacing between remote fetch starts
    min_spacing: Duration,
    /// Start time of the most recent remote fetch
    last_start: Mutex<Option<Instant>>,
    counters: Counters,
}

impl FetchCoordinator {
    /// Create coordinator with no sources
    ///
    /// `max_concurrent` is clamped to at least one.
    #[must_use]
    pub fn new(max_concurrent: usize, min_spacing: Duration) -> Self {
        Self {
            sources: Vec::new(),
            slots: Semaphore::new(max_concurrent.max(1)),
            min_spacing,
            last_start: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Create coordinator from fetch settings
    #[must_use]
    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_concurrent, config.min_start_spacing())
    }

    /// Append a source; earlier sources are consulted first
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn AttributeSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of configured sources
    #[inline]
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch attributes, trying each source in order
    ///
    /// Source errors are logged and treated as "no data"; the next source is
    /// still consulted.
    pub async fn fetch(&self, entity_id: &EntityId) -> Option<AttributeRecord> {
        for source in &self.sources {
            let result = if source.is_remote() {
                self.fetch_remote(source.as_ref(), entity_id).await
            } else {
                source.fetch(entity_id).await
            };

            match result {
                Ok(Some(record)) => {
                    if !source.is_remote() {
                        self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                    }
                    tracing::debug!(entity = %entity_id, source = source.name(), "attributes found");
                    return Some(record);
                }
                Ok(None) => {}
                Err(err) => {
                    if source.is_remote() {
                        self.counters.remote_failed.fetch_add(1, Ordering::Relaxed);
                    }
                    tracing::warn!(
                        entity = %entity_id,
                        source = source.name(),
                        transient = err.is_transient(),
                        "attribute fetch failed: {err}"
                    );
                }
            }
        }
        None
    }

    async fn fetch_remote(
        &self,
        source: &dyn AttributeSource,
        entity_id: &EntityId,
    ) -> crate::SourceResult<Option<AttributeRecord>> {
        // the semaphore is never closed
        let Ok(_permit) = self.slots.acquire().await else {
            return Ok(None);
        };
        self.wait_for_start_gate().await;

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.counters.active);
        self.counters.peak.fetch_max(active, Ordering::SeqCst);
        self.counters.remote_started.fetch_add(1, Ordering::Relaxed);

        source.fetch(entity_id).await
    }

    /// Wait until `min_spacing` has passed since the previous start
    async fn wait_for_start_gate(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(previous) = *last {
            let ready = previous + self.min_spacing;
            if ready > Instant::now() {
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            remote_started: self.counters.remote_started.load(Ordering::Relaxed),
            remote_failed: self.counters.remote_failed.load(Ordering::Relaxed),
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            peak_concurrency: self.counters.peak.load(Ordering::SeqCst),
        }
    }

    /// Remote fetches executing right now
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}
