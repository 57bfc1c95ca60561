//! Snapshot loading
//!
//! Pre-populates the [`AttributeCache`] from the bulk snapshot artifact before
//! any per-entity fetch is issued. Loading is memoized:
//!
//! - concurrent callers await the same attempt
//! - after a successful load, further calls return immediately
//! - a missing or broken artifact leaves the cache untouched and the next
//!   call tries again
//!
//! Entries never overwrite records already in the cache.

use crate::cache::AttributeCache;
use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tint_core::{FetchConfig, Snapshot, SnapshotConfig};

/// Capability to retrieve the bulk snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync + Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Retrieve the snapshot
    ///
    /// `Ok(None)` means the artifact has not been built yet.
    async fn fetch_snapshot(&self) -> SourceResult<Option<Snapshot>>;
}

/// Out-of-band "please build the snapshot" signal
pub trait RebuildRequest: Send + Sync + Debug {
    /// Ask the builder for a rebuild; must not block
    fn request_rebuild(&self);
}

/// Decode a snapshot body
///
/// # Errors
/// Returns [`SourceError::Malformed`] for undecodable bodies.
pub fn parse_snapshot(body: &[u8]) -> SourceResult<Option<Snapshot>> {
    let snapshot: Snapshot = serde_json::from_slice(body)?;
    if snapshot.is_building() {
        return Ok(None);
    }
    Ok(Some(snapshot))
}

/// Snapshot served over HTTP at a well-known path
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSnapshotSource {
    /// Create source from fetch and snapshot settings
    ///
    /// # Errors
    /// Returns [`SourceError::InvalidUrl`] if the URL cannot be formed.
    pub fn new(fetch: &FetchConfig, snapshot: &SnapshotConfig) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch.request_timeout())
            .build()?;
        Self::with_client(client, fetch, snapshot)
    }

    /// Create source sharing an existing client
    ///
    /// # Errors
    /// Returns [`SourceError::InvalidUrl`] if the URL cannot be formed.
    pub fn with_client(
        client: reqwest::Client,
        fetch: &FetchConfig,
        snapshot: &SnapshotConfig,
    ) -> SourceResult<Self> {
        let url = Url::parse(&fetch.base_url)
            .and_then(|base| base.join(&snapshot.url_path))
            .map_err(|e| SourceError::InvalidUrl(format!("{}{}: {e}", fetch.base_url, snapshot.url_path)))?;
        Ok(Self { client, url })
    }

    /// Snapshot URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_snapshot(&self) -> SourceResult<Option<Snapshot>> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::status(self.url.path(), status.as_u16()));
        }
        parse_snapshot(&response.bytes().await?)
    }
}

/// Snapshot artifact read straight from disk
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    /// Create source for an artifact path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Artifact path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch_snapshot(&self) -> SourceResult<Option<Snapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(body) => parse_snapshot(&body),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Result of one load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Snapshot applied to the cache
    Loaded {
        /// Entries inserted
        inserted: usize,
        /// Entries skipped because the cache already held the entity
        skipped: usize,
    },
    /// No artifact yet; a rebuild was requested if possible
    NotBuilt,
    /// Artifact unreadable
    Failed,
}

impl LoadOutcome {
    /// Whether the snapshot was applied
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

type PendingLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum LoadState {
    Idle,
    Loading(PendingLoad),
    Done(LoadOutcome),
}

struct LoaderInner {
    cache: Arc<AttributeCache>,
    source: Arc<dyn SnapshotSource>,
    rebuild: Option<Arc<dyn RebuildRequest>>,
    state: Mutex<LoadState>,
}

/// Memoized, one-shot snapshot loader
#[derive(Clone)]
pub struct SnapshotLoader {
    inner: Arc<LoaderInner>,
}

impl SnapshotLoader {
    /// Create loader feeding `cache` from `source`
    #[must_use]
    pub fn new(cache: Arc<AttributeCache>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                cache,
                source,
                rebuild: None,
                state: Mutex::new(LoadState::Idle),
            }),
        }
    }

    /// Create loader that asks for a rebuild when the artifact is missing
    #[must_use]
    pub fn with_rebuild(
        cache: Arc<AttributeCache>,
        source: Arc<dyn SnapshotSource>,
        rebuild: Arc<dyn RebuildRequest>,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                cache,
                source,
                rebuild: Some(rebuild),
                state: Mutex::new(LoadState::Idle),
            }),
        }
    }

    /// Load the snapshot into the cache
    ///
    /// Never fails; see [`LoadOutcome`].
    pub async fn load_snapshot(&self) -> LoadOutcome {
        let pending = {
            let mut state = self.inner.state.lock();
            match &*state {
                LoadState::Done(outcome) => return *outcome,
                LoadState::Loading(pending) => pending.clone(),
                LoadState::Idle => {
                    let inner = Arc::clone(&self.inner);
                    let pending = async move { inner.run().await }.boxed().shared();
                    *state = LoadState::Loading(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Whether a load has completed successfully
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(*self.inner.state.lock(), LoadState::Done(_))
    }
}

impl LoaderInner {
    async fn run(&self) -> LoadOutcome {
        let outcome = match self.source.fetch_snapshot().await {
            Ok(Some(snapshot)) => self.apply(&snapshot).await,
            Ok(None) => {
                tracing::info!(source = self.source.name(), "snapshot not built yet");
                if let Some(rebuild) = &self.rebuild {
                    rebuild.request_rebuild();
                }
                LoadOutcome::NotBuilt
            }
            Err(err) => {
                tracing::warn!(source = self.source.name(), "snapshot load failed: {err}");
                LoadOutcome::Failed
            }
        };

        // only success is memoized
        *self.state.lock() = if outcome.is_loaded() {
            LoadState::Done(outcome)
        } else {
            LoadState::Idle
        };
        outcome
    }

    async fn apply(&self, snapshot: &Snapshot) -> LoadOutcome {
        let mut inserted = 0;
        let mut skipped = 0;
        for record in snapshot.records() {
            if record.entity_id.is_empty() {
                skipped += 1;
            } else if self.cache.insert_if_absent(record).await {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }
        tracing::info!(
            source = self.source.name(),
            inserted,
            skipped,
            generated_at = snapshot.generated_at,
            "snapshot loaded"
        );
        LoadOutcome::Loaded { inserted, skipped }
    }
}

impl Debug for SnapshotLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotLoader")
            .field("source", &self.inner.source)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
