//! Serving side of the snapshot artifact
//!
//! Answers snapshot requests from the artifact on disk. When the artifact is
//! missing or unreadable the store asks for a rebuild and answers with an
//! empty snapshot marked `building`, which readers treat as "not built yet".

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tint_cache::{parse_snapshot, RebuildRequest, SnapshotSource, SourceResult};
use tint_core::Snapshot;

/// Snapshot artifact with serve-or-request-build semantics
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    rebuild: Arc<dyn RebuildRequest>,
}

impl SnapshotStore {
    /// Create store for an artifact path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, rebuild: Arc<dyn RebuildRequest>) -> Self {
        Self {
            path: path.into(),
            rebuild,
        }
    }

    /// Artifact path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot, or a `building` placeholder
    pub async fn serve(&self) -> Snapshot {
        match tokio::fs::read(&self.path).await {
            Ok(body) => match parse_snapshot(&body) {
                Ok(Some(snapshot)) => return snapshot,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), "unreadable snapshot artifact: {err}");
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "snapshot artifact missing");
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "snapshot artifact not readable: {err}");
            }
        }
        self.rebuild.request_rebuild();
        Snapshot::building(Utc::now())
    }

    /// [`Self::serve`] encoded as a response body
    ///
    /// # Errors
    /// Returns the encoder error; encoding a [`Snapshot`] does not fail in
    /// practice.
    pub async fn serve_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.serve().await)
    }
}

#[async_trait]
impl SnapshotSource for SnapshotStore {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch_snapshot(&self) -> SourceResult<Option<Snapshot>> {
        let snapshot = self.serve().await;
        Ok((!snapshot.is_building()).then_some(snapshot))
    }
}
