//! Periodic snapshot job
//!
//! Rebuilds the artifact on a fixed interval and whenever a reader reports it
//! missing through a [`RebuildTrigger`].
//!
//! # Usage
//!
//! ```ignore
//! use tint_snapshot::{rebuild_channel, snapshot_job, SnapshotJobConfig};
//! use tokio::sync::watch;
//!
//! let (trigger, rebuild_rx) = rebuild_channel();
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(snapshot_job(builder, members, SnapshotJobConfig::default(), rebuild_rx, shutdown_rx));
//!
//! // on shutdown
//! let _ = shutdown_tx.send(true);
//! ```

use crate::builder::SnapshotBuilder;
use crate::members::MembershipSource;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tint_cache::RebuildRequest;
use tint_core::SnapshotConfig;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Shortest accepted rebuild period
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Job settings
#[derive(Debug, Clone)]
pub struct SnapshotJobConfig {
    /// Artifact path
    pub path: PathBuf,
    /// Rebuild period
    pub interval: Duration,
}

impl SnapshotJobConfig {
    /// Settings from the `[snapshot]` section
    #[must_use]
    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self {
            path: config.file.clone(),
            interval: config.rebuild_interval(),
        }
    }
}

impl Default for SnapshotJobConfig {
    fn default() -> Self {
        Self::from_config(&SnapshotConfig::default())
    }
}

/// Sends on-demand rebuild requests to a running [`snapshot_job`]
///
/// Requests made while one is already queued collapse into it.
#[derive(Debug, Clone)]
pub struct RebuildTrigger {
    tx: mpsc::Sender<()>,
}

/// Create a trigger and the receiver to hand to [`snapshot_job`]
#[must_use]
pub fn rebuild_channel() -> (RebuildTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (RebuildTrigger { tx }, rx)
}

impl RebuildRequest for RebuildTrigger {
    fn request_rebuild(&self) {
        match self.tx.try_send(()) {
            Ok(()) => tracing::info!("snapshot rebuild requested"),
            Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::warn!("snapshot rebuild requested but the job is not running");
            }
        }
    }
}

/// Counters of a snapshot job
#[derive(Debug, Default)]
pub struct SnapshotJobMetrics {
    /// Successful builds
    pub builds_completed: AtomicU64,
    /// Failed builds
    pub builds_failed: AtomicU64,
    /// Builds started by a rebuild request
    pub on_demand_builds: AtomicU64,
}

/// Point-in-time copy of [`SnapshotJobMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotJobStats {
    /// Successful builds
    pub builds_completed: u64,
    /// Failed builds
    pub builds_failed: u64,
    /// Builds started by a rebuild request
    pub on_demand_builds: u64,
}

impl SnapshotJobMetrics {
    /// Current values
    #[must_use]
    pub fn snapshot(&self) -> SnapshotJobStats {
        SnapshotJobStats {
            builds_completed: self.builds_completed.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            on_demand_builds: self.on_demand_builds.load(Ordering::Relaxed),
        }
    }
}

/// Rebuild the snapshot until shutdown
///
/// Builds once immediately, then every `config.interval` and on every
/// request received on `rebuild_rx`. A failed build keeps the previous
/// artifact and is retried at the next trigger.
pub async fn snapshot_job(
    builder: Arc<SnapshotBuilder>,
    members: Arc<dyn MembershipSource>,
    config: SnapshotJobConfig,
    mut rebuild_rx: mpsc::Receiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SnapshotJobMetrics> {
    let metrics = Arc::new(SnapshotJobMetrics::default());

    let mut rebuild_interval = interval(config.interval.max(MIN_INTERVAL));
    rebuild_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        path = %config.path.display(),
        "snapshot job started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("snapshot job shutting down");
                    break;
                }
            }

            _ = rebuild_interval.tick() => {
                run_build(&builder, members.as_ref(), &config, &metrics).await;
            }

            Some(()) = rebuild_rx.recv() => {
                metrics.on_demand_builds.fetch_add(1, Ordering::Relaxed);
                run_build(&builder, members.as_ref(), &config, &metrics).await;
                rebuild_interval.reset();
            }
        }
    }

    let stats = metrics.snapshot();
    tracing::info!(
        builds_completed = stats.builds_completed,
        builds_failed = stats.builds_failed,
        on_demand_builds = stats.on_demand_builds,
        "snapshot job completed"
    );
    metrics
}

async fn run_build(
    builder: &SnapshotBuilder,
    members: &dyn MembershipSource,
    config: &SnapshotJobConfig,
    metrics: &SnapshotJobMetrics,
) {
    match builder.rebuild(members, config.path.clone()).await {
        Ok(_) => {
            metrics.builds_completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            metrics.builds_failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(path = %config.path.display(), "snapshot build failed: {err}");
        }
    }
}
