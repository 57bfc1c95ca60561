//! Annotation scheduler
//!
//! Keeps the entity references of a live [`Document`] annotated:
//!
//! 1. on start, warm the cache from the snapshot (if a loader is attached)
//! 2. scan the whole document, then once more after a short follow-up delay
//! 3. on every insertion that introduces a region, and on navigation,
//!    schedule a debounced re-scan
//!
//! A scan visits every region, skips the ones already marked, resolves the
//! rest concurrently and writes class markers plus color styling. Chat author
//! regions are recolored on every scan; class markers are written once.
//! Startup runs beside the event loop, so insertions observed while the
//! first scan is still resolving schedule a re-scan right away.

use crate::debounce::Debouncer;
use crate::document::{Document, DocumentEvent, NodeId};
use crate::region::{collect_regions, introduces_region, Region};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tint_cache::{AttributeResolver, SnapshotLoader};
use tint_core::{SchedulerConfig, TintScheme};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// What happened to one region during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionOutcome {
    Annotated,
    Recolored,
    Unresolved,
}

/// Result of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Regions found in the document
    pub regions: usize,
    /// Regions annotated for the first time
    pub annotated: usize,
    /// Already-annotated regions whose color was refreshed
    pub recolored: usize,
    /// Regions left alone: already annotated, or being annotated by an
    /// overlapping scan
    pub skipped: usize,
    /// Regions whose entity had no attributes; retried on the next scan
    pub unresolved: usize,
}

/// Scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Scans started
    pub scans_started: u64,
    /// Scans whose lookups all settled
    pub scans_completed: u64,
    /// Debounced re-scans requested by events
    pub rescans_scheduled: u64,
    /// Regions annotated for the first time
    pub regions_annotated: u64,
    /// Color refreshes of already-annotated regions
    pub regions_recolored: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scans_started: AtomicU64,
    scans_completed: AtomicU64,
    rescans_scheduled: AtomicU64,
    regions_annotated: AtomicU64,
    regions_recolored: AtomicU64,
}

/// First-time annotation of a region owned by one scan; released on drop
struct Claim<'a> {
    claimed: &'a Mutex<HashSet<NodeId>>,
    node: NodeId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claimed.lock().remove(&self.node);
    }
}

/// Incremental annotator for one document lifetime
#[derive(Debug)]
pub struct AnnotationScheduler {
    document: Arc<dyn Document>,
    resolver: AttributeResolver,
    loader: Option<SnapshotLoader>,
    scheme: RwLock<Arc<TintScheme>>,
    config: SchedulerConfig,
    counters: Counters,
    /// Unmarked regions some scan is currently annotating
    claimed: Mutex<HashSet<NodeId>>,
}

impl AnnotationScheduler {
    /// Create scheduler
    #[must_use]
    pub fn new(
        document: Arc<dyn Document>,
        resolver: AttributeResolver,
        scheme: TintScheme,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            document,
            resolver,
            loader: None,
            scheme: RwLock::new(Arc::new(scheme)),
            config,
            counters: Counters::default(),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Warm the cache from a snapshot before the first scan
    #[must_use]
    pub fn with_snapshot_loader(mut self, loader: SnapshotLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Resolver used for lookups
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &AttributeResolver {
        &self.resolver
    }

    /// Scheme currently used for color resolution
    #[must_use]
    pub fn scheme(&self) -> Arc<TintScheme> {
        self.scheme.read().clone()
    }

    /// Replace the scheme
    ///
    /// Later color resolutions use the new scheme; class markers already
    /// written stay as they are.
    pub fn update_scheme(&self, scheme: TintScheme) {
        *self.scheme.write() = Arc::new(scheme);
        tracing::info!("tint scheme updated");
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            scans_started: self.counters.scans_started.load(Ordering::Relaxed),
            scans_completed: self.counters.scans_completed.load(Ordering::Relaxed),
            rescans_scheduled: self.counters.rescans_scheduled.load(Ordering::Relaxed),
            regions_annotated: self.counters.regions_annotated.load(Ordering::Relaxed),
            regions_recolored: self.counters.regions_recolored.load(Ordering::Relaxed),
        }
    }

    /// Scan the whole document once
    pub async fn scan(&self) -> ScanReport {
        self.counters.scans_started.fetch_add(1, Ordering::Relaxed);

        let regions = collect_regions(self.document.as_ref());
        let mut report = ScanReport {
            regions: regions.len(),
            ..ScanReport::default()
        };

        let mut pending = Vec::with_capacity(regions.len());
        for region in regions {
            if self.document.is_marked(region.node) {
                if region.kind.recolors_marked() {
                    pending.push(self.annotate(region, None));
                } else {
                    report.skipped += 1;
                }
            } else if let Some(claim) = self.claim(region.node) {
                pending.push(self.annotate(region, Some(claim)));
            } else {
                report.skipped += 1;
            }
        }

        for outcome in join_all(pending).await {
            match outcome {
                RegionOutcome::Annotated => report.annotated += 1,
                RegionOutcome::Recolored => report.recolored += 1,
                RegionOutcome::Unresolved => report.unresolved += 1,
            }
        }

        self.counters.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .regions_annotated
            .fetch_add(report.annotated as u64, Ordering::Relaxed);
        self.counters
            .regions_recolored
            .fetch_add(report.recolored as u64, Ordering::Relaxed);
        tracing::debug!(
            regions = report.regions,
            annotated = report.annotated,
            recolored = report.recolored,
            unresolved = report.unresolved,
            "scan finished"
        );
        report
    }

    /// Claim an unmarked region for first-time annotation
    ///
    /// Fails while another scan holds the region, or once it has been marked.
    fn claim(&self, node: NodeId) -> Option<Claim<'_>> {
        if !self.claimed.lock().insert(node) {
            return None;
        }
        let claim = Claim {
            claimed: &self.claimed,
            node,
        };
        (!self.document.is_marked(node)).then_some(claim)
    }

    /// Annotate one region; `claim` is held for first-time annotations
    async fn annotate(&self, region: Region, claim: Option<Claim<'_>>) -> RegionOutcome {
        let already_marked = claim.is_none();

        let Some(record) = self.resolver.get_attributes(&region.entity_id).await else {
            return RegionOutcome::Unresolved;
        };

        if !already_marked {
            for category in &record.categories {
                self.document.add_class(region.node, &category.class_marker());
            }
        }

        if record.has_styling() {
            let color = self.scheme().color_for(&record);
            for (property, value) in region.kind.style_declarations(&color) {
                self.document.set_style(region.style_target, property, &value);
            }
        }

        self.document.mark(region.node);
        drop(claim);
        if already_marked {
            RegionOutcome::Recolored
        } else {
            RegionOutcome::Annotated
        }
    }

    fn schedule_rescan(self: &Arc<Self>, debouncer: &Debouncer) {
        self.counters.rescans_scheduled.fetch_add(1, Ordering::Relaxed);
        let scheduler = Arc::clone(self);
        debouncer.schedule(move || async move {
            scheduler.scan().await;
        });
    }

    /// Start annotating; runs until the handle is shut down
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let scheduler = Arc::new(self);
        // subscribe before the first scan so no insertion is missed
        let events = scheduler.document.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&scheduler).run(events, shutdown_rx));
        SchedulerHandle {
            scheduler,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Snapshot load, initial scan and the optional follow-up scan
    ///
    /// Shutdown cancels only the wait for the follow-up scan.
    async fn startup(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        if let Some(loader) = &self.loader {
            loader.load_snapshot().await;
        }
        self.scan().await;

        let Some(delay) = self.config.follow_up_scan() else {
            return;
        };
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                self.scan().await;
            }
            _ = shutdown_rx.changed() => {}
        }
    }

    async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<DocumentEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let debouncer = Debouncer::new(self.config.debounce());
        tracing::info!(
            debounce_ms = self.config.debounce_ms,
            follow_up_ms = self.config.follow_up_scan_ms,
            "annotation scheduler started"
        );

        tokio::spawn(Arc::clone(&self).startup(shutdown_rx.clone()));

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                event = events.recv() => match event {
                    Ok(DocumentEvent::NodesAdded(nodes)) => {
                        if introduces_region(self.document.as_ref(), &nodes) {
                            self.schedule_rescan(&debouncer);
                        }
                    }
                    Ok(DocumentEvent::Navigated) => self.schedule_rescan(&debouncer),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "document events dropped, rescanning");
                        self.schedule_rescan(&debouncer);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        debouncer.cancel();

        let stats = self.stats();
        tracing::info!(
            scans = stats.scans_completed,
            annotated = stats.regions_annotated,
            recolored = stats.regions_recolored,
            "annotation scheduler stopped"
        );
    }
}

/// Control handle of a started scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    scheduler: Arc<AnnotationScheduler>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Scan immediately, bypassing the debounce
    pub async fn trigger_scan(&self) -> ScanReport {
        self.scheduler.scan().await
    }

    /// Replace the scheme; see [`AnnotationScheduler::update_scheme`]
    pub fn update_scheme(&self, scheme: TintScheme) {
        self.scheduler.update_scheme(scheme);
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// The running scheduler
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &Arc<AnnotationScheduler> {
        &self.scheduler
    }

    /// Stop observing the document and wait for the event loop to exit
    ///
    /// Scans already running are not interrupted.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            if err.is_panic() {
                tracing::error!("annotation scheduler panicked: {err}");
            }
        }
    }
}
