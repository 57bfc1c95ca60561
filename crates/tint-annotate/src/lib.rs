//! usertint document annotation
//!
//! Watches a live [`Document`] and keeps its entity references annotated with
//! category class markers (`is-admin`, `is-trust_level_2`, ...) and the color
//! of the winning category.
//!
//! # Example
//!
//! ```rust,ignore
//! use tint_annotate::AnnotationScheduler;
//!
//! let handle = AnnotationScheduler::new(document, resolver, scheme, config)
//!     .with_snapshot_loader(loader)
//!     .start();
//!
//! // later
//! let report = handle.trigger_scan().await;
//! handle.shutdown().await;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod debounce;
pub mod document;
pub mod region;
pub mod scheduler;

pub use debounce::Debouncer;
pub use document::{Document, DocumentEvent, NodeId};
pub use region::{
    collect_regions, introduces_region, Region, RegionKind, AVATAR_CLASS, CHAT_NAME_CLASS,
    CHAT_USERNAME_CLASS, USER_CARD_ATTR,
};
pub use scheduler::{AnnotationScheduler, ScanReport, SchedulerHandle, SchedulerStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
