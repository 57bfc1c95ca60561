//! usertint attribute cache
//!
//! Cheap, de-duplicated, rate-bounded attribute lookups.
//!
//! # Pipeline
//!
//! ```text
//! SnapshotLoader ──► AttributeCache ◄── AttributeResolver ──► FetchCoordinator ──► AttributeSource*
//! ```
//!
//! - [`AttributeResolver::get_attributes`] answers from the cache, joins an
//!   in-flight fetch, or starts a new one
//! - [`FetchCoordinator`] bounds concurrency and spaces out remote requests
//! - [`SnapshotLoader`] warms the cache from the bulk snapshot
//!
//! Source failures never reach callers; they are logged and read as "no data".

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod resolver;
pub mod snapshot;
pub mod source;

pub use cache::{AttributeCache, CacheStats};
pub use coordinator::{FetchCoordinator, FetchStats};
pub use error::{SourceError, SourceResult};
pub use resolver::AttributeResolver;
pub use snapshot::{
    parse_snapshot, FileSnapshotSource, HttpSnapshotSource, LoadOutcome, RebuildRequest,
    SnapshotLoader, SnapshotSource,
};
pub use source::{
    parse_user_payload, AttributeSource, LocalEntry, LocalIndexSource, RemoteFetchSource,
    USERNAME_PLACEHOLDER,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for attribute lookups
    pub use crate::{
        AttributeCache, AttributeResolver, AttributeSource, FetchCoordinator, SnapshotLoader,
        SnapshotSource,
    };
}
