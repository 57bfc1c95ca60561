//! usertint snapshot building
//!
//! Produces the bulk attribute snapshot consumed by
//! [`tint_cache::SnapshotLoader`]:
//!
//! - [`SnapshotBuilder`]: members → categories → winning color → artifact
//! - [`snapshot_job`]: periodic and on-demand rebuilds
//! - [`SnapshotStore`]: serves the artifact, requesting a build when missing
//!
//! # Example
//!
//! ```rust
//! use tint_snapshot::{MemberRecord, SnapshotBuilder};
//!
//! let builder = SnapshotBuilder::default();
//! let member = MemberRecord::new("Alice", &["admins"]).with_trust_level(2);
//! let snapshot = builder.build(&[member], chrono::Utc::now());
//!
//! let entry = &snapshot.entities["alice"];
//! assert_eq!(entry.categories, vec!["admin", "trust_level_2"]);
//! assert_eq!(entry.color.as_deref(), Some("#e74c3c"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod builder;
pub mod error;
pub mod job;
pub mod members;
pub mod store;

pub use builder::{write_atomic, BuildReport, SnapshotBuilder};
pub use error::{BuildError, BuildResult};
pub use job::{
    rebuild_channel, snapshot_job, RebuildTrigger, SnapshotJobConfig, SnapshotJobMetrics,
    SnapshotJobStats,
};
pub use members::{parse_members, JsonMembershipSource, MemberRecord, MembershipSource};
pub use store::SnapshotStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
