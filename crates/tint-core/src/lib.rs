//! usertint core
//!
//! Deterministic resolution of an entity's category memberships into one
//! winning category and one display color.
//!
//! # Core Concepts
//!
//! - [`CategoryKey`]: case-normalized membership token
//! - [`RankingTable`]: administrator-defined priority, index 0 highest
//! - [`ColorTable`]: category → color, with [`DEFAULT_COLOR`] for gaps
//! - [`AttributeRecord`]: one entity's categories and optional color override
//! - [`Snapshot`]: bulk export of records produced by the snapshot builder
//!
//! # Example
//!
//! ```rust
//! use tint_core::{AttributeRecord, ColorTable, EntityId, RankingTable, TintScheme};
//!
//! let scheme = TintScheme::new(
//!     RankingTable::builtin(),
//!     ColorTable::new([("admin", "#e74c3c")]),
//! );
//! let record = AttributeRecord::new(EntityId::new("alice"), ["trust_level_2", "admin"]);
//!
//! assert_eq!(scheme.winning_category(&record).unwrap().as_str(), "admin");
//! assert_eq!(scheme.color_for(&record).as_str(), "#e74c3c");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod category;
pub mod color;
pub mod config;
pub mod error;
pub mod ranking;
pub mod record;

// Re-exports for convenience
pub use category::{normalize_categories, CategoryKey, CLASS_MARKER_PREFIX};
pub use color::{
    color_for_category, resolve_color, Color, ColorTable, TintScheme, DEFAULT_COLOR,
    DEFAULT_PALETTE,
};
pub use config::{
    FetchConfig, GroupSettings, SchedulerConfig, SnapshotConfig, TintConfig, ENV_GROUP_COLORS,
    ENV_GROUP_RANKINGS,
};
pub use error::{ConfigError, ConfigResult};
pub use ranking::{resolve_winning_category, RankingTable, DEFAULT_RANKING};
pub use record::{AttributeRecord, EntityId, Snapshot, SnapshotEntry, SnapshotStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with usertint
    pub use crate::{
        AttributeRecord, CategoryKey, Color, ColorTable, EntityId, RankingTable, Snapshot,
        TintConfig, TintScheme,
    };
}
