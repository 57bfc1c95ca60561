//! Entity identifiers, attribute records and the bulk snapshot format

use crate::category::{normalize_categories, CategoryKey};
use crate::color::Color;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an annotated entity (e.g. a username)
///
/// The spelling is preserved for remote requests; lookups go through
/// [`EntityId::cache_key`], which is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create identifier; surrounding whitespace is dropped
    #[inline]
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    /// Verbatim spelling, used on the wire
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized lookup key shared by fetched and snapshot entries
    #[inline]
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.0.to_lowercase()
    }

    /// Whether the identifier is unusable
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Attribute data for one entity
///
/// Immutable once stored; a later fetch replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    /// Entity the record describes
    pub entity_id: EntityId,
    /// Category memberships in source order, de-duplicated
    pub categories: Vec<CategoryKey>,
    /// Per-entity color override supplied by the source
    pub color: Option<Color>,
}

impl AttributeRecord {
    /// Create record without a color override
    #[must_use]
    pub fn new<I, S>(entity_id: EntityId, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entity_id,
            categories: normalize_categories(categories),
            color: None,
        }
    }

    /// Attach a color override; blank values are ignored
    #[must_use]
    pub fn with_color(mut self, color: Option<impl Into<String>>) -> Self {
        self.color = color.and_then(|c| Color::parse(c.into()));
        self
    }

    /// Build record from a snapshot entry
    #[must_use]
    pub fn from_entry(entity_id: EntityId, entry: &SnapshotEntry) -> Self {
        Self::new(entity_id, &entry.categories).with_color(entry.color.clone())
    }

    /// Whether the record carries anything worth styling
    #[inline]
    #[must_use]
    pub fn has_styling(&self) -> bool {
        !self.categories.is_empty() || self.color.is_some()
    }
}

/// Build state advertised by a snapshot body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// Artifact does not exist yet; a build has been requested
    Building,
    /// Artifact is complete
    Ready,
}

/// One entity's entry in a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Category memberships
    #[serde(default, alias = "user_groups")]
    pub categories: Vec<String>,
    /// Color of the winning category, if any
    #[serde(default, alias = "group_color")]
    pub color: Option<String>,
}

/// Precomputed bulk export of attribute records
///
/// Produced and consumed wholesale; there is no delta format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Entries keyed by normalized entity id
    #[serde(default, alias = "users")]
    pub entities: BTreeMap<String, SnapshotEntry>,
    /// Build time, epoch seconds
    #[serde(default, rename = "generatedAt", alias = "generated_at")]
    pub generated_at: i64,
    /// Build state; absent on artifacts written by the builder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SnapshotStatus>,
}

impl Snapshot {
    /// Empty snapshot stamped with the given time
    #[inline]
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            entities: BTreeMap::new(),
            generated_at: generated_at.timestamp(),
            status: None,
        }
    }

    /// Placeholder answered while a build is pending
    #[must_use]
    pub fn building(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(SnapshotStatus::Building),
            ..Self::new(now)
        }
    }

    /// Whether this body stands for a not-yet-built artifact
    #[inline]
    #[must_use]
    pub fn is_building(&self) -> bool {
        self.status == Some(SnapshotStatus::Building)
    }

    /// Insert entry under the normalized id
    pub fn insert(&mut self, entity_id: &EntityId, entry: SnapshotEntry) {
        self.entities.insert(entity_id.cache_key(), entry);
    }

    /// Number of entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the snapshot has no entities
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Build time as a timestamp
    #[must_use]
    pub fn generated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.generated_at, 0)
    }

    /// Iterate entries as attribute records
    pub fn records(&self) -> impl Iterator<Item = AttributeRecord> + '_ {
        self.entities
            .iter()
            .map(|(id, entry)| AttributeRecord::from_entry(EntityId::new(id), entry))
    }
}
