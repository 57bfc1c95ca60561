//! Ranking engine
//!
//! Reduces a set of category memberships to the single winning category
//! according to an administrator-defined priority list.

use crate::category::CategoryKey;

/// Built-in priority order used when no ranking is configured
pub const DEFAULT_RANKING: &[&str] = &[
    "admin",
    "staff",
    "moderator",
    "trust_level_4",
    "trust_level_3",
    "trust_level_2",
    "trust_level_1",
    "trust_level_0",
];

/// Ordered, duplicate-free category priority list; index 0 ranks highest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingTable {
    entries: Vec<CategoryKey>,
}

impl RankingTable {
    /// Build table from entries in priority order
    ///
    /// Keys are normalized; for duplicates the first occurrence wins and
    /// blank entries are dropped.
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: crate::category::normalize_categories(entries),
        }
    }

    /// Built-in default ordering
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(DEFAULT_RANKING.iter().copied())
    }

    /// Parse the comma-separated setting form, e.g. `"admin, staff,moderator"`
    #[must_use]
    pub fn parse(serialized: &str) -> Self {
        Self::new(serialized.split(','))
    }

    /// Priority index of a category, `None` when unranked
    #[inline]
    #[must_use]
    pub fn position(&self, category: &CategoryKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry == category)
    }

    /// Entries in priority order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[CategoryKey] {
        &self.entries
    }

    /// Number of ranked categories
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is ranked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized setting form
    #[must_use]
    pub fn to_setting(&self) -> String {
        self.entries
            .iter()
            .map(CategoryKey::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Resolve the winning category of a membership set
///
/// Categories are compared case-insensitively against `ranking`. Unranked
/// categories sort after every ranked one, and among equal ranks the
/// category appearing first in `categories` wins. Returns `None` only for
/// an empty input.
pub fn resolve_winning_category<I, S>(categories: I, ranking: &RankingTable) -> Option<CategoryKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    // min_by_key keeps the first of several equal minimums
    categories
        .into_iter()
        .map(CategoryKey::new)
        .min_by_key(|category| ranking.position(category).unwrap_or(usize::MAX))
}
