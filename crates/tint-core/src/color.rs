//! Color resolution
//!
//! Maps a winning category to a display color. Resolution never fails: any
//! gap falls through to [`DEFAULT_COLOR`].

use crate::category::CategoryKey;
use crate::ranking::{resolve_winning_category, RankingTable};
use crate::record::AttributeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Color used for categories without a configured color
pub const DEFAULT_COLOR: &str = "#000000";

/// Built-in palette for the default ranking
pub const DEFAULT_PALETTE: &[(&str, &str)] = &[
    ("admin", "#e74c3c"),
    ("staff", "#f39c12"),
    ("moderator", "#3498db"),
    ("trust_level_4", "#8e44ad"),
    ("trust_level_3", "#27ae60"),
    ("trust_level_2", "#16a085"),
    ("trust_level_1", "#7f8c8d"),
    ("trust_level_0", "#95a5a6"),
];

/// Display color value (e.g. `#e74c3c`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Accept a color string; blank values yield `None`
    #[must_use]
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The fallback color
    #[inline]
    #[must_use]
    pub fn fallback() -> Self {
        Self(DEFAULT_COLOR.to_string())
    }

    /// Color string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category → color mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorTable {
    colors: BTreeMap<CategoryKey, Color>,
}

impl ColorTable {
    /// Build table from `(category, color)` pairs; blank colors are skipped
    #[must_use]
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let colors = pairs
            .into_iter()
            .filter_map(|(k, v)| Color::parse(v).map(|c| (CategoryKey::new(k), c)))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { colors }
    }

    /// Parse the JSON-object setting form, e.g. `{"admin":"#e74c3c"}`
    ///
    /// Returns `None` when the text is not a JSON object of strings.
    #[must_use]
    pub fn parse_json(serialized: &str) -> Option<Self> {
        serde_json::from_str::<BTreeMap<String, String>>(serialized)
            .ok()
            .map(Self::new)
    }

    /// Configured color of a category
    #[inline]
    #[must_use]
    pub fn get(&self, category: &CategoryKey) -> Option<&Color> {
        self.colors.get(category)
    }

    /// Give every ranked category lacking a color its built-in palette
    /// color, or [`DEFAULT_COLOR`].
    pub fn fill_missing(&mut self, ranking: &RankingTable) {
        for key in ranking.entries() {
            if self.colors.contains_key(key) {
                continue;
            }
            let color = DEFAULT_PALETTE
                .iter()
                .find(|(name, _)| *name == key.as_str())
                .map_or(DEFAULT_COLOR, |(_, c)| *c);
            self.colors.insert(key.clone(), Color(color.to_string()));
        }
    }

    /// Number of mapped categories
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether no category is mapped
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Serialized setting form
    #[must_use]
    pub fn to_setting(&self) -> String {
        let map: BTreeMap<&str, &str> = self
            .colors
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Color of a category under `colors`, falling back to [`DEFAULT_COLOR`]
#[must_use]
pub fn color_for_category(category: Option<&CategoryKey>, colors: &ColorTable) -> Color {
    category
        .and_then(|c| colors.get(c))
        .cloned()
        .unwrap_or_else(Color::fallback)
}

/// Resolve the display color of a record
///
/// A per-record override wins; otherwise the color of the winning category
/// is looked up, falling back to [`DEFAULT_COLOR`].
#[must_use]
pub fn resolve_color(record: &AttributeRecord, ranking: &RankingTable, colors: &ColorTable) -> Color {
    if let Some(color) = &record.color {
        return color.clone();
    }
    let winner = resolve_winning_category(&record.categories, ranking);
    color_for_category(winner.as_ref(), colors)
}

/// Ranking and color tables resolved together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TintScheme {
    /// Category priority
    pub ranking: RankingTable,
    /// Category colors
    pub colors: ColorTable,
}

impl TintScheme {
    /// Bundle tables
    #[inline]
    #[must_use]
    pub fn new(ranking: RankingTable, colors: ColorTable) -> Self {
        Self { ranking, colors }
    }

    /// Built-in ranking with the built-in palette
    #[must_use]
    pub fn builtin() -> Self {
        let ranking = RankingTable::builtin();
        let mut colors = ColorTable::default();
        colors.fill_missing(&ranking);
        Self { ranking, colors }
    }

    /// Winning category of a record
    #[must_use]
    pub fn winning_category(&self, record: &AttributeRecord) -> Option<CategoryKey> {
        resolve_winning_category(&record.categories, &self.ranking)
    }

    /// Display color of a record
    #[must_use]
    pub fn color_for(&self, record: &AttributeRecord) -> Color {
        resolve_color(record, &self.ranking, &self.colors)
    }
}
