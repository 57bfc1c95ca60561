//! Category keys
//!
//! A [`CategoryKey`] names a membership group (a role or a tier). Matching is
//! case-insensitive, so keys are stored lower-cased.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Prefix of the class marker written onto annotated regions.
pub const CLASS_MARKER_PREFIX: &str = "is-";

/// Case-normalized membership category token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    /// Create key from any spelling; surrounding whitespace is dropped
    #[inline]
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// Lower-cased key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty after normalization
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Synthetic trust-level category (`trust_level_<n>`)
    #[inline]
    #[must_use]
    pub fn trust_level(level: u8) -> Self {
        Self(format!("trust_level_{level}"))
    }

    /// Group name with plural role names collapsed onto their singular form
    ///
    /// Spelling is otherwise kept, so the result still matches ranking and
    /// color table entries.
    #[must_use]
    pub fn singular(&self) -> Self {
        match self.0.as_str() {
            "admins" => Self("admin".to_string()),
            "moderators" => Self("moderator".to_string()),
            _ => self.clone(),
        }
    }

    /// Class-safe group name: [`Self::singular`] with whitespace runs
    /// replaced by `-`
    #[must_use]
    pub fn canonical(&self) -> Self {
        let singular = self.singular();
        Self(singular.0.split_whitespace().collect::<Vec<_>>().join("-"))
    }

    /// Class marker for this category, e.g. `is-admin`
    #[must_use]
    pub fn class_marker(&self) -> String {
        format!("{CLASS_MARKER_PREFIX}{}", self.canonical().0)
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for CategoryKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl AsRef<str> for CategoryKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for CategoryKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for CategoryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Normalize a category sequence: lower-case each entry, drop empties and
/// keep only the first occurrence of each key.
pub fn normalize_categories<I, S>(raw: I) -> Vec<CategoryKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<CategoryKey> = Vec::new();
    for key in raw.into_iter().map(CategoryKey::new) {
        if !key.is_empty() && !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_lowercased_and_trimmed() {
        let key = CategoryKey::new("  Staff ");
        assert_eq!(key.as_str(), "staff");
        assert_eq!(key, CategoryKey::from("STAFF"));
    }

    #[test]
    fn canonical_singularizes_roles() {
        assert_eq!(CategoryKey::new("Admins").canonical().as_str(), "admin");
        assert_eq!(CategoryKey::new("moderators").canonical().as_str(), "moderator");
        assert_eq!(CategoryKey::new("Beta Testers").canonical().as_str(), "beta-testers");
        assert_eq!(CategoryKey::new("trust_level_2").canonical().as_str(), "trust_level_2");
    }

    #[test]
    fn singular_keeps_spelling() {
        assert_eq!(CategoryKey::new("Moderators").singular().as_str(), "moderator");
        assert_eq!(CategoryKey::new("Beta Testers").singular().as_str(), "beta testers");
    }

    #[test]
    fn class_marker_uses_canonical_form() {
        assert_eq!(CategoryKey::new("Admins").class_marker(), "is-admin");
        assert_eq!(CategoryKey::trust_level(3).class_marker(), "is-trust_level_3");
    }

    #[test]
    fn normalize_drops_duplicates_and_empties() {
        let keys = normalize_categories(["Staff", "", "staff", "admin", " "]);
        assert_eq!(keys, vec![CategoryKey::new("staff"), CategoryKey::new("admin")]);
    }

    #[test]
    fn deserialize_normalizes() {
        let key: CategoryKey = serde_json::from_str("\"Moderator\"").unwrap();
        assert_eq!(key.as_str(), "moderator");
    }
}
