//! Configuration
//!
//! [`TintConfig`] is loaded from TOML with every field defaulted. The two
//! administrator settings (ranking and colors) are read leniently: each may
//! arrive natively or in its serialized string form, and anything unusable
//! falls back to built-in defaults instead of failing.

use crate::color::{ColorTable, TintScheme};
use crate::error::ConfigError;
use crate::ranking::RankingTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable carrying the serialized ranking setting
pub const ENV_GROUP_RANKINGS: &str = "USERTINT_GROUP_RANKINGS";

/// Environment variable carrying the serialized color setting
pub const ENV_GROUP_COLORS: &str = "USERTINT_GROUP_COLORS";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TintConfig {
    /// Ranking and color settings
    pub groups: GroupSettings,
    /// Per-entity fetch settings
    pub fetch: FetchConfig,
    /// Bulk snapshot settings
    pub snapshot: SnapshotConfig,
    /// Annotation scheduling settings
    pub scheduler: SchedulerConfig,
}

impl TintConfig {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError::Toml`] when the text is not valid TOML for
    /// this structure. Malformed group settings are not an error.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Toml`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::io_error(path, source))?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(rankings) = lookup(ENV_GROUP_RANKINGS) {
            self.groups.rankings = Some(Value::String(rankings));
        }
        if let Some(colors) = lookup(ENV_GROUP_COLORS) {
            self.groups.colors = Some(Value::String(colors));
        }
        self
    }
}

/// Administrator-provided ranking and color settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// Ranking: array of names or a comma-separated string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rankings: Option<Value>,
    /// Colors: table of name → color or JSON object text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<Value>,
    /// Give ranked categories without a color the built-in palette color
    pub fill_default_palette: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            rankings: None,
            colors: None,
            fill_default_palette: true,
        }
    }
}

impl GroupSettings {
    /// Resolve the settings into ranking and color tables; never fails
    #[must_use]
    pub fn scheme(&self) -> TintScheme {
        let ranking = ranking_from_setting(self.rankings.as_ref())
            .filter(|table| !table.is_empty())
            .unwrap_or_else(RankingTable::builtin);
        let mut colors = colors_from_setting(self.colors.as_ref()).unwrap_or_default();
        if self.fill_default_palette {
            colors.fill_missing(&ranking);
        }
        TintScheme::new(ranking, colors)
    }
}

/// Interpret a ranking setting value
///
/// Accepts an array (non-string items are skipped) or the comma-separated
/// string form. Returns `None` for absent or unusable values.
#[must_use]
pub fn ranking_from_setting(value: Option<&Value>) -> Option<RankingTable> {
    match value? {
        Value::Array(items) => Some(RankingTable::new(items.iter().filter_map(Value::as_str))),
        Value::String(text) => Some(RankingTable::parse(text)),
        Value::Null => None,
        other => {
            tracing::warn!("ignoring ranking setting of unexpected shape: {other}");
            None
        }
    }
}

/// Interpret a color setting value
///
/// Accepts a table/object (non-string values are skipped) or JSON object
/// text. Returns `None` for absent or unusable values.
#[must_use]
pub fn colors_from_setting(value: Option<&Value>) -> Option<ColorTable> {
    match value? {
        Value::Object(map) => Some(ColorTable::new(
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|color| (k.as_str(), color))),
        )),
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => {
            let table = ColorTable::parse_json(text);
            if table.is_none() {
                tracing::warn!("color setting is not a JSON object of strings; using empty table");
            }
            table
        }
        Value::Null => None,
        other => {
            tracing::warn!("ignoring color setting of unexpected shape: {other}");
            None
        }
    }
}

/// Per-entity fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Origin of the remote source, e.g. `https://forum.example.com`
    pub base_url: String,
    /// Path template; `{username}` is replaced by the encoded entity id
    pub user_path: String,
    /// Maximum concurrently executing remote fetches
    pub max_concurrent: usize,
    /// Minimum spacing between consecutive fetch starts, milliseconds
    pub min_start_spacing_ms: u64,
    /// Per-request timeout, milliseconds
    pub request_timeout_ms: u64,
}

impl FetchConfig {
    /// Spacing between fetch starts
    #[inline]
    #[must_use]
    pub fn min_start_spacing(&self) -> Duration {
        Duration::from_millis(self.min_start_spacing_ms)
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            user_path: "/u/{username}.json".to_string(),
            max_concurrent: 3,
            min_start_spacing_ms: 100,
            request_timeout_ms: 10_000,
        }
    }
}

/// Bulk snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Well-known path the snapshot is served from
    pub url_path: String,
    /// Artifact file written by the builder
    pub file: PathBuf,
    /// Rebuild period, seconds
    pub rebuild_interval_secs: u64,
}

impl SnapshotConfig {
    /// Rebuild period
    #[inline]
    #[must_use]
    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.rebuild_interval_secs)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url_path: "/tint/user-cache.json".to_string(),
            file: PathBuf::from("user-cache.json"),
            rebuild_interval_secs: 6 * 60 * 60,
        }
    }
}

/// Annotation scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period before a re-scan, milliseconds
    pub debounce_ms: u64,
    /// Delay of the second startup scan; `None` disables it
    pub follow_up_scan_ms: Option<u64>,
}

impl SchedulerConfig {
    /// Debounce quiet period
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Delay of the second startup scan
    #[inline]
    #[must_use]
    pub fn follow_up_scan(&self) -> Option<Duration> {
        self.follow_up_scan_ms.map(Duration::from_millis)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            follow_up_scan_ms: Some(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryKey;
    use crate::color::DEFAULT_COLOR;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_constants() {
        let config = TintConfig::default();
        assert_eq!(config.fetch.max_concurrent, 3);
        assert_eq!(config.fetch.min_start_spacing(), Duration::from_millis(100));
        assert_eq!(config.scheduler.debounce(), Duration::from_millis(500));
        assert_eq!(config.snapshot.rebuild_interval(), Duration::from_secs(21_600));
        assert!(config.groups.fill_default_palette);
    }

    #[test]
    fn native_settings_from_toml() {
        let config = TintConfig::from_toml_str(
            r##"
            [groups]
            rankings = ["Staff", "admin"]
            colors = { staff = "#f39c12" }
            fill_default_palette = false

            [fetch]
            max_concurrent = 5
            "##,
        )
        .unwrap();
        let scheme = config.groups.scheme();
        assert_eq!(scheme.ranking.to_setting(), "staff,admin");
        assert_eq!(scheme.colors.len(), 1);
        assert_eq!(config.fetch.max_concurrent, 5);
        assert_eq!(config.fetch.min_start_spacing_ms, 100);
    }

    #[test]
    fn serialized_settings_from_toml() {
        let config = TintConfig::from_toml_str(
            r##"
            [groups]
            rankings = "moderator, admin"
            colors = '{"moderator": "#3498db"}'
            "##,
        )
        .unwrap();
        let scheme = config.groups.scheme();
        assert_eq!(scheme.ranking.to_setting(), "moderator,admin");
        let moderator = scheme.colors.get(&CategoryKey::new("moderator")).unwrap();
        assert_eq!(moderator.as_str(), "#3498db");
        // filled from the palette
        let admin = scheme.colors.get(&CategoryKey::new("admin")).unwrap();
        assert_eq!(admin.as_str(), "#e74c3c");
    }

    #[test]
    fn malformed_settings_fall_back() {
        let config = TintConfig::from_toml_str(
            r#"
            [groups]
            rankings = 42
            colors = "{not json"
            fill_default_palette = false
            "#,
        )
        .unwrap();
        let scheme = config.groups.scheme();
        assert_eq!(scheme.ranking, RankingTable::builtin());
        assert!(scheme.colors.is_empty());
    }

    #[test]
    fn empty_ranking_string_uses_builtin() {
        let settings = GroupSettings {
            rankings: Some(Value::String(" , ".into())),
            ..GroupSettings::default()
        };
        let scheme = settings.scheme();
        assert_eq!(scheme.ranking, RankingTable::builtin());
        let lowest = CategoryKey::new("trust_level_0");
        assert_ne!(scheme.colors.get(&lowest).unwrap().as_str(), DEFAULT_COLOR);
    }

    #[test]
    fn overrides_replace_settings() {
        let config = TintConfig::default().with_overrides_from(|name| match name {
            ENV_GROUP_RANKINGS => Some("vip,admin".to_string()),
            ENV_GROUP_COLORS => Some(r##"{"vip":"#abcdef"}"##.to_string()),
            _ => None,
        });
        let scheme = config.groups.scheme();
        assert_eq!(scheme.ranking.to_setting(), "vip,admin");
        assert_eq!(
            scheme.colors.get(&CategoryKey::new("vip")).unwrap().as_str(),
            "#abcdef"
        );
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ndebounce_ms = 50").unwrap();
        let config = TintConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.debounce_ms, 50);
        assert_eq!(config.scheduler.follow_up_scan_ms, Some(300));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = TintConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
