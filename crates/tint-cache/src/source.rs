//! Attribute sources
//!
//! An [`AttributeSource`] answers "what are this entity's attributes?". Two
//! variants exist:
//!
//! - [`LocalIndexSource`]: records the host already holds in memory
//! - [`RemoteFetchSource`]: one HTTP request per entity
//!
//! The [`crate::FetchCoordinator`] tries them in a fixed priority order.

use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::fmt::Debug;
use tint_core::{AttributeRecord, EntityId, FetchConfig};

/// Placeholder in [`FetchConfig::user_path`] replaced by the entity id
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// Capability to look up one entity's attributes
#[async_trait]
pub trait AttributeSource: Send + Sync + Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether lookups leave the process (and are therefore rate limited)
    fn is_remote(&self) -> bool;

    /// Look up attributes
    ///
    /// `Ok(None)` means the source has no data for the entity.
    async fn fetch(&self, entity_id: &EntityId) -> SourceResult<Option<AttributeRecord>>;
}

/// Entry published into the local index
#[derive(Debug, Clone, Default)]
pub struct LocalEntry {
    /// Category memberships; `None` for partial records lacking them
    pub categories: Option<Vec<String>>,
    /// Color override
    pub color: Option<String>,
}

/// Records the host has already loaded, consulted before any network call
#[derive(Debug, Default)]
pub struct LocalIndexSource {
    entries: DashMap<String, (EntityId, LocalEntry)>,
}

impl LocalIndexSource {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish what the host knows about an entity
    pub fn publish(&self, entity_id: EntityId, entry: LocalEntry) {
        self.entries.insert(entity_id.cache_key(), (entity_id, entry));
    }

    /// Forget an entity
    pub fn remove(&self, entity_id: &EntityId) {
        self.entries.remove(&entity_id.cache_key());
    }

    /// Number of published entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is published
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl AttributeSource for LocalIndexSource {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn fetch(&self, entity_id: &EntityId) -> SourceResult<Option<AttributeRecord>> {
        let Some(found) = self.entries.get(&entity_id.cache_key()) else {
            return Ok(None);
        };
        let (_, entry) = found.value();
        // partial records without categories defer to the next source
        Ok(entry.categories.as_ref().map(|categories| {
            AttributeRecord::new(entity_id.clone(), categories).with_color(entry.color.clone())
        }))
    }
}

/// Per-entity payload as served by the remote source
#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(alias = "user_groups")]
    categories: Vec<String>,
    #[serde(default, alias = "group_color")]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PayloadShape {
    Wrapped { user: UserPayload },
    Flat(UserPayload),
}

/// Decode a per-entity payload
///
/// Accepts `{"categories": [...], "color": ...}` or the same object wrapped
/// as `{"user": {...}}`, with `user_groups`/`group_color` as field aliases.
///
/// # Errors
/// Returns [`SourceError::Malformed`] when the body has no category list.
pub fn parse_user_payload(entity_id: &EntityId, body: &[u8]) -> SourceResult<AttributeRecord> {
    let payload = match serde_json::from_slice::<PayloadShape>(body)? {
        PayloadShape::Wrapped { user } | PayloadShape::Flat(user) => user,
    };
    Ok(AttributeRecord::new(entity_id.clone(), &payload.categories).with_color(payload.color))
}

/// Fetches one entity at a time over HTTP
#[derive(Debug, Clone)]
pub struct RemoteFetchSource {
    client: reqwest::Client,
    base_url: Url,
    user_path: String,
}

impl RemoteFetchSource {
    /// Create source from fetch settings
    ///
    /// # Errors
    /// Returns [`SourceError::InvalidUrl`] for an unusable base URL, or
    /// [`SourceError::Http`] if the client cannot be built.
    pub fn new(config: &FetchConfig) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(client, config)
    }

    /// Create source sharing an existing client
    ///
    /// # Errors
    /// Returns [`SourceError::InvalidUrl`] for an unusable base URL.
    pub fn with_client(client: reqwest::Client, config: &FetchConfig) -> SourceResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(SourceError::InvalidUrl(config.base_url.clone()));
        }
        Ok(Self {
            client,
            base_url,
            user_path: config.user_path.clone(),
        })
    }

    /// URL for an entity; the id is percent-encoded as a path segment
    ///
    /// # Errors
    /// Returns [`SourceError::InvalidUrl`] if the base URL cannot take path
    /// segments.
    pub fn user_url(&self, entity_id: &EntityId) -> SourceResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| SourceError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            for part in self.user_path.split('/').filter(|p| !p.is_empty()) {
                segments.push(&part.replace(USERNAME_PLACEHOLDER, entity_id.as_str()));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl AttributeSource for RemoteFetchSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn fetch(&self, entity_id: &EntityId) -> SourceResult<Option<AttributeRecord>> {
        let url = self.user_url(entity_id)?;
        tracing::debug!(entity = %entity_id, %url, "fetching attributes");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::status(url.path(), status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_user_payload(entity_id, &body).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_index_returns_published_record() {
        let index = LocalIndexSource::new();
        index.publish(
            EntityId::new("Alice"),
            LocalEntry {
                categories: Some(vec!["Admin".into()]),
                color: Some("#e74c3c".into()),
            },
        );

        let record = index.fetch(&EntityId::new("alice")).await.unwrap().unwrap();
        assert_eq!(record.categories[0].as_str(), "admin");
        assert_eq!(record.color.unwrap().as_str(), "#e74c3c");
    }

    #[tokio::test]
    async fn local_index_skips_partial_records() {
        let index = LocalIndexSource::new();
        index.publish(EntityId::new("bob"), LocalEntry::default());

        assert!(index.fetch(&EntityId::new("bob")).await.unwrap().is_none());
        assert!(index.fetch(&EntityId::new("nobody")).await.unwrap().is_none());

        index.remove(&EntityId::new("bob"));
        assert!(index.is_empty());
    }

    #[test]
    fn payload_wrapped_with_legacy_names() {
        let body = br##"{"user": {"username": "carol", "user_groups": ["moderator", "trust_level_2"], "group_color": "#3498db"}}"##;
        let record = parse_user_payload(&EntityId::new("carol"), body).unwrap();
        assert_eq!(record.categories.len(), 2);
        assert_eq!(record.color.unwrap().as_str(), "#3498db");
    }

    #[test]
    fn payload_flat() {
        let body = br#"{"categories": ["staff"]}"#;
        let record = parse_user_payload(&EntityId::new("dave"), body).unwrap();
        assert_eq!(record.categories[0].as_str(), "staff");
        assert!(record.color.is_none());
    }

    #[test]
    fn payload_without_categories_is_malformed() {
        let err = parse_user_payload(&EntityId::new("eve"), br#"{"user": {"name": "eve"}}"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));

        let err = parse_user_payload(&EntityId::new("eve"), b"<html>").unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn user_url_encodes_entity_id() {
        let config = FetchConfig {
            base_url: "https://forum.example.com/".into(),
            ..FetchConfig::default()
        };
        let source = RemoteFetchSource::new(&config).unwrap();

        let url = source.user_url(&EntityId::new("Jo Smith")).unwrap();
        assert_eq!(url.as_str(), "https://forum.example.com/u/Jo%20Smith.json");

        let url = source.user_url(&EntityId::new("a/b")).unwrap();
        assert_eq!(url.path(), "/u/a%2Fb.json");
    }

    #[test]
    fn invalid_base_url_rejected() {
        let config = FetchConfig {
            base_url: "mailto:someone".into(),
            ..FetchConfig::default()
        };
        let err = RemoteFetchSource::new(&config).unwrap_err();
        assert!(matches!(err, SourceError::InvalidUrl(_)));
    }
}
