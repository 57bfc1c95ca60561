//! Authoritative membership input
//!
//! The builder enumerates members through [`MembershipSource`]. The bundled
//! implementation reads a JSON export: an array of
//! `{"username", "active", "trust_level", "groups"}` objects.

use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// One member as exported by the membership authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Login name
    pub username: String,
    /// Inactive members are left out of the snapshot
    #[serde(default = "default_active")]
    pub active: bool,
    /// Trust level; adds the synthetic `trust_level_<n>` category
    #[serde(default)]
    pub trust_level: Option<u8>,
    /// Group names as stored by the authority
    #[serde(default)]
    pub groups: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl MemberRecord {
    /// Active member with the given groups
    #[must_use]
    pub fn new(username: impl Into<String>, groups: &[&str]) -> Self {
        Self {
            username: username.into(),
            active: true,
            trust_level: None,
            groups: groups.iter().map(ToString::to_string).collect(),
        }
    }

    /// Set trust level
    #[must_use]
    pub fn with_trust_level(mut self, level: u8) -> Self {
        self.trust_level = Some(level);
        self
    }
}

/// Capability to enumerate all members
#[async_trait]
pub trait MembershipSource: Send + Sync + Debug {
    /// Every known member, active or not
    async fn members(&self) -> BuildResult<Vec<MemberRecord>>;
}

/// Decode a members export
///
/// # Errors
/// Returns [`BuildError::Members`] for anything but an array of members.
pub fn parse_members(body: &[u8]) -> BuildResult<Vec<MemberRecord>> {
    serde_json::from_slice(body).map_err(BuildError::Members)
}

/// Members export read from a JSON file on every build
#[derive(Debug, Clone)]
pub struct JsonMembershipSource {
    path: PathBuf,
}

impl JsonMembershipSource {
    /// Create source for an export path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Export path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MembershipSource for JsonMembershipSource {
    async fn members(&self) -> BuildResult<Vec<MemberRecord>> {
        let body = tokio::fs::read(&self.path)
            .await
            .map_err(|e| BuildError::io(&self.path, e))?;
        parse_members(&body)
    }
}

#[async_trait]
impl MembershipSource for Vec<MemberRecord> {
    async fn members(&self) -> BuildResult<Vec<MemberRecord>> {
        Ok(self.clone())
    }
}
