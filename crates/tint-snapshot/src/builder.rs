//! Snapshot builder
//!
//! Recomputes the bulk snapshot from authoritative membership:
//!
//! 1. skip inactive members
//! 2. categories = lower-cased groups + synthetic `trust_level_<n>`, with
//!    plural role names singularized and duplicates dropped; group names
//!    keep their spacing so they match ranking entries
//! 3. color = table color of the winning category, `#000000` when
//!    unmapped, none when the member has no category at all
//!
//! The artifact is written to a temporary file in the target directory and
//! renamed over the old one, so readers never observe a partial file.

use crate::error::{BuildError, BuildResult};
use crate::members::{MemberRecord, MembershipSource};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tint_core::{
    color_for_category, resolve_winning_category, CategoryKey, EntityId, Snapshot, SnapshotEntry,
    TintScheme,
};

/// Summary of one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Entities written
    pub entities: usize,
    /// Members skipped as inactive or nameless
    pub skipped: usize,
    /// Build time, epoch seconds
    pub generated_at: i64,
    /// Artifact written
    pub path: PathBuf,
}

/// Derives snapshot entries under a ranking and color scheme
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    scheme: TintScheme,
}

impl SnapshotBuilder {
    /// Create builder
    #[must_use]
    pub fn new(scheme: TintScheme) -> Self {
        Self { scheme }
    }

    /// Scheme in use
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &TintScheme {
        &self.scheme
    }

    /// Category set of a member, in group order then trust level
    #[must_use]
    pub fn categories_for(member: &MemberRecord) -> Vec<CategoryKey> {
        let mut categories: Vec<CategoryKey> = Vec::with_capacity(member.groups.len() + 1);
        let derived = member
            .groups
            .iter()
            .map(|group| CategoryKey::new(group).singular())
            .chain(member.trust_level.map(CategoryKey::trust_level));
        for category in derived {
            if !category.is_empty() && !categories.contains(&category) {
                categories.push(category);
            }
        }
        categories
    }

    /// Snapshot entry of a member
    #[must_use]
    pub fn entry_for(&self, member: &MemberRecord) -> SnapshotEntry {
        let categories = Self::categories_for(member);
        let color = resolve_winning_category(&categories, &self.scheme.ranking)
            .map(|winner| color_for_category(Some(&winner), &self.scheme.colors).to_string());
        SnapshotEntry {
            categories: categories.iter().map(ToString::to_string).collect(),
            color,
        }
    }

    /// Build the snapshot for `members`, stamped `now`
    #[must_use]
    pub fn build(&self, members: &[MemberRecord], now: DateTime<Utc>) -> Snapshot {
        self.build_counted(members, now).0
    }

    /// Snapshot plus the number of inactive or nameless members left out
    fn build_counted(&self, members: &[MemberRecord], now: DateTime<Utc>) -> (Snapshot, usize) {
        let mut snapshot = Snapshot::new(now);
        let mut skipped = 0;
        for member in members {
            let entity_id = EntityId::new(&member.username);
            if !member.active || entity_id.is_empty() {
                skipped += 1;
                continue;
            }
            // a later spelling of the same name replaces the earlier entry
            snapshot.insert(&entity_id, self.entry_for(member));
        }
        (snapshot, skipped)
    }

    /// Enumerate members, build and atomically write the artifact
    ///
    /// # Errors
    /// Returns [`BuildError`] if members cannot be read or the artifact cannot
    /// be written; the previous artifact is then left in place.
    pub async fn rebuild(
        &self,
        source: &dyn MembershipSource,
        path: impl Into<PathBuf>,
    ) -> BuildResult<BuildReport> {
        let path = path.into();
        let members = source.members().await?;
        let (snapshot, skipped) = self.build_counted(&members, Utc::now());
        let report = BuildReport {
            entities: snapshot.len(),
            skipped,
            generated_at: snapshot.generated_at,
            path: path.clone(),
        };

        tokio::task::spawn_blocking(move || write_atomic(&path, &snapshot)).await??;
        tracing::info!(
            entities = report.entities,
            skipped = report.skipped,
            path = %report.path.display(),
            "snapshot built"
        );
        Ok(report)
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(TintScheme::builtin())
    }
}

/// Write `snapshot` to `path` via a sibling temporary file and a rename
///
/// # Errors
/// Returns [`BuildError`] if the temporary file cannot be created, written,
/// or moved into place.
pub fn write_atomic(path: &Path, snapshot: &Snapshot) -> BuildResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| BuildError::io(dir, e))?;
    serde_json::to_writer(&mut file, snapshot).map_err(BuildError::Encode)?;
    file.flush().map_err(|e| BuildError::io(file.path(), e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| BuildError::io(file.path(), e))?;
    file.persist(path).map_err(|e| BuildError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tint_core::{ColorTable, RankingTable};

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(TintScheme::new(
            RankingTable::builtin(),
            ColorTable::new([("admin", "#e74c3c"), ("trust_level_2", "#16a085")]),
        ))
    }

    #[test]
    fn categories_are_normalized_and_deduplicated() {
        let member =
            MemberRecord::new("alice", &["Admins", "staff", "admin", " "]).with_trust_level(3);
        let categories: Vec<String> = SnapshotBuilder::categories_for(&member)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(categories, vec!["admin", "staff", "trust_level_3"]);
    }

    #[test]
    fn entry_color_follows_winning_category() {
        let builder = builder();

        let admin =
            builder.entry_for(&MemberRecord::new("a", &["staff", "admins"]).with_trust_level(2));
        assert_eq!(admin.color.as_deref(), Some("#e74c3c"));

        let regular = builder.entry_for(&MemberRecord::new("b", &[]).with_trust_level(2));
        assert_eq!(regular.color.as_deref(), Some("#16a085"));

        let unmapped = builder.entry_for(&MemberRecord::new("c", &["moderators"]));
        assert_eq!(unmapped.categories, vec!["moderator"]);
        assert_eq!(unmapped.color.as_deref(), Some("#000000"));

        let nothing = builder.entry_for(&MemberRecord::new("d", &[]));
        assert!(nothing.categories.is_empty());
        assert_eq!(nothing.color, None);
    }

    #[test]
    fn build_skips_inactive_and_lowercases_keys() {
        let mut ghost = MemberRecord::new("ghost", &["admins"]);
        ghost.active = false;
        let members = vec![
            MemberRecord::new("Alice", &["admins"]),
            ghost,
            MemberRecord::new("  ", &[]),
        ];
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let snapshot = builder().build(&members, now);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.entities.contains_key("alice"));
        assert_eq!(snapshot.generated_at, 1_700_000_000);
        assert!(!snapshot.is_building());
    }

    #[test]
    fn multi_word_group_matches_ranking() {
        let builder = SnapshotBuilder::new(TintScheme::new(
            RankingTable::new(["beta testers", "admin"]),
            ColorTable::new([("beta testers", "#abcdef")]),
        ));
        let entry = builder.entry_for(&MemberRecord::new("erin", &["Beta Testers"]));

        assert_eq!(entry.categories, vec!["beta testers"]);
        assert_eq!(entry.color.as_deref(), Some("#abcdef"));
    }

    #[tokio::test]
    async fn rebuild_counts_only_left_out_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user-cache.json");
        let mut ghost = MemberRecord::new("ghost", &[]);
        ghost.active = false;
        let members = vec![
            MemberRecord::new("Alice", &["admins"]),
            MemberRecord::new("alice", &["staff"]),
            ghost,
            MemberRecord::new(" ", &[]),
        ];

        let report = builder().rebuild(&members, &path).await.unwrap();

        assert_eq!(report.entities, 1);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn write_atomic_replaces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user-cache.json");
        std::fs::write(&path, "old").unwrap();

        let now = DateTime::from_timestamp(42, 0).unwrap();
        let snapshot = builder().build(&[MemberRecord::new("bob", &["staff"])], now);
        write_atomic(&path, &snapshot).unwrap();

        let written: Snapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, snapshot);
        // only the artifact remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
