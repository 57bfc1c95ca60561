//! Region matchers
//!
//! Three independently defined shapes refer to an entity:
//!
//! | Kind | Shape | Entity id | Styling |
//! |------|-------|-----------|---------|
//! | [`RegionKind::ChatUsername`] | `.chat-message-info__username` | `data-user-card`, else inner name text | `color` on the inner name node |
//! | [`RegionKind::UserLink`] | `a[data-user-card]` | `data-user-card` | `color` |
//! | [`RegionKind::Avatar`] | `.avatar[data-user-card]` | `data-user-card` | 2px solid border |

use crate::document::{Document, NodeId};
use tint_core::{Color, EntityId};

/// Class of chat message author containers
pub const CHAT_USERNAME_CLASS: &str = "chat-message-info__username";
/// Class of the name node inside a chat author container
pub const CHAT_NAME_CLASS: &str = "chat-message-info__username__name";
/// Class of avatar images
pub const AVATAR_CLASS: &str = "avatar";
/// Attribute naming the referenced entity
pub const USER_CARD_ATTR: &str = "data-user-card";

/// Shape of an entity-reference region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Inline chat message author name
    ChatUsername,
    /// Hyperlink to an entity
    UserLink,
    /// Avatar image of an entity
    Avatar,
}

impl RegionKind {
    /// Matching precedence when a node fits several shapes
    pub const ALL: [RegionKind; 3] = [Self::ChatUsername, Self::Avatar, Self::UserLink];

    /// Whether `node` has this shape
    pub fn matches(self, document: &dyn Document, node: NodeId) -> bool {
        match self {
            Self::ChatUsername => document.has_class(node, CHAT_USERNAME_CLASS),
            Self::UserLink => {
                document.tag(node).is_some_and(|tag| tag.eq_ignore_ascii_case("a"))
                    && document.attribute(node, USER_CARD_ATTR).is_some()
            }
            Self::Avatar => {
                document.has_class(node, AVATAR_CLASS)
                    && document.attribute(node, USER_CARD_ATTR).is_some()
            }
        }
    }

    /// First kind matching `node`
    pub fn classify(document: &dyn Document, node: NodeId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.matches(document, node))
    }

    /// Whether an already-annotated region still gets its color refreshed
    #[inline]
    #[must_use]
    pub fn recolors_marked(self) -> bool {
        matches!(self, Self::ChatUsername)
    }

    /// Inline style declarations carrying `color`
    #[must_use]
    pub fn style_declarations(self, color: &Color) -> Vec<(&'static str, String)> {
        match self {
            Self::ChatUsername | Self::UserLink => vec![("color", color.to_string())],
            Self::Avatar => vec![
                ("border-color", color.to_string()),
                ("border-width", "2px".to_string()),
                ("border-style", "solid".to_string()),
            ],
        }
    }
}

/// A located entity reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Region root; carries the mark and the class markers
    pub node: NodeId,
    /// Matched shape
    pub kind: RegionKind,
    /// Referenced entity
    pub entity_id: EntityId,
    /// Node receiving the color styling
    pub style_target: NodeId,
}

impl Region {
    /// Locate a region rooted at `node`
    ///
    /// `None` when the node has no region shape or no usable entity id.
    pub fn locate(document: &dyn Document, node: NodeId) -> Option<Self> {
        let kind = RegionKind::classify(document, node)?;
        let card = document
            .attribute(node, USER_CARD_ATTR)
            .filter(|value| !value.trim().is_empty());

        let (raw_id, style_target) = match kind {
            RegionKind::ChatUsername => {
                let name_node = document.find_descendant_with_class(node, CHAT_NAME_CLASS);
                let raw = card.or_else(|| name_node.and_then(|name| document.text(name)))?;
                (raw, name_node.unwrap_or(node))
            }
            RegionKind::UserLink | RegionKind::Avatar => (card?, node),
        };

        let entity_id = EntityId::new(raw_id);
        if entity_id.is_empty() {
            return None;
        }
        Some(Self {
            node,
            kind,
            entity_id,
            style_target,
        })
    }
}

/// Whether any inserted subtree contains a region shape
///
/// Only shapes are checked; whether an entity id can be extracted is decided
/// at scan time.
pub fn introduces_region(document: &dyn Document, added: &[NodeId]) -> bool {
    added.iter().any(|&root| {
        document
            .subtree(root)
            .into_iter()
            .any(|node| RegionKind::classify(document, node).is_some())
    })
}

/// All regions currently in the document, in document order
pub fn collect_regions(document: &dyn Document) -> Vec<Region> {
    document
        .nodes()
        .into_iter()
        .filter_map(|node| Region::locate(document, node))
        .collect()
}
