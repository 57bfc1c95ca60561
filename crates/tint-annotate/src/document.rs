//! Document abstraction
//!
//! The host view layer owns the live tree and its rendering. This crate only
//! needs a handful of queries and mutations on element nodes plus an event
//! subscription telling it when nodes appear.

use std::fmt::{self, Debug};
use tokio::sync::broadcast;

/// Handle to an element node
///
/// Handles of removed nodes stay valid values; queries on them return empty
/// results and mutations are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Change notification published by the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// Nodes were inserted (roots of the inserted subtrees)
    NodesAdded(Vec<NodeId>),
    /// The whole view was replaced
    Navigated,
}

/// Live, mutating element tree
///
/// The annotation mark lives on the node itself, so it disappears together
/// with the node.
pub trait Document: Send + Sync + Debug {
    /// Every attached node in document order
    fn nodes(&self) -> Vec<NodeId>;

    /// `node` followed by its descendants in document order
    ///
    /// Empty when the node is not attached.
    fn subtree(&self, node: NodeId) -> Vec<NodeId>;

    /// Lower-case tag name
    fn tag(&self, node: NodeId) -> Option<String>;

    /// Whether the node carries a class
    fn has_class(&self, node: NodeId, class: &str) -> bool;

    /// Attribute value, `None` when the attribute is absent
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Text content
    fn text(&self, node: NodeId) -> Option<String>;

    /// Whether the node was already annotated
    fn is_marked(&self, node: NodeId) -> bool;

    /// Flag the node as annotated
    fn mark(&self, node: NodeId);

    /// Add a class; adding a present class is a no-op
    fn add_class(&self, node: NodeId, class: &str);

    /// Set an inline style property with important priority
    fn set_style(&self, node: NodeId, property: &str, value: &str);

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent>;

    /// First strict descendant carrying `class`
    fn find_descendant_with_class(&self, node: NodeId, class: &str) -> Option<NodeId> {
        self.subtree(node)
            .into_iter()
            .skip(1)
            .find(|&candidate| self.has_class(candidate, class))
    }
}
