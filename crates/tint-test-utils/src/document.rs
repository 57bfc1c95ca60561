use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tint_annotate::{Document, DocumentEvent, NodeId};
use tokio::sync::broadcast;

/// Element description used to build document subtrees
#[derive(Debug, Clone, Default)]
pub struct Element {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// `a[data-user-card]`
    pub fn user_link(username: &str) -> Self {
        Self::new("a").attr("data-user-card", username).text(username)
    }

    /// `img.avatar[data-user-card]`
    pub fn avatar(username: &str) -> Self {
        Self::new("img").class("avatar").attr("data-user-card", username)
    }

    /// Chat author container with an inner name node
    pub fn chat_username(username: &str) -> Self {
        Self::new("span").class("chat-message-info__username").child(
            Self::new("span")
                .class("chat-message-info__username__name")
                .text(username),
        )
    }
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    styles: BTreeMap<String, String>,
    marked: bool,
    children: Vec<NodeId>,
}

/// Document tree held in memory
///
/// Insertions through [`InMemoryDocument::append`] publish
/// [`DocumentEvent::NodesAdded`]; [`InMemoryDocument::append_silently`]
/// models content swapped in without a mutation record.
#[derive(Debug)]
pub struct InMemoryDocument {
    nodes: Mutex<HashMap<NodeId, NodeData>>,
    root: NodeId,
    next_id: AtomicU64,
    events: broadcast::Sender<DocumentEvent>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            NodeData {
                tag: "body".into(),
                classes: Vec::new(),
                attributes: BTreeMap::new(),
                text: None,
                styles: BTreeMap::new(),
                marked: false,
                children: Vec::new(),
            },
        );
        let (events, _) = broadcast::channel(256);
        Self {
            nodes: Mutex::new(nodes),
            root,
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Insert a subtree under `parent` and publish the insertion
    pub fn append(&self, parent: NodeId, element: Element) -> NodeId {
        let id = self.append_silently(parent, element);
        let _ = self.events.send(DocumentEvent::NodesAdded(vec![id]));
        id
    }

    /// Insert a subtree without publishing anything
    pub fn append_silently(&self, parent: NodeId, element: Element) -> NodeId {
        let mut nodes = self.nodes.lock();
        let id = self.insert_tree(&mut nodes, element);
        if let Some(parent) = nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        id
    }

    fn insert_tree(&self, nodes: &mut HashMap<NodeId, NodeData>, element: Element) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let children = element
            .children
            .into_iter()
            .map(|child| self.insert_tree(nodes, child))
            .collect();
        nodes.insert(
            id,
            NodeData {
                tag: element.tag,
                classes: element.classes,
                attributes: element.attributes,
                text: element.text,
                styles: BTreeMap::new(),
                marked: false,
                children,
            },
        );
        id
    }

    /// Detach a subtree; its nodes and marks are dropped
    pub fn remove(&self, node: NodeId) {
        let doomed = self.subtree(node);
        let mut nodes = self.nodes.lock();
        for data in nodes.values_mut() {
            data.children.retain(|child| *child != node);
        }
        for id in doomed {
            nodes.remove(&id);
        }
    }

    /// Publish a full view replacement
    pub fn navigate(&self) {
        let _ = self.events.send(DocumentEvent::Navigated);
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.nodes
            .lock()
            .get(&node)
            .map(|data| data.classes.clone())
            .unwrap_or_default()
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.nodes
            .lock()
            .get(&node)
            .and_then(|data| data.styles.get(property).cloned())
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .lock()
            .get(&node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn with_node<T>(&self, node: NodeId, f: impl FnOnce(&mut NodeData) -> T) -> Option<T> {
        self.nodes.lock().get_mut(&node).map(f)
    }
}

impl Default for InMemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for InMemoryDocument {
    fn nodes(&self) -> Vec<NodeId> {
        self.subtree(self.root)
    }

    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let nodes = self.nodes.lock();
        let mut order = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(data) = nodes.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(data.children.iter().rev().copied());
        }
        order
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.with_node(node, |data| data.tag.clone())
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.with_node(node, |data| data.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.with_node(node, |data| data.attributes.get(name).cloned())
            .flatten()
    }

    fn text(&self, node: NodeId) -> Option<String> {
        self.with_node(node, |data| data.text.clone()).flatten()
    }

    fn is_marked(&self, node: NodeId) -> bool {
        self.with_node(node, |data| data.marked).unwrap_or(false)
    }

    fn mark(&self, node: NodeId) {
        self.with_node(node, |data| data.marked = true);
    }

    fn add_class(&self, node: NodeId, class: &str) {
        self.with_node(node, |data| {
            if !data.classes.iter().any(|c| c == class) {
                data.classes.push(class.to_string());
            }
        });
    }

    fn set_style(&self, node: NodeId, property: &str, value: &str) {
        self.with_node(node, |data| {
            data.styles.insert(property.to_string(), value.to_string());
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }
}
