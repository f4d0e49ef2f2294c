//! Arena-based document tree.
//!
//! All nodes live in one vector and link to each other through indices, so
//! the navigator can walk parents, children and siblings in both directions
//! without reference counting.

use std::collections::HashMap;

use crate::util::collapse_whitespace;

/// Tag of the document's top-level title node, which is never spoken.
pub const TITLE_TAG: &str = "doctitle";

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }

    fn option(self) -> Option<NodeId> {
        self.is_some().then_some(self)
    }
}

/// An element with its navigation attributes pre-extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local tag name.
    pub name: String,
    /// All attributes in source order, local names only.
    pub attrs: Vec<(String, String)>,
    pub id: Option<String>,
    /// Timing reference (`smilref`) into a timing document.
    pub timing_ref: Option<String>,
    /// Alternative text for non-textual content.
    pub alt: Option<String>,
}

impl Element {
    /// Build an element, pulling `id`, `smilref` and `alt` out of `attrs`.
    pub fn new(name: impl Into<String>, attrs: Vec<(String, String)>) -> Self {
        let mut element = Element {
            name: name.into(),
            ..Default::default()
        };
        for (key, value) in &attrs {
            match key.as_str() {
                "id" => element.id = Some(value.clone()),
                "smilref" => element.timing_ref = Some(value.clone()),
                "alt" => element.alt = Some(value.clone()),
                _ => {}
            }
        }
        element.attrs = attrs;
        element
    }

    /// Whether this element can be read aloud: it has an id, a timing
    /// reference or alt text, and is not the title node.
    pub fn is_speakable(&self) -> bool {
        self.id.is_some()
            && (self.timing_ref.is_some() || self.alt.is_some())
            && self.name != TITLE_TAG
    }

    /// Look up any attribute by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Node type in the arena.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root.
    Document,
    Element(Element),
    Text(String),
}

/// A node in the arena.
#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-based document tree.
#[derive(Debug)]
pub struct Dom {
    nodes: Vec<Node>,
    document: NodeId,
    /// Map from id attribute to node.
    id_map: HashMap<String, NodeId>,
    /// Map from timing reference to the elements carrying it, in document order.
    timing_map: HashMap<String, Vec<NodeId>>,
    /// Pre-order position of every node, indexed by node id.
    order: Vec<u32>,
}

impl Dom {
    /// Create a new empty tree with a document root.
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            document: NodeId::NONE,
            id_map: HashMap::new(),
            timing_map: HashMap::new(),
            order: Vec::new(),
        };
        dom.document = dom.alloc(Node::new(NodeData::Document));
        dom
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get the document root ID.
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Create a new, detached element node.
    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.alloc(Node::new(NodeData::Element(element)))
    }

    /// Create a new, detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text.into())))
    }

    /// Append a child to a parent node.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
        }

        if let Some(last_node) = self.get_mut(last_child) {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Append text to the last child if it is a text node, or create one.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(ref mut existing) = last.data
        {
            existing.push_str(text);
            return;
        }

        let text_node = self.create_text(text);
        self.append(parent, text_node);
    }

    /// Assign an id to an element. Call [`Dom::reindex`] afterwards.
    pub fn set_element_id(&mut self, node: NodeId, id: impl Into<String>) {
        let id = id.into();
        if let Some(Node {
            data: NodeData::Element(element),
            ..
        }) = self.get_mut(node)
        {
            element.attrs.retain(|(k, _)| k != "id");
            element.attrs.push(("id".to_string(), id.clone()));
            element.id = Some(id);
        }
    }

    /// Rebuild the id map, the timing-reference map and the document order.
    ///
    /// Must run after the tree is assembled and before it is navigated.
    pub fn reindex(&mut self) {
        let mut id_map = HashMap::new();
        let mut timing_map: HashMap<String, Vec<NodeId>> = HashMap::new();
        let mut order = vec![u32::MAX; self.nodes.len()];

        let mut position = 0u32;
        let mut node = self.document;
        while node.is_some() {
            order[node.0 as usize] = position;
            position += 1;
            if let Some(element) = self.element(node) {
                if let Some(id) = &element.id {
                    id_map.entry(id.clone()).or_insert(node);
                }
                if let Some(timing_ref) = &element.timing_ref {
                    timing_map.entry(timing_ref.clone()).or_default().push(node);
                }
            }
            node = self.next_in_order(node);
        }

        self.id_map = id_map;
        self.timing_map = timing_map;
        self.order = order;
    }

    /// Give every element with alt text but no id a unique id built from
    /// `prefix` and a counter, then reindex.
    ///
    /// Elements that already carry an id keep it; generated ids skip any
    /// id already present in the document.
    pub fn normalize_alt_ids(&mut self, prefix: &str) {
        self.reindex();
        let missing: Vec<NodeId> = self
            .elements()
            .filter(|&n| {
                self.element(n)
                    .is_some_and(|e| e.alt.is_some() && e.id.is_none())
            })
            .collect();
        if missing.is_empty() {
            return;
        }

        let mut counter = 0usize;
        for node in missing {
            let id = loop {
                counter += 1;
                let candidate = format!("{prefix}{counter}");
                if !self.id_map.contains_key(&candidate) {
                    break candidate;
                }
            };
            self.id_map.insert(id.clone(), node);
            self.set_element_id(node, id);
        }
        self.reindex();
    }

    /// Get node by id attribute.
    pub fn get_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_map.get(id).copied()
    }

    /// Elements whose timing reference equals `timing_ref`, in document order.
    pub fn elements_with_timing_ref(&self, timing_ref: &str) -> &[NodeId] {
        self.timing_map
            .get(timing_ref)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pre-order position of a node; unattached nodes sort last.
    pub fn document_order(&self, id: NodeId) -> u32 {
        self.order.get(id.0 as usize).copied().unwrap_or(u32::MAX)
    }

    /// Get the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree is empty (only has document root).
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Parent of a node, if it has one.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent.option())
    }

    /// Iterate over children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        ChildrenIter {
            dom: self,
            current: first,
        }
    }

    /// Iterate over the descendants of a node in document order, excluding
    /// the node itself.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let first = self.get(root).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        Descendants {
            dom: self,
            root,
            current: first,
        }
    }

    /// Iterate over the ancestors of a node, nearest first, stopping before
    /// the document root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
            .take_while(move |&n| n != self.document)
    }

    /// Pre-order successor of `id` in the whole document.
    pub fn next_in_order(&self, id: NodeId) -> NodeId {
        let Some(node) = self.get(id) else {
            return NodeId::NONE;
        };
        if node.first_child.is_some() {
            return node.first_child;
        }
        self.next_skipping_children(id)
    }

    /// Pre-order successor of `id` once its subtree is exhausted.
    fn next_skipping_children(&self, mut id: NodeId) -> NodeId {
        while let Some(node) = self.get(id) {
            if node.next_sibling.is_some() {
                return node.next_sibling;
            }
            id = node.parent;
        }
        NodeId::NONE
    }

    /// Pre-order predecessor of `id`; the document root is never returned.
    pub fn prev_in_order(&self, id: NodeId) -> NodeId {
        let Some(node) = self.get(id) else {
            return NodeId::NONE;
        };
        if node.prev_sibling.is_some() {
            return self.last_descendant_or_self(node.prev_sibling);
        }
        if node.parent == self.document {
            return NodeId::NONE;
        }
        node.parent
    }

    fn last_descendant_or_self(&self, mut id: NodeId) -> NodeId {
        while let Some(node) = self.get(id) {
            if node.last_child.is_none() {
                break;
            }
            id = node.last_child;
        }
        id
    }

    /// Iterate over all element nodes in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(self.document)
            .filter(move |&id| self.element(id).is_some())
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    dom: &'a Dom,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.dom.get(id).map(|n| n.next_sibling).unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Pre-order iterator over a subtree.
pub struct Descendants<'a> {
    dom: &'a Dom,
    root: NodeId,
    current: NodeId,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        let node = self.dom.get(id)?;
        self.current = if node.first_child.is_some() {
            node.first_child
        } else {
            let mut up = id;
            loop {
                if up == self.root {
                    break NodeId::NONE;
                }
                match self.dom.get(up) {
                    Some(n) if n.next_sibling.is_some() => break n.next_sibling,
                    Some(n) => up = n.parent,
                    None => break NodeId::NONE,
                }
            }
        };
        Some(id)
    }
}

/// Convenience methods for element nodes.
impl Dom {
    /// Element data of a node, if it is an element.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Get element's local name (tag).
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// Get element's id attribute.
    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.id.as_deref())
    }

    /// Get element's timing reference.
    pub fn timing_ref(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.timing_ref.as_deref())
    }

    /// Get element's alternative text.
    pub fn alt_text(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.alt.as_deref())
    }

    /// Whether a node is a speakable element.
    pub fn is_speakable(&self, id: NodeId) -> bool {
        self.element(id).is_some_and(Element::is_speakable)
    }

    /// First speakable descendant of a node in document order.
    pub fn first_speakable_descendant(&self, id: NodeId) -> Option<NodeId> {
        self.descendants(id).find(|&d| self.is_speakable(d))
    }

    /// The node itself if speakable, else its first speakable descendant.
    pub fn resolve_speakable(&self, id: NodeId) -> Option<NodeId> {
        if self.is_speakable(id) {
            Some(id)
        } else {
            self.first_speakable_descendant(id)
        }
    }

    /// Concatenated text of a node and its descendants, with markup
    /// stripped and whitespace collapsed.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut raw = String::new();
        if let Some(Node {
            data: NodeData::Text(text),
            ..
        }) = self.get(id)
        {
            raw.push_str(text);
        }
        for d in self.descendants(id) {
            if let Some(Node {
                data: NodeData::Text(text),
                ..
            }) = self.get(d)
            {
                raw.push_str(text);
            }
        }
        collapse_whitespace(&raw)
    }
}
