use super::{collapse_whitespace, Document, NodeId, Rect, Snapshot, SnapshotNode, Viewport};
use crate::location::Location;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    tail: String,
    value: Option<String>,
    rect: Option<Rect>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: Option<NodeId>,
    next_id: u64,
    location: Location,
    viewport: Viewport,
}

impl Tree {
    fn insert(&mut self, snap: SnapshotNode, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        let SnapshotNode {
            tag,
            attributes,
            text,
            tail,
            value,
            rect,
            children,
        } = snap;
        self.nodes.insert(
            id,
            Node {
                tag: tag.to_ascii_lowercase(),
                attributes,
                text,
                tail,
                value,
                rect,
                parent,
                children: Vec::new(),
            },
        );
        let kids: Vec<NodeId> = children
            .into_iter()
            .map(|c| self.insert(c, Some(id)))
            .collect();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = kids;
        }
        id
    }

    /// Leading text, then each child's text followed by its tail.
    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        out.push_str(&node.text);
        for child in &node.children {
            self.collect_text(*child, out);
            if let Some(c) = self.nodes.get(child) {
                out.push_str(&c.tail);
            }
        }
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes.remove(&n) {
                stack.extend(node.children);
            }
        }
    }
}

/// Mutable in-memory document.
///
/// Every inserted node gets a fresh [`NodeId`]; replacing a subtree makes
/// the old ids detached, which is how identity changes show up.
#[derive(Debug)]
pub struct MemoryDocument {
    tree: RwLock<Tree>,
}

impl MemoryDocument {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut tree = Tree {
            nodes: HashMap::new(),
            root: None,
            next_id: 0,
            location: Location::parse(&snapshot.url),
            viewport: snapshot.viewport,
        };
        tree.root = Some(tree.insert(snapshot.root, None));
        Self {
            tree: RwLock::new(tree),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the whole page, as a full navigation does.
    pub fn navigate(&self, snapshot: Snapshot) {
        let mut tree = self.write();
        if let Some(old) = tree.root.take() {
            tree.drop_subtree(old);
        }
        tree.location = Location::parse(&snapshot.url);
        tree.viewport = snapshot.viewport;
        tree.root = Some(tree.insert(snapshot.root, None));
    }

    /// Change the location without touching the tree (history push/replace).
    pub fn set_location(&self, url: &str) {
        self.write().location = Location::parse(url);
    }

    /// Append a subtree under `parent`. Returns the new node's id.
    pub fn append(&self, parent: NodeId, node: SnapshotNode) -> Option<NodeId> {
        let mut tree = self.write();
        if !tree.nodes.contains_key(&parent) {
            return None;
        }
        let id = tree.insert(node, Some(parent));
        if let Some(p) = tree.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        Some(id)
    }

    /// Swap a node for a new subtree at the same position, as a re-render does.
    pub fn replace(&self, target: NodeId, node: SnapshotNode) -> Option<NodeId> {
        let mut tree = self.write();
        let parent = tree.nodes.get(&target)?.parent;
        tree.drop_subtree(target);
        let id = tree.insert(node, parent);
        match parent {
            Some(p) => {
                if let Some(p) = tree.nodes.get_mut(&p) {
                    if let Some(slot) = p.children.iter_mut().find(|c| **c == target) {
                        *slot = id;
                    }
                }
            }
            None => tree.root = Some(id),
        }
        Some(id)
    }

    /// Detach and drop a node and its subtree.
    pub fn remove(&self, target: NodeId) -> bool {
        let mut tree = self.write();
        let Some(parent) = tree.nodes.get(&target).map(|n| n.parent) else {
            return false;
        };
        tree.drop_subtree(target);
        match parent {
            Some(p) => {
                if let Some(p) = tree.nodes.get_mut(&p) {
                    p.children.retain(|c| *c != target);
                }
            }
            None => tree.root = None,
        }
        true
    }

    pub fn set_value(&self, target: NodeId, value: impl Into<String>) -> bool {
        match self.write().nodes.get_mut(&target) {
            Some(node) => {
                node.value = Some(value.into());
                true
            }
            None => false,
        }
    }

    pub fn set_attribute(
        &self,
        target: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        match self.write().nodes.get_mut(&target) {
            Some(node) => {
                node.attributes.insert(name.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn set_rect(&self, target: NodeId, rect: Rect) -> bool {
        match self.write().nodes.get_mut(&target) {
            Some(node) => {
                node.rect = Some(rect);
                true
            }
            None => false,
        }
    }

    /// Scroll the viewport to the given document offset.
    pub fn scroll_to(&self, x: f64, y: f64) {
        let mut tree = self.write();
        tree.viewport.scroll_x = x;
        tree.viewport.scroll_y = y;
    }

    /// First element, in document order, whose attribute equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|n| self.attribute(*n, name).as_deref() == Some(value))
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }
}

impl Document for MemoryDocument {
    fn location(&self) -> Location {
        self.read().location.clone()
    }

    fn viewport(&self) -> Viewport {
        self.read().viewport
    }

    fn root(&self) -> Option<NodeId> {
        self.read().root
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.read()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.read().nodes.get(&node).and_then(|n| n.parent)
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.read().nodes.get(&node).map(|n| n.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.read()
            .nodes
            .get(&node)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.read()
            .nodes
            .get(&node)
            .map(|n| {
                n.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut raw = String::new();
        self.read().collect_text(node, &mut raw);
        collapse_whitespace(&raw)
    }

    fn value(&self, node: NodeId) -> Option<String> {
        self.read().nodes.get(&node).and_then(|n| n.value.clone())
    }

    fn rect(&self, node: NodeId) -> Option<Rect> {
        self.read().nodes.get(&node).and_then(|n| n.rect)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let tree = self.read();
        let mut cur = node;
        loop {
            match tree.nodes.get(&cur) {
                Some(n) => match n.parent {
                    Some(p) => cur = p,
                    None => return tree.root == Some(cur),
                },
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> MemoryDocument {
        MemoryDocument::from_snapshot(Snapshot::new(
            "https://app.test/a",
            SnapshotNode::new("html").child(
                SnapshotNode::new("body")
                    .child(
                        SnapshotNode::new("button")
                            .attr("id", "save")
                            .child(SnapshotNode::new("span").text("Save")),
                    )
                    .child(SnapshotNode::new("input").attr("id", "name").attr("placeholder", "Your name")),
            ),
        ))
    }

    #[test]
    fn test_tree_queries() {
        let doc = page();
        let save = doc.find_by_attribute("id", "save").unwrap();
        assert_eq!(doc.tag(save).as_deref(), Some("button"));
        assert_eq!(doc.text_content(save), "Save");
        assert_eq!(doc.role(save).as_deref(), Some("button"));
        assert!(doc.is_interactive(save));
        let span = doc.children(save)[0];
        assert!(doc.contains(save, span));
        assert!(!doc.contains(span, save));
        assert_eq!(doc.elements().len(), 5);
    }

    #[test]
    fn test_text_content_keeps_inline_order() {
        let doc = MemoryDocument::from_snapshot(Snapshot::new(
            "/a",
            SnapshotNode::new("p").child(
                SnapshotNode::new("a")
                    .attr("href", "/billing")
                    .text("Learn ")
                    .child(SnapshotNode::new("b").text("more").tail(" about\n  billing")),
            ),
        ));
        let link = doc.find_by_attribute("href", "/billing").unwrap();
        assert_eq!(doc.text_content(link), "Learn more about billing");
        assert_eq!(doc.text_content(doc.root().unwrap()), "Learn more about billing");
        let bold = doc.children(link)[0];
        assert_eq!(doc.text_content(bold), "more");
    }

    #[test]
    fn test_display_text_falls_back_to_attributes() {
        let doc = page();
        let input = doc.find_by_attribute("id", "name").unwrap();
        assert_eq!(doc.text_content(input), "");
        assert_eq!(doc.display_text(input), "Your name");
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let doc = page();
        let save = doc.find_by_attribute("id", "save").unwrap();
        let span = doc.children(save)[0];
        assert!(doc.remove(save));
        assert!(!doc.is_attached(save));
        assert!(!doc.is_attached(span));
        assert!(!doc.remove(save));
    }

    #[test]
    fn test_replace_changes_identity() {
        let doc = page();
        let save = doc.find_by_attribute("id", "save").unwrap();
        let fresh = doc
            .replace(save, SnapshotNode::new("button").attr("id", "save").text("Save"))
            .unwrap();
        assert_ne!(save, fresh);
        assert!(!doc.is_attached(save));
        assert!(doc.is_attached(fresh));
        assert_eq!(doc.find_by_attribute("id", "save"), Some(fresh));
    }

    #[test]
    fn test_navigate_replaces_everything() {
        let doc = page();
        let old_root = doc.root().unwrap();
        doc.navigate(Snapshot::new("https://app.test/b", SnapshotNode::new("html")));
        assert!(!doc.is_attached(old_root));
        assert_eq!(doc.location().path(), "/b");
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_mutators() {
        let doc = page();
        let input = doc.find_by_attribute("id", "name").unwrap();
        assert!(doc.set_value(input, "ada"));
        assert_eq!(doc.value(input).as_deref(), Some("ada"));
        assert!(doc.set_attribute(input, "role", "searchbox"));
        assert_eq!(doc.role(input).as_deref(), Some("searchbox"));
        doc.scroll_to(0.0, 400.0);
        assert_eq!(doc.viewport().scroll_y, 400.0);
        doc.set_location("/a/next");
        assert_eq!(doc.location().path(), "/a/next");
        let body = doc.parent(input).unwrap();
        let added = doc.append(body, SnapshotNode::new("p").text("hi")).unwrap();
        assert!(doc.is_attached(added));
    }
}
