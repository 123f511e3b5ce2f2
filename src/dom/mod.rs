//! The live document the engine reads.
//!
//! The engine never owns the page. It sees it through [`Document`], a small
//! read-only view over an element tree whose node identities are stable for
//! as long as the node lives. [`MemoryDocument`] is the in-process
//! implementation used by tests, the CLI and hosts that mirror the page.

mod memory;
mod path;
mod snapshot;

pub use memory::MemoryDocument;
pub use path::{path_of, Locator, PathSegment};
pub use snapshot::{Snapshot, SnapshotNode};

use crate::location::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a live node. Never reused for a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bounding box in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Rect {
        Rect {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + margin * 2.0,
            height: self.height + margin * 2.0,
        }
    }

    /// True when the two boxes share at least one point. Touching edges count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }
}

/// Visible window of the document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl Viewport {
    /// Visible area in document coordinates.
    pub fn rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }
}

/// Tags considered interactive regardless of attributes.
const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "summary", "option", "label",
];

/// ARIA roles considered interactive.
const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "tab", "menuitem", "checkbox", "radio", "switch", "option", "combobox",
    "textbox", "searchbox", "treeitem",
];

/// Read access to a live element tree.
///
/// Methods take `&self` and must tolerate the tree changing between calls:
/// a node that disappeared simply yields `None`/empty results.
pub trait Document: Send + Sync {
    /// Current page location.
    fn location(&self) -> Location;

    fn viewport(&self) -> Viewport;

    /// The document element.
    fn root(&self) -> Option<NodeId>;

    /// Element children in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Lowercase tag name.
    fn tag(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    /// Current value of a form control.
    fn value(&self, node: NodeId) -> Option<String>;

    fn rect(&self, node: NodeId) -> Option<Rect>;

    /// Whether the node is still part of the tree reachable from the root.
    fn is_attached(&self, node: NodeId) -> bool;

    /// `node` and everything under it, pre-order.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            let kids = self.children(n);
            stack.extend(kids.into_iter().rev());
        }
        out
    }

    /// Every element in document order.
    fn elements(&self) -> Vec<NodeId> {
        self.root().map(|r| self.descendants(r)).unwrap_or_default()
    }

    /// Text of the node and its descendants in document order, as
    /// `textContent` reads it, whitespace collapsed. Inline markup must not
    /// reorder it: `Learn <b>more</b> now` reads "Learn more now".
    fn text_content(&self, node: NodeId) -> String;

    /// Text a user would identify the element by: its content, or for
    /// controls without content, its label-like attributes and value.
    fn display_text(&self, node: NodeId) -> String {
        let content = self.text_content(node);
        if !content.is_empty() {
            return content;
        }
        for attr in ["aria-label", "placeholder", "title", "alt"] {
            if let Some(v) = self.attribute(node, attr) {
                if !v.trim().is_empty() {
                    return collapse_whitespace(&v);
                }
            }
        }
        self.value(node)
            .map(|v| collapse_whitespace(&v))
            .unwrap_or_default()
    }

    /// True when `node` is `ancestor` or sits under it.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Explicit `role` attribute, else the role implied by the tag.
    fn role(&self, node: NodeId) -> Option<String> {
        if let Some(role) = self.attribute(node, "role") {
            if !role.trim().is_empty() {
                return Some(role.trim().to_string());
            }
        }
        let tag = self.tag(node)?;
        let input_type = self.attribute(node, "type");
        implicit_role(&tag, input_type.as_deref(), self.attribute(node, "href").is_some())
            .map(str::to_string)
    }

    /// Clickable or focusable.
    fn is_interactive(&self, node: NodeId) -> bool {
        let Some(tag) = self.tag(node) else {
            return false;
        };
        if INTERACTIVE_TAGS.contains(&tag.as_str()) {
            return true;
        }
        if let Some(role) = self.attribute(node, "role") {
            if INTERACTIVE_ROLES.contains(&role.trim()) {
                return true;
            }
        }
        self.attribute(node, "onclick").is_some()
            || self
                .attribute(node, "tabindex")
                .is_some_and(|t| t.trim() != "-1")
            || self
                .attribute(node, "contenteditable")
                .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true"))
    }
}

/// Role a tag carries without an explicit `role` attribute.
pub fn implicit_role(tag: &str, input_type: Option<&str>, has_href: bool) -> Option<&'static str> {
    let role = match tag {
        "a" | "area" if has_href => "link",
        "button" | "summary" => "button",
        "select" => "combobox",
        "textarea" => "textbox",
        "option" => "option",
        "nav" => "navigation",
        "img" => "img",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        "input" => match input_type.map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("checkbox") => "checkbox",
            Some("radio") => "radio",
            Some("button") | Some("submit") | Some("reset") | Some("image") => "button",
            Some("range") => "slider",
            Some("search") => "searchbox",
            Some("hidden") => return None,
            _ => "textbox",
        },
        _ => return None,
    };
    Some(role)
}

/// Trim and collapse runs of whitespace to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
