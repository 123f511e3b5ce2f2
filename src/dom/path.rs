//! Structural locators: the path expressions recorders attach to a target.
//!
//! Supported forms:
//!
//! - absolute positional paths: `/html/body/div[2]/button`
//! - an attribute anchor, optionally followed by positional steps:
//!   `//button[@id='save']`, `//*[@id="root"]/div[2]/a`
//!
//! Positional indices are 1-based and count siblings with the same tag
//! (`*` counts every element sibling).

use super::{Document, NodeId};
use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// One `tag[index]` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Lowercase tag, or `*`.
    pub tag: String,
    /// 1-based index among matching siblings.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Anchor {
    tag: String,
    name: String,
    value: String,
}

/// A parsed structural locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    anchor: Option<Anchor>,
    steps: Vec<PathSegment>,
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^//(\*|[A-Za-z][\w-]*)\[@([\w:.-]+)\s*=\s*(?:'([^']*)'|"([^"]*)")\]"#,
        )
        .expect("anchor regex is valid")
    })
}

fn step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\*|[A-Za-z][\w-]*)(?:\[(\d+)\])?$")
            .expect("step regex is valid")
    })
}

impl Locator {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let mut anchor = None;
        let mut rest = expr;

        if let Some(caps) = anchor_re().captures(expr) {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let value = caps
                .get(3)
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            anchor = Some(Anchor {
                tag: caps[1].to_ascii_lowercase(),
                name: caps[2].to_string(),
                value: value.to_string(),
            });
            rest = &expr[whole..];
        } else if expr.starts_with("//") {
            return Err(Error::Locator(format!(
                "'{}': relative paths need an attribute anchor",
                expr
            )));
        } else if !expr.starts_with('/') {
            return Err(Error::Locator(format!("'{}': expected an absolute path", expr)));
        }

        let mut steps = Vec::new();
        if !rest.is_empty() {
            let Some(tail) = rest.strip_prefix('/') else {
                return Err(Error::Locator(format!("'{}': malformed path", expr)));
            };
            for part in tail.split('/') {
                let caps = step_re().captures(part).ok_or_else(|| {
                    Error::Locator(format!("'{}': unsupported step '{}'", expr, part))
                })?;
                let index = match caps.get(2) {
                    Some(m) => m
                        .as_str()
                        .parse::<usize>()
                        .map_err(|e| Error::Locator(format!("'{}': {}", expr, e)))?,
                    None => 1,
                };
                if index == 0 {
                    return Err(Error::Locator(format!("'{}': indices start at 1", expr)));
                }
                steps.push(PathSegment {
                    tag: caps[1].to_ascii_lowercase(),
                    index,
                });
            }
        }

        if anchor.is_none() && steps.is_empty() {
            return Err(Error::Locator(format!("'{}': empty path", expr)));
        }
        Ok(Self { anchor, steps })
    }

    /// The node this locator designates in `doc`, if it still exists.
    pub fn resolve(&self, doc: &dyn Document) -> Option<NodeId> {
        let (mut current, steps) = match self.anchor {
            Some(ref anchor) => {
                let found = doc.elements().into_iter().find(|n| {
                    (anchor.tag == "*" || doc.tag(*n).as_deref() == Some(anchor.tag.as_str()))
                        && doc.attribute(*n, &anchor.name).as_deref() == Some(anchor.value.as_str())
                })?;
                (found, &self.steps[..])
            }
            None => {
                let root = doc.root()?;
                let first = self.steps.first()?;
                if first.index != 1 || !tag_matches(doc, root, &first.tag) {
                    return None;
                }
                (root, &self.steps[1..])
            }
        };

        for seg in steps {
            current = doc
                .children(current)
                .into_iter()
                .filter(|c| tag_matches(doc, *c, &seg.tag))
                .nth(seg.index - 1)?;
        }
        Some(current)
    }
}

fn tag_matches(doc: &dyn Document, node: NodeId, tag: &str) -> bool {
    tag == "*" || doc.tag(node).as_deref() == Some(tag)
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref a) = self.anchor {
            write!(f, "//{}[@{}='{}']", a.tag, a.name, a.value)?;
        }
        for seg in &self.steps {
            if seg.index == 1 {
                write!(f, "/{}", seg.tag)?;
            } else {
                write!(f, "/{}[{}]", seg.tag, seg.index)?;
            }
        }
        Ok(())
    }
}

/// Absolute positional path of `node`, e.g. `/html/body/div[2]/button`.
///
/// The index is only written when the node has same-tag siblings.
pub fn path_of(doc: &dyn Document, node: NodeId) -> Option<String> {
    if !doc.is_attached(node) {
        return None;
    }
    let mut parts = Vec::new();
    let mut cur = node;
    loop {
        let tag = doc.tag(cur)?;
        match doc.parent(cur) {
            Some(parent) => {
                let same: Vec<NodeId> = doc
                    .children(parent)
                    .into_iter()
                    .filter(|c| doc.tag(*c).as_deref() == Some(tag.as_str()))
                    .collect();
                if same.len() > 1 {
                    let idx = same.iter().position(|c| *c == cur)? + 1;
                    parts.push(format!("{}[{}]", tag, idx));
                } else {
                    parts.push(tag);
                }
                cur = parent;
            }
            None => {
                parts.push(tag);
                break;
            }
        }
    }
    parts.reverse();
    Some(format!("/{}", parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, Snapshot, SnapshotNode};

    fn doc() -> MemoryDocument {
        MemoryDocument::from_snapshot(Snapshot::new(
            "/",
            SnapshotNode::new("html").child(
                SnapshotNode::new("body")
                    .child(SnapshotNode::new("div").attr("id", "nav"))
                    .child(
                        SnapshotNode::new("div")
                            .attr("id", "main")
                            .child(SnapshotNode::new("button").text("One"))
                            .child(SnapshotNode::new("button").text("Two").attr("data-testid", "two")),
                    ),
            ),
        ))
    }

    #[test]
    fn test_parse_positional() {
        let loc = Locator::parse("/html/body/div[2]/button").unwrap();
        assert_eq!(loc.steps.len(), 4);
        assert_eq!(loc.steps[2], PathSegment { tag: "div".into(), index: 2 });
        assert_eq!(loc.to_string(), "/html/body/div[2]/button");
    }

    #[test]
    fn test_parse_anchor() {
        let loc = Locator::parse(r#"//*[@id="main"]/button[2]"#).unwrap();
        assert_eq!(loc.to_string(), "//*[@id='main']/button[2]");
        let loc = Locator::parse("//button[@data-testid='two']").unwrap();
        assert!(loc.steps.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Locator::parse("").is_err());
        assert!(Locator::parse("html/body").is_err());
        assert!(Locator::parse("//div").is_err());
        assert!(Locator::parse("/html/body/div[0]").is_err());
        assert!(Locator::parse("/html/body/div[last()]").is_err());
    }

    #[test]
    fn test_resolve() {
        let d = doc();
        let two = d.find_by_attribute("data-testid", "two").unwrap();
        let by_path = Locator::parse("/html/body/div[2]/button[2]").unwrap();
        assert_eq!(by_path.resolve(&d), Some(two));
        let by_anchor = Locator::parse("//*[@id='main']/button[2]").unwrap();
        assert_eq!(by_anchor.resolve(&d), Some(two));
        let direct = Locator::parse("//button[@data-testid='two']").unwrap();
        assert_eq!(direct.resolve(&d), Some(two));
        let missing = Locator::parse("/html/body/div[3]").unwrap();
        assert_eq!(missing.resolve(&d), None);
    }

    #[test]
    fn test_path_of_round_trips() {
        let d = doc();
        let two = d.find_by_attribute("data-testid", "two").unwrap();
        let path = path_of(&d, two).unwrap();
        assert_eq!(path, "/html/body/div[2]/button[2]");
        assert_eq!(Locator::parse(&path).unwrap().resolve(&d), Some(two));
    }
}
