use super::{Candidate, Strategy};
use crate::dom::{collapse_whitespace, Document, Locator, NodeId};
use crate::recording::Interaction;
use std::collections::HashSet;
use tracing::debug;

/// Attributes that identify an element rather than style it.
pub(crate) const IDENTITY_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "role",
    "type",
    "href",
    "placeholder",
    "aria-label",
    "data-testid",
    "data-test",
    "data-cy",
];

/// How far up from a text node we look for the element a user would click.
const MAX_INTERACTIVE_CLIMB: usize = 4;

/// Produces candidate targets for a recorded interaction.
pub struct Resolver<'a> {
    doc: &'a dyn Document,
}

impl<'a> Resolver<'a> {
    pub fn new(doc: &'a dyn Document) -> Self {
        Self { doc }
    }

    /// Candidates in priority order, de-duplicated. Empty means nothing plausible.
    ///
    /// Matchers run independently: a tag mismatch does not veto a text
    /// match. Sorting out which candidate is right is the validator's job.
    pub fn find_candidates(&self, interaction: &Interaction) -> Vec<Candidate> {
        if !interaction.is_usable() {
            debug!("descriptor has no text, tag or locator: {}", interaction);
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |nodes: Vec<NodeId>, strategy: Strategy| {
            for node in nodes {
                if seen.insert(node) {
                    out.push(Candidate {
                        node,
                        strategy,
                        rank: out.len(),
                    });
                }
            }
        };

        push(self.by_locator(interaction), Strategy::Locator);
        push(self.by_attributes(interaction), Strategy::Attributes);
        push(self.by_text(interaction), Strategy::Text);
        if interaction.xpath.is_none() && !has_attribute_signal(interaction) {
            push(self.interactive(), Strategy::Interactive);
        }

        debug!("{} candidate(s) for {}", out.len(), interaction);
        out
    }

    fn by_locator(&self, interaction: &Interaction) -> Vec<NodeId> {
        let Some(ref expr) = interaction.xpath else {
            return Vec::new();
        };
        match Locator::parse(expr) {
            Ok(locator) => locator.resolve(self.doc).into_iter().collect(),
            Err(e) => {
                debug!("ignoring locator: {}", e);
                Vec::new()
            }
        }
    }

    fn by_attributes(&self, interaction: &Interaction) -> Vec<NodeId> {
        let identity: Vec<(&str, &str)> = interaction
            .attributes
            .iter()
            .filter(|(k, _)| IDENTITY_ATTRIBUTES.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if interaction.tag_name.is_none() && identity.is_empty() {
            return Vec::new();
        }

        self.doc
            .elements()
            .into_iter()
            .filter(|n| {
                if let Some(ref tag) = interaction.tag_name {
                    if self.doc.tag(*n).as_deref() != Some(tag.as_str()) {
                        return false;
                    }
                }
                identity.iter().all(|(name, expected)| {
                    let actual = if *name == "role" {
                        self.doc.role(*n)
                    } else {
                        self.doc.attribute(*n, name)
                    };
                    actual.as_deref() == Some(*expected)
                })
            })
            .collect()
    }

    /// Innermost elements whose text contains the recorded text, each preceded
    /// by its nearest interactive ancestor when there is one.
    fn by_text(&self, interaction: &Interaction) -> Vec<NodeId> {
        let Some(ref raw) = interaction.text else {
            return Vec::new();
        };
        let needle = collapse_whitespace(raw);
        if needle.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for node in self.doc.elements() {
            if !self.doc.display_text(node).contains(&needle) {
                continue;
            }
            let inner_match = self
                .doc
                .children(node)
                .into_iter()
                .any(|c| self.doc.text_content(c).contains(&needle));
            if inner_match {
                continue;
            }
            match self.interactive_ancestor(node) {
                Some(clickable) if clickable != node => out.extend([clickable, node]),
                _ => out.push(node),
            }
        }
        out
    }

    fn interactive_ancestor(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = Some(node);
        for _ in 0..=MAX_INTERACTIVE_CLIMB {
            let n = cur?;
            if self.doc.is_interactive(n) {
                return Some(n);
            }
            cur = self.doc.parent(n);
        }
        None
    }

    fn interactive(&self) -> Vec<NodeId> {
        self.doc
            .elements()
            .into_iter()
            .filter(|n| self.doc.is_interactive(*n))
            .collect()
    }
}

fn has_attribute_signal(interaction: &Interaction) -> bool {
    interaction.tag_name.is_some()
        || interaction
            .attributes
            .keys()
            .any(|k| IDENTITY_ATTRIBUTES.contains(&k.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, Snapshot, SnapshotNode};
    use crate::recording::Action;

    fn doc() -> MemoryDocument {
        MemoryDocument::from_snapshot(Snapshot::new(
            "/a",
            SnapshotNode::new("html").child(
                SnapshotNode::new("body")
                    .child(
                        SnapshotNode::new("div")
                            .attr("class", "card")
                            .child(SnapshotNode::new("h2").text("Billing"))
                            .child(
                                SnapshotNode::new("button")
                                    .attr("id", "save")
                                    .child(SnapshotNode::new("span").text("Save changes")),
                            ),
                    )
                    .child(SnapshotNode::new("a").attr("href", "/help").text("Help"))
                    .child(SnapshotNode::new("input").attr("name", "email").attr("placeholder", "Email")),
            ),
        ))
    }

    fn click() -> Interaction {
        Interaction::new(Action::Click, "/a")
    }

    #[test]
    fn test_unusable_descriptor_yields_nothing() {
        let d = doc();
        let r = Resolver::new(&d);
        assert!(r.find_candidates(&click().with_attribute("class", "x")).is_empty());
    }

    #[test]
    fn test_locator_comes_first() {
        let d = doc();
        let save = d.find_by_attribute("id", "save").unwrap();
        let r = Resolver::new(&d);
        let c = r.find_candidates(
            &click()
                .with_xpath("/html/body/div/button")
                .with_tag("button")
                .with_text("Save changes"),
        );
        assert_eq!(c[0].node, save);
        assert_eq!(c[0].strategy, Strategy::Locator);
        // the same node found again by later matchers is not repeated
        assert_eq!(c.iter().filter(|x| x.node == save).count(), 1);
    }

    #[test]
    fn test_text_match_prefers_interactive_ancestor() {
        let d = doc();
        let save = d.find_by_attribute("id", "save").unwrap();
        let span = d.children(save)[0];
        let r = Resolver::new(&d);
        let c = r.find_candidates(&click().with_text("Save changes"));
        let nodes: Vec<_> = c.iter().map(|x| x.node).collect();
        assert_eq!(&nodes[..2], &[save, span]);
        assert!(c.iter().all(|x| x.rank < c.len()));
    }

    #[test]
    fn test_text_is_case_sensitive() {
        let d = doc();
        let r = Resolver::new(&d);
        let c = r.find_candidates(&click().with_text("save changes").with_tag("button"));
        // the tag matcher still proposes the button; text found nothing
        assert!(c.iter().all(|x| x.strategy != Strategy::Text));
    }

    #[test]
    fn test_tag_mismatch_does_not_veto_text() {
        let d = doc();
        let save = d.find_by_attribute("id", "save").unwrap();
        let r = Resolver::new(&d);
        let c = r.find_candidates(&click().with_tag("a").with_text("Save changes"));
        assert!(c.iter().any(|x| x.node == save && x.strategy == Strategy::Text));
    }

    #[test]
    fn test_attribute_match_uses_implicit_role() {
        let d = doc();
        let help = d.find_by_attribute("href", "/help").unwrap();
        let r = Resolver::new(&d);
        let c = r.find_candidates(&click().with_tag("a").with_attribute("role", "link"));
        assert_eq!(c[0].node, help);
        assert_eq!(c[0].strategy, Strategy::Attributes);
    }

    #[test]
    fn test_placeholder_counts_as_text() {
        let d = doc();
        let email = d.find_by_attribute("name", "email").unwrap();
        let r = Resolver::new(&d);
        let c = r.find_candidates(&Interaction::new(Action::Input { expected: None }, "/a").with_text("Email"));
        assert!(c.iter().any(|x| x.node == email));
    }

    #[test]
    fn test_broad_scan_only_without_structural_signal() {
        let d = doc();
        let r = Resolver::new(&d);
        let text_only = r.find_candidates(&click().with_text("Nowhere"));
        assert!(!text_only.is_empty());
        assert!(text_only.iter().all(|x| x.strategy == Strategy::Interactive));

        let tagged = r.find_candidates(&click().with_tag("table").with_text("Nowhere"));
        assert!(tagged.is_empty());
    }

    #[test]
    fn test_text_across_inline_markup() {
        let d = MemoryDocument::from_snapshot(Snapshot::new(
            "/a",
            SnapshotNode::new("html").child(
                SnapshotNode::new("body").child(
                    SnapshotNode::new("a")
                        .attr("href", "/billing")
                        .text("Learn ")
                        .child(SnapshotNode::new("b").text("more").tail(" about billing")),
                ),
            ),
        ));
        let link = d.find_by_attribute("href", "/billing").unwrap();
        let desc = click().with_tag("a").with_text("Learn more about billing");

        let c = Resolver::new(&d).find_candidates(&desc);
        assert_eq!(c[0].node, link);
        assert!(crate::resolve::Validator::new(&d).validate(
            link,
            &desc,
            crate::resolve::Mode::Strict
        ));
    }

    #[test]
    fn test_broken_locator_is_ignored() {
        let d = doc();
        let r = Resolver::new(&d);
        let c = r.find_candidates(&click().with_xpath("not a path").with_text("Help"));
        assert!(!c.is_empty());
        assert!(c.iter().all(|x| x.strategy != Strategy::Locator));
    }
}
