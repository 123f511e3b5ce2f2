use super::Candidate;
use crate::config::TieBreak;
use crate::dom::{collapse_whitespace, Document, Locator, NodeId};
use crate::recording::Interaction;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Confidence tier for [`Validator::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Used when a step is activated. Tag/role, text and locator must agree.
    Strict,
    /// Used by the validation loop. Attached plus the weakest discriminator.
    Relaxed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Relaxed => "relaxed",
        })
    }
}

/// Strict results for one step activation.
///
/// Cleared whenever a new step is activated. Relaxed checks are never cached
/// because the loop calls them precisely to observe a changed document.
#[derive(Debug, Default)]
pub struct ValidationCache {
    results: HashMap<NodeId, bool>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// The candidate picked for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub node: NodeId,
    /// How many candidates passed strict validation. More than one means the
    /// choice came from the tie-break policy.
    pub matches: usize,
}

impl Selection {
    pub fn is_ambiguous(&self) -> bool {
        self.matches > 1
    }
}

/// Decides whether candidates still match their recorded descriptor.
pub struct Validator<'a> {
    doc: &'a dyn Document,
}

impl<'a> Validator<'a> {
    pub fn new(doc: &'a dyn Document) -> Self {
        Self { doc }
    }

    pub fn validate(&self, node: NodeId, interaction: &Interaction, mode: Mode) -> bool {
        match mode {
            Mode::Strict => self.strict(node, interaction),
            Mode::Relaxed => self.relaxed(node, interaction),
        }
    }

    /// Strict validation, memoized in `cache`.
    pub fn validate_cached(
        &self,
        node: NodeId,
        interaction: &Interaction,
        cache: &mut ValidationCache,
    ) -> bool {
        if let Some(&hit) = cache.results.get(&node) {
            return hit;
        }
        let ok = self.strict(node, interaction);
        cache.results.insert(node, ok);
        ok
    }

    fn strict(&self, node: NodeId, interaction: &Interaction) -> bool {
        if !self.doc.is_attached(node) {
            return false;
        }
        if let Some(ref tag) = interaction.tag_name {
            if self.doc.tag(node).as_deref() != Some(tag.as_str()) {
                return false;
            }
        }
        if let Some(role) = interaction.role() {
            if !self.role_matches(node, role) {
                return false;
            }
        }
        if let Some(ref text) = interaction.text {
            if !self.text_matches(node, text) {
                return false;
            }
        }
        match interaction.xpath {
            Some(ref expr) => self.locator_agrees(node, expr),
            None => true,
        }
    }

    fn relaxed(&self, node: NodeId, interaction: &Interaction) -> bool {
        if !self.doc.is_attached(node) {
            return false;
        }
        let text = interaction
            .text
            .as_deref()
            .map(|t| self.text_matches(node, t));
        let role = interaction.role().map(|r| self.role_matches(node, r));
        match (text, role) {
            (None, None) => match interaction.tag_name {
                Some(ref tag) => self.doc.tag(node).as_deref() == Some(tag.as_str()),
                None => true,
            },
            (t, r) => t.unwrap_or(false) || r.unwrap_or(false),
        }
    }

    fn text_matches(&self, node: NodeId, text: &str) -> bool {
        let needle = collapse_whitespace(text);
        needle.is_empty() || self.doc.display_text(node).contains(&needle)
    }

    fn role_matches(&self, node: NodeId, role: &str) -> bool {
        self.doc
            .role(node)
            .is_some_and(|r| r.eq_ignore_ascii_case(role.trim()))
    }

    /// A locator that no longer resolves says nothing. One that resolves to
    /// an unrelated node disagrees; an ancestor or descendant of the
    /// candidate is the same control seen at a different depth.
    fn locator_agrees(&self, node: NodeId, expr: &str) -> bool {
        let Ok(locator) = Locator::parse(expr) else {
            return true;
        };
        match locator.resolve(self.doc) {
            None => true,
            Some(found) => self.doc.contains(found, node) || self.doc.contains(node, found),
        }
    }

    /// Apply the decision policy to the strictly valid subset of `candidates`.
    ///
    /// `previous` is the target bound for the previous step, used by
    /// [`TieBreak::NearestPrevious`].
    pub fn select(
        &self,
        candidates: &[Candidate],
        interaction: &Interaction,
        cache: &mut ValidationCache,
        tie_break: TieBreak,
        previous: Option<NodeId>,
    ) -> Option<Selection> {
        let valid: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| self.validate_cached(c.node, interaction, cache))
            .collect();

        let first = *valid.first()?;
        if valid.len() == 1 {
            return Some(Selection {
                node: first.node,
                matches: 1,
            });
        }

        let chosen = match (tie_break, previous) {
            (TieBreak::NearestPrevious, Some(prev)) => self.nearest(&valid, prev).unwrap_or(first),
            _ => first,
        };
        warn!(
            "{} candidates match {}; using {} ({})",
            valid.len(),
            interaction,
            chosen.node,
            chosen.strategy
        );
        Some(Selection {
            node: chosen.node,
            matches: valid.len(),
        })
    }

    fn nearest<'c>(&self, valid: &[&'c Candidate], previous: NodeId) -> Option<&'c Candidate> {
        let order: HashMap<NodeId, usize> = self
            .doc
            .elements()
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        let Some(&anchor) = order.get(&previous) else {
            debug!("previous target {} is gone; keeping resolver order", previous);
            return None;
        };
        // min_by_key keeps the first of equal distances, so ties fall back to resolver order
        valid
            .iter()
            .filter_map(|c| order.get(&c.node).map(|i| (*c, i.abs_diff(anchor))))
            .min_by_key(|(_, d)| *d)
            .map(|(c, _)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, Snapshot, SnapshotNode};
    use crate::recording::Action;
    use crate::resolve::Resolver;

    fn doc() -> MemoryDocument {
        MemoryDocument::from_snapshot(Snapshot::new(
            "/list",
            SnapshotNode::new("html").child(
                SnapshotNode::new("body")
                    .child(SnapshotNode::new("button").attr("id", "first").text("Delete"))
                    .child(SnapshotNode::new("p").text("spacer"))
                    .child(SnapshotNode::new("p").text("spacer"))
                    .child(SnapshotNode::new("button").attr("id", "second").text("Delete"))
                    .child(SnapshotNode::new("a").attr("href", "/x").attr("id", "link").text("Open report")),
            ),
        ))
    }

    fn delete() -> Interaction {
        Interaction::new(Action::Click, "/list")
            .with_tag("button")
            .with_text("Delete")
    }

    #[test]
    fn test_strict_requires_tag_role_and_text() {
        let d = doc();
        let v = Validator::new(&d);
        let first = d.find_by_attribute("id", "first").unwrap();
        let link = d.find_by_attribute("id", "link").unwrap();

        assert!(v.validate(first, &delete(), Mode::Strict));
        assert!(!v.validate(link, &delete(), Mode::Strict));
        let wrong_role = delete().with_attribute("role", "link");
        assert!(!v.validate(first, &wrong_role, Mode::Strict));
        let implicit = Interaction::new(Action::Click, "/list").with_attribute("role", "link").with_text("Open");
        assert!(v.validate(link, &implicit, Mode::Strict));
    }

    #[test]
    fn test_strict_locator_agreement() {
        let d = doc();
        let v = Validator::new(&d);
        let first = d.find_by_attribute("id", "first").unwrap();
        let second = d.find_by_attribute("id", "second").unwrap();

        let pinned = delete().with_xpath("/html/body/button[2]");
        assert!(v.validate(second, &pinned, Mode::Strict));
        assert!(!v.validate(first, &pinned, Mode::Strict));

        // a stale locator does not veto
        let stale = delete().with_xpath("/html/body/button[7]");
        assert!(v.validate(first, &stale, Mode::Strict));
    }

    #[test]
    fn test_relaxed_tolerates_attribute_drift() {
        let d = doc();
        let v = Validator::new(&d);
        let first = d.find_by_attribute("id", "first").unwrap();
        d.set_attribute(first, "role", "menuitem");
        let desc = delete().with_attribute("role", "button");
        assert!(!v.validate(first, &desc, Mode::Strict));
        assert!(v.validate(first, &desc, Mode::Relaxed));

        d.remove(first);
        assert!(!v.validate(first, &desc, Mode::Relaxed));
    }

    #[test]
    fn test_relaxed_falls_back_to_tag() {
        let d = doc();
        let v = Validator::new(&d);
        let link = d.find_by_attribute("id", "link").unwrap();
        let by_tag = Interaction::new(Action::Click, "/list").with_tag("a");
        assert!(v.validate(link, &by_tag, Mode::Relaxed));
        let other = Interaction::new(Action::Click, "/list").with_tag("button");
        assert!(!v.validate(link, &other, Mode::Relaxed));
    }

    #[test]
    fn test_cache_reuses_strict_results() {
        let d = doc();
        let v = Validator::new(&d);
        let first = d.find_by_attribute("id", "first").unwrap();
        let mut cache = ValidationCache::new();
        assert!(v.validate_cached(first, &delete(), &mut cache));
        assert_eq!(cache.len(), 1);
        // the cached answer stands until the cache is cleared
        d.set_attribute(first, "id", "renamed");
        d.remove(first);
        assert!(v.validate_cached(first, &delete(), &mut cache));
        cache.clear();
        assert!(!v.validate_cached(first, &delete(), &mut cache));
    }

    #[test]
    fn test_select_unique_and_none() {
        let d = doc();
        let v = Validator::new(&d);
        let link = d.find_by_attribute("id", "link").unwrap();
        let desc = Interaction::new(Action::Click, "/list").with_text("Open report");
        let candidates = Resolver::new(&d).find_candidates(&desc);
        let mut cache = ValidationCache::new();
        let sel = v
            .select(&candidates, &desc, &mut cache, TieBreak::ResolverOrder, None)
            .unwrap();
        assert_eq!(sel, Selection { node: link, matches: 1 });

        let missing = Interaction::new(Action::Click, "/list").with_tag("button").with_text("Archive");
        let candidates = Resolver::new(&d).find_candidates(&missing);
        cache.clear();
        assert!(v
            .select(&candidates, &missing, &mut cache, TieBreak::ResolverOrder, None)
            .is_none());
    }

    #[test]
    fn test_ambiguity_resolver_order_is_deterministic() {
        let d = doc();
        let v = Validator::new(&d);
        let first = d.find_by_attribute("id", "first").unwrap();
        let candidates = Resolver::new(&d).find_candidates(&delete());
        for _ in 0..3 {
            let mut cache = ValidationCache::new();
            let sel = v
                .select(&candidates, &delete(), &mut cache, TieBreak::ResolverOrder, None)
                .unwrap();
            assert_eq!(sel.node, first);
            assert!(sel.is_ambiguous());
        }
    }

    #[test]
    fn test_nearest_previous_tie_break() {
        let d = doc();
        let v = Validator::new(&d);
        let second = d.find_by_attribute("id", "second").unwrap();
        let link = d.find_by_attribute("id", "link").unwrap();
        let candidates = Resolver::new(&d).find_candidates(&delete());
        let mut cache = ValidationCache::new();
        let sel = v
            .select(&candidates, &delete(), &mut cache, TieBreak::NearestPrevious, Some(link))
            .unwrap();
        assert_eq!(sel.node, second);

        // without a live previous target the policy degrades to resolver order
        d.remove(link);
        let sel = v
            .select(&candidates, &delete(), &mut cache, TieBreak::NearestPrevious, Some(link))
            .unwrap();
        assert_ne!(sel.node, second);
    }
}
