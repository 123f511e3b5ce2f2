use crate::dom::{Document, NodeId};
use crate::recording::Action;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of DOM event the host forwards to [`Engine::on_interaction`](super::Engine::on_interaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Input,
    Change,
    Focus,
    Hover,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Click => "click",
            Self::Input => "input",
            Self::Change => "change",
            Self::Focus => "focus",
            Self::Hover => "hover",
        })
    }
}

/// A user event observed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub kind: EventKind,
    /// Node the event was dispatched on.
    pub target: NodeId,
    /// Field value carried by input/change events. Read from the document when absent.
    pub value: Option<String>,
}

impl InteractionEvent {
    pub fn click(target: NodeId) -> Self {
        Self {
            kind: EventKind::Click,
            target,
            value: None,
        }
    }

    pub fn input(target: NodeId, value: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Input,
            target,
            value: Some(value.into()),
        }
    }

    pub fn change(target: NodeId, value: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Change,
            target,
            value: Some(value.into()),
        }
    }

    pub fn focus(target: NodeId) -> Self {
        Self {
            kind: EventKind::Focus,
            target,
            value: None,
        }
    }
}

/// History events the host forwards to [`Engine::on_navigation`](super::Engine::on_navigation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationKind {
    Push,
    Replace,
    /// Back/forward.
    Pop,
    Reload,
}

impl fmt::Display for NavigationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::Replace => "replace",
            Self::Pop => "pop",
            Self::Reload => "reload",
        })
    }
}

/// Whether `event` completes a step whose target is `bound`.
///
/// Events dispatched outside the bound subtree never count.
pub(crate) fn accepts(
    action: &Action,
    event: &InteractionEvent,
    doc: &dyn Document,
    bound: NodeId,
) -> bool {
    if !doc.contains(bound, event.target) {
        return false;
    }
    match action {
        Action::Click => event.kind == EventKind::Click,
        Action::Focus => event.kind == EventKind::Focus,
        Action::Hover => event.kind == EventKind::Hover,
        Action::Navigation => true,
        Action::Input { expected } => {
            if !matches!(event.kind, EventKind::Input | EventKind::Change) {
                return false;
            }
            let value = field_value(event, doc, bound);
            match expected {
                Some(expected) => value.contains(expected.as_str()),
                None => !value.is_empty(),
            }
        }
        Action::Change { expected } => {
            if event.kind != EventKind::Change {
                return false;
            }
            match expected {
                Some(expected) => field_value(event, doc, bound) == *expected,
                None => true,
            }
        }
    }
}

fn field_value(event: &InteractionEvent, doc: &dyn Document, bound: NodeId) -> String {
    event
        .value
        .clone()
        .or_else(|| doc.value(event.target))
        .or_else(|| doc.value(bound))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, Snapshot, SnapshotNode};

    fn form() -> MemoryDocument {
        MemoryDocument::from_snapshot(Snapshot::new(
            "/form",
            SnapshotNode::new("html").child(
                SnapshotNode::new("body")
                    .child(
                        SnapshotNode::new("button")
                            .attr("id", "go")
                            .child(SnapshotNode::new("span").attr("id", "label").text("Go")),
                    )
                    .child(SnapshotNode::new("input").attr("id", "email"))
                    .child(
                        SnapshotNode::new("select")
                            .attr("id", "plan")
                            .child(SnapshotNode::new("option").text("Free"))
                            .child(SnapshotNode::new("option").text("Pro")),
                    ),
            ),
        ))
    }

    fn id(doc: &MemoryDocument, v: &str) -> NodeId {
        doc.find_by_attribute("id", v).unwrap()
    }

    #[test]
    fn test_click_requires_containment() {
        let doc = form();
        let go = id(&doc, "go");
        let label = id(&doc, "label");
        let email = id(&doc, "email");
        assert!(accepts(&Action::Click, &InteractionEvent::click(label), &doc, go));
        assert!(accepts(&Action::Click, &InteractionEvent::click(go), &doc, go));
        assert!(!accepts(&Action::Click, &InteractionEvent::click(email), &doc, go));
        // bubbling from an ancestor does not count
        let body = doc.parent(go).unwrap();
        assert!(!accepts(&Action::Click, &InteractionEvent::click(body), &doc, go));
        assert!(!accepts(&Action::Click, &InteractionEvent::focus(go), &doc, go));
    }

    #[test]
    fn test_input_expected_substring() {
        let doc = form();
        let email = id(&doc, "email");
        let action = Action::Input {
            expected: Some("@example.com".into()),
        };
        assert!(!accepts(&action, &InteractionEvent::input(email, "ada@"), &doc, email));
        assert!(accepts(&action, &InteractionEvent::input(email, "ada@example.com"), &doc, email));
        assert!(accepts(&action, &InteractionEvent::change(email, "x@example.com"), &doc, email));
    }

    #[test]
    fn test_input_without_expectation_needs_any_value() {
        let doc = form();
        let email = id(&doc, "email");
        let action = Action::Input { expected: None };
        assert!(!accepts(&action, &InteractionEvent::input(email, ""), &doc, email));
        // whitespace is still something typed
        assert!(accepts(&action, &InteractionEvent::input(email, "  "), &doc, email));

        // value read from the document when the event carries none
        let bare = InteractionEvent {
            kind: EventKind::Input,
            target: email,
            value: None,
        };
        assert!(!accepts(&action, &bare, &doc, email));
        doc.set_value(email, "typed");
        assert!(accepts(&action, &bare, &doc, email));
    }

    #[test]
    fn test_change_exact_match() {
        let doc = form();
        let plan = id(&doc, "plan");
        let action = Action::Change {
            expected: Some("Pro".into()),
        };
        assert!(!accepts(&action, &InteractionEvent::change(plan, "Free"), &doc, plan));
        assert!(!accepts(&action, &InteractionEvent::change(plan, "Pro plan"), &doc, plan));
        assert!(accepts(&action, &InteractionEvent::change(plan, "Pro"), &doc, plan));
        assert!(!accepts(&action, &InteractionEvent::input(plan, "Pro"), &doc, plan));

        let any = Action::Change { expected: None };
        assert!(accepts(&any, &InteractionEvent::change(plan, ""), &doc, plan));
    }

    #[test]
    fn test_navigation_accepts_any_event_inside() {
        let doc = form();
        let go = id(&doc, "go");
        assert!(accepts(&Action::Navigation, &InteractionEvent::focus(go), &doc, go));
        assert!(!accepts(
            &Action::Navigation,
            &InteractionEvent::click(id(&doc, "email")),
            &doc,
            go
        ));
    }
}
