//! Re-identifying a recorded target in the current document.
//!
//! [`Resolver`] gathers plausible candidates with several independent
//! matchers. [`Validator`] then decides which of them still faithfully match
//! the recorded interaction.

mod matchers;
mod validate;

pub use matchers::Resolver;
pub use validate::{Mode, Selection, ValidationCache, Validator};

use crate::dom::NodeId;
use std::fmt;

/// Which matcher produced a candidate. Ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
    /// The recorded structural locator still resolves.
    Locator,
    /// Tag plus role/identity attributes.
    Attributes,
    /// Text containment.
    Text,
    /// Broad scan over interactive elements.
    Interactive,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Locator => "locator",
            Self::Attributes => "attributes",
            Self::Text => "text",
            Self::Interactive => "interactive",
        })
    }
}

/// A live node considered as the target for one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub node: NodeId,
    pub strategy: Strategy,
    /// Position in resolver priority order, 0 is best.
    pub rank: usize,
}
