//! Operation tokens.
//!
//! Every top-level operation mints a token. Async continuations capture it
//! and compare it with the current one before committing anything; a
//! mismatch means a newer operation started and the continuation bails.

use std::fmt;

/// Generation id of one top-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationToken(u64);

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Monotonic token counter.
#[derive(Debug, Default)]
pub(crate) struct Generation {
    current: u64,
}

impl Generation {
    /// Start a new operation. Every previously minted token becomes stale.
    pub(crate) fn mint(&mut self) -> OperationToken {
        self.current += 1;
        OperationToken(self.current)
    }

    pub(crate) fn current(&self) -> OperationToken {
        OperationToken(self.current)
    }

    pub(crate) fn is_current(&self, token: OperationToken) -> bool {
        token.0 == self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_invalidates_older_tokens() {
        let mut g = Generation::default();
        let a = g.mint();
        assert!(g.is_current(a));
        let b = g.mint();
        assert!(b > a);
        assert!(!g.is_current(a));
        assert!(g.is_current(b));
        assert_eq!(g.current(), b);
    }
}
