//! Vote-token parsing.
//!
//! A vote arrives as free text ending in `++` or `--`. The suffix is
//! stripped, then one layer of enclosing parentheses, so
//! `(foo bar)++` and `foo bar++` affect the same record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::normalize;

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta {
    /// `++`: bumps `added`.
    Plus,
    /// `--`: bumps `subtracted`.
    Minus,
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::Plus => f.write_str("++"),
            Delta::Minus => f.write_str("--"),
        }
    }
}

/// A parsed vote: the target entity and the direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Entity display name, suffix and enclosing parens stripped.
    pub name: String,
    /// Vote direction.
    pub delta: Delta,
}

impl Vote {
    /// Parse a trailing-suffix token into a vote.
    ///
    /// Returns `None` when the token has no `++`/`--` suffix, or when
    /// nothing remains once the suffix and parentheses are stripped
    /// (a lone `++` is a no-op, not an error).
    pub fn parse(token: &str) -> Option<Vote> {
        let (name, delta) = if let Some(name) = token.strip_suffix("++") {
            (name, Delta::Plus)
        } else if let Some(name) = token.strip_suffix("--") {
            (name, Delta::Minus)
        } else {
            return None;
        };

        let name = strip_parens(name);
        if name.is_empty() {
            return None;
        }

        Some(Vote {
            name: name.to_string(),
            delta,
        })
    }

    /// True when this vote targets the given actor's own identity,
    /// compared case-insensitively.
    pub fn targets(&self, actor: &str) -> bool {
        normalize(&self.name) == normalize(actor)
    }
}

/// Strip one layer of enclosing parentheses, if present.
fn strip_parens(name: &str) -> &str {
    name.strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(name)
}
