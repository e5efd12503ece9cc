//! Karma records and key normalization.
//!
//! A record exists only once an entity has received its first vote.
//! Identity within a channel is the normalized (lower-cased) form of
//! the display name; the display name itself is stored verbatim as
//! first seen.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Derive the lookup key for a display name.
///
/// Applied before every key comparison: `get`, `get_many`,
/// `increment`, `decrement`, `clear`, and the normalized half of
/// rank matching. "Foo" and "foo" address the same record.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// One entity's counters within a channel.
///
/// `added` and `subtracted` only ever grow; the record as a whole is
/// deleted by `clear`, never reset to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaRecord {
    /// Display name, case preserved from the first vote.
    pub name: String,
    /// Count of positive votes.
    pub added: u64,
    /// Count of negative votes.
    pub subtracted: u64,
}

impl KarmaRecord {
    /// Create a fresh record with zero counters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            added: 0,
            subtracted: 0,
        }
    }

    /// The normalized key for this record.
    pub fn normalized(&self) -> String {
        normalize(&self.name)
    }

    /// Net karma: `added - subtracted`. The primary ranking metric.
    pub fn net(&self) -> i64 {
        self.added as i64 - self.subtracted as i64
    }

    /// Total activity: `added + subtracted`.
    pub fn activity(&self) -> u64 {
        self.added + self.subtracted
    }
}

/// Metric selector for the `most` aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MostKind {
    /// Order by `added`.
    Increased,
    /// Order by `subtracted`.
    Decreased,
    /// Order by `added + subtracted`.
    Active,
}

impl MostKind {
    /// Evaluate this metric against a record.
    pub fn metric(&self, record: &KarmaRecord) -> u64 {
        match self {
            MostKind::Increased => record.added,
            MostKind::Decreased => record.subtracted,
            MostKind::Active => record.activity(),
        }
    }
}

impl fmt::Display for MostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MostKind::Increased => "increased",
            MostKind::Decreased => "decreased",
            MostKind::Active => "active",
        };
        f.write_str(s)
    }
}

impl FromStr for MostKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increased" => Ok(MostKind::Increased),
            "decreased" => Ok(MostKind::Decreased),
            "active" => Ok(MostKind::Active),
            other => Err(CoreError::InvalidKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases() {
        assert_eq!(normalize("Foo"), "foo");
        assert_eq!(normalize("FOO BAR"), "foo bar");
        assert_eq!(normalize("already lower"), "already lower");
    }

    #[test]
    fn test_net_can_go_negative() {
        let record = KarmaRecord {
            name: "foo".to_string(),
            added: 1,
            subtracted: 4,
        };
        assert_eq!(record.net(), -3);
        assert_eq!(record.activity(), 5);
    }

    #[test]
    fn test_most_kind_from_str() {
        assert_eq!("increased".parse::<MostKind>().unwrap(), MostKind::Increased);
        assert_eq!("decreased".parse::<MostKind>().unwrap(), MostKind::Decreased);
        assert_eq!("active".parse::<MostKind>().unwrap(), MostKind::Active);
        assert!(matches!(
            "busiest".parse::<MostKind>(),
            Err(CoreError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_most_kind_metric() {
        let record = KarmaRecord {
            name: "foo".to_string(),
            added: 7,
            subtracted: 2,
        };
        assert_eq!(MostKind::Increased.metric(&record), 7);
        assert_eq!(MostKind::Decreased.metric(&record), 2);
        assert_eq!(MostKind::Active.metric(&record), 9);
    }
}
