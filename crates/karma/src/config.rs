//! Service configuration.
//!
//! The backend is a deployment-time choice resolved once at startup;
//! it is not switchable per call. Ranking limits mirror the host's
//! per-channel display settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KarmaError;

/// Which storage engine backs the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded SQLite, one database file per channel.
    Sqlite,
    /// redb, one database file per channel.
    Redb,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite => f.write_str("sqlite"),
            BackendKind::Redb => f.write_str("redb"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = KarmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(BackendKind::Sqlite),
            "redb" => Ok(BackendKind::Redb),
            other => Err(KarmaError::UnknownBackend(other.to_string())),
        }
    }
}

/// Configuration for the karma service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KarmaConfig {
    /// Storage backend, selected once at startup.
    pub backend: BackendKind,
    /// Directory holding the per-channel database files.
    pub data_dir: PathBuf,
    /// How many entries the no-argument query shows per end.
    #[serde(default = "default_ranking_display")]
    pub ranking_display: usize,
    /// How many entries the `most` query shows.
    #[serde(default = "default_most_display")]
    pub most_display: usize,
}

fn default_ranking_display() -> usize {
    3
}

fn default_most_display() -> usize {
    25
}

impl Default for KarmaConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            data_dir: PathBuf::from("data/karma"),
            ranking_display: default_ranking_display(),
            most_display: default_most_display(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("redb".parse::<BackendKind>().unwrap(), BackendKind::Redb);
        assert!(matches!(
            "postgres".parse::<BackendKind>(),
            Err(KarmaError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = KarmaConfig::default();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.ranking_display, 3);
        assert_eq!(config.most_display, 25);
    }
}
