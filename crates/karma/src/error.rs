//! Error types for the karma service.

use karma_core::CoreError;
use karma_store::StoreError;
use thiserror::Error;

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum KarmaError {
    /// Domain-level rejection of a self-vote. A user-facing denial,
    /// not a system error; nothing was persisted.
    #[error("{actor:?} is not allowed to adjust their own karma")]
    SelfRatingDenied {
        /// The actor whose vote was rejected.
        actor: String,
    },

    /// The channel has no karma records at all.
    #[error("no karma records for channel {0:?}")]
    NoData(String),

    /// Unknown backend name in the configuration.
    #[error("unknown backend: {0:?}")]
    UnknownBackend(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Parsing or codec error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, KarmaError>;
