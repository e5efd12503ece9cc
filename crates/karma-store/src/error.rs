//! Error types for the store module.

use karma_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matches the lookup. Recovered by the facade into a
    /// neutral response; never a hard failure to the end caller.
    #[error("no karma record for {0:?}")]
    NotFound(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage engine error from redb.
    #[error("storage engine error: {0}")]
    Engine(#[from] redb::Error),

    /// Row codec or metric-kind error.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// I/O error during bulk transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend cannot open or reach the channel's storage unit.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        StoreError::Engine(e.into())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Engine(e.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Engine(e.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        StoreError::Engine(e.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Engine(e.into())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
