//! # Karma
//!
//! A per-entity reputation ledger: signed counters for arbitrary named
//! entities, scoped per channel, with case-insensitive identity,
//! ranking queries, bulk import/export, and a pluggable storage
//! backend.
//!
//! ## Overview
//!
//! Entities gain or lose karma through `++`/`--` vote tokens. Each
//! channel keeps its own independent record set; within a channel,
//! identity is the lower-cased form of the display name. Records are
//! created lazily on the first vote and deleted only by an explicit
//! clear or a bulk load.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use karma::{KarmaConfig, KarmaService};
//!
//! async fn example() {
//!     let service = KarmaService::open(KarmaConfig::default()).unwrap();
//!
//!     service.vote("#rust", "alice", "ferris++", false).await.unwrap();
//!     let status = service.karma_of("#rust", "Ferris").await.unwrap();
//!     println!("{:?}", status);
//!
//!     service.close().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `karma::core` - Pure primitives (records, vote parsing, row codec)
//! - `karma::store` - Storage abstraction and both backends

pub mod config;
pub mod error;
pub mod service;

// Re-export component crates
pub use karma_core as core;
pub use karma_store as store;

// Re-export main types for convenience
pub use config::{BackendKind, KarmaConfig};
pub use error::{KarmaError, Result};
pub use service::{open_store, CallerRank, KarmaService, KarmaStatus, KarmaSummary, VoteOutcome};

// Re-export commonly used component types
pub use karma_core::{normalize, Delta, KarmaRecord, MostKind, Vote};
pub use karma_store::{KarmaStore, RedbKarmaStore, SqliteKarmaStore, StoreError};
