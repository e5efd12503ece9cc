//! # Karma Store
//!
//! Storage abstraction for the karma ledger. Provides a trait-based
//! interface for per-channel reputation counters with SQLite and redb
//! implementations.
//!
//! ## Overview
//!
//! The store module abstracts counter storage behind the [`KarmaStore`]
//! trait, so the service facade is storage-agnostic. Each channel maps
//! to its own database file, opened lazily on first use and cached in a
//! [`ChannelRegistry`] for the life of the store.
//!
//! ## Key Types
//!
//! - [`KarmaStore`] - The async trait for all storage operations
//! - [`SqliteKarmaStore`] - One SQLite file per channel
//! - [`RedbKarmaStore`] - One redb file per channel
//! - [`ChannelRegistry`] - Lazy per-channel handle cache
//!
//! ## Usage
//!
//! ```rust,no_run
//! use karma_store::{KarmaStore, SqliteKarmaStore};
//!
//! async fn example() {
//!     let store = SqliteKarmaStore::open("data/karma").unwrap();
//!
//!     store.increment("#rust", "ferris").await.unwrap();
//!     let (added, subtracted) = store.get("#rust", "Ferris").await.unwrap();
//!     assert_eq!((added, subtracted), (1, 0));
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Lazy channel handles**: opened once per channel, reused until `close`
//! - **Case-insensitive identity**: every key comparison goes through
//!   `karma_core::normalize`
//! - **Racing inserts**: a duplicate insert for an existing normalized key
//!   is discarded, never surfaced; the counter update proceeds regardless
//! - **Atomic dump**: exports write to a temp file and rename into place

pub mod error;
pub mod redb;
pub mod registry;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use self::redb::RedbKarmaStore;
pub use registry::ChannelRegistry;
pub use sqlite::SqliteKarmaStore;
pub use traits::KarmaStore;
