//! # Karma Core
//!
//! Pure primitives for the karma ledger: records, key normalization,
//! vote-token parsing, and the row codec for bulk transfer.
//!
//! This crate contains no I/O and no storage. It is pure computation
//! over names and counters.
//!
//! ## Key Types
//!
//! - [`KarmaRecord`] - One entity's counters within a channel
//! - [`Vote`] - A parsed `++`/`--` token
//! - [`MostKind`] - Metric selector for "most" aggregate queries
//!
//! ## Normalization
//!
//! Identity is case-insensitive: every lookup key is derived with
//! [`normalize`] before comparison. See the [`record`] module.

pub mod csv;
pub mod error;
pub mod record;
pub mod vote;

pub use csv::{parse_row, parse_rows, write_row};
pub use error::{CoreError, Result};
pub use record::{normalize, KarmaRecord, MostKind};
pub use vote::{Delta, Vote};
