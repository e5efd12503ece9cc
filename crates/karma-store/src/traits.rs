//! Store trait: the abstract interface for karma persistence.
//!
//! This trait keeps the service facade storage-agnostic. Implementations
//! include SQLite and redb; both must produce identical observable
//! behavior for every operation, so swapping backends is invisible to
//! callers.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use karma_core::{csv, normalize, MostKind};

use crate::error::{Result, StoreError};

/// The KarmaStore trait: async interface for per-channel counters.
///
/// The channel is always passed explicitly; the backend resolves it to
/// its own storage unit (one database file per channel). Channel
/// identifiers are compared case-sensitively exactly as given; entity
/// names are matched case-insensitively via `normalize`.
///
/// All methods are async; the SQLite backend runs its statements under
/// `spawn_blocking` to avoid stalling the runtime.
///
/// # Design Notes
///
/// - **Lazy records**: a record is created implicitly by the first
///   increment or decrement, never by an explicit call.
/// - **Racing inserts**: concurrent insert attempts for the same
///   normalized key must not violate uniqueness; the losing insert is
///   discarded and the counter update proceeds regardless.
/// - **Neutral names**: a name with no row is absent from every
///   ranking; `get` and `rank` fail with `NotFound` for it.
#[async_trait]
pub trait KarmaStore: Send + Sync {
    /// Get `(added, subtracted)` for a name, matched by normalized form.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound)
    /// when the name has no record.
    async fn get(&self, channel: &str, name: &str) -> Result<(u64, u64)>;

    /// Batch lookup with neutral partitioning.
    ///
    /// Returns `(matches, unmatched)`: matches as `(name, net)` sorted
    /// net-descending, unmatched as the distinct display names given
    /// that had no record, sorted lexicographically. Duplicates in the
    /// input collapse to one lookup by normalized form.
    async fn get_many(
        &self,
        channel: &str,
        names: &[String],
    ) -> Result<(Vec<(String, i64)>, Vec<String>)>;

    /// Top `limit` records as `(name, net)`, net descending.
    async fn top(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>>;

    /// Bottom `limit` records as `(name, net)`, net ascending.
    async fn bottom(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>>;

    /// 1-based rank of a record, matched by *exact* stored name.
    ///
    /// Computed as `1 + count(records with net strictly greater)`, so
    /// ties share a rank. Fails with `NotFound` when no record carries
    /// exactly this display name.
    async fn rank(&self, channel: &str, name: &str) -> Result<u64>;

    /// Number of records in the channel.
    async fn size(&self, channel: &str) -> Result<u64>;

    /// Record a positive vote, creating the record if absent.
    async fn increment(&self, channel: &str, name: &str) -> Result<()>;

    /// Record a negative vote, creating the record if absent.
    async fn decrement(&self, channel: &str, name: &str) -> Result<()>;

    /// Top `limit` records by the chosen activity metric, descending.
    async fn most(
        &self,
        channel: &str,
        kind: MostKind,
        limit: usize,
    ) -> Result<Vec<(String, u64)>>;

    /// Delete the record matching `normalize(name)`. Absent is Ok.
    async fn clear(&self, channel: &str, name: &str) -> Result<()>;

    /// Export every record as a CSV row to `path`.
    ///
    /// Row order is stable (normalized key). The write is
    /// all-or-nothing: rows go to a temp file which is renamed over
    /// the target, so a failure mid-write never leaves a corrupt file
    /// visible at `path`.
    async fn dump(&self, channel: &str, path: &Path) -> Result<()>;

    /// Replace the channel's entire data set with the rows in `path`.
    ///
    /// Runs as delete-all plus inserts inside one transaction; the
    /// round-trip with [`dump`](KarmaStore::dump) reproduces the
    /// original `(name, added, subtracted)` triples exactly.
    async fn load(&self, channel: &str, path: &Path) -> Result<()>;

    /// Release every cached channel handle. Safe to call twice.
    async fn close(&self) -> Result<()>;
}

/// Collapse an input name list to one entry per normalized key,
/// keeping the first display spelling seen.
///
/// Shared by both backends so `get_many` partitions identically.
pub(crate) fn dedupe_normalized(names: &[String]) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let key = normalize(name);
        if seen.insert(key.clone()) {
            out.push((key, name.clone()));
        }
    }
    out
}

/// Partition deduped inputs into the unmatched remainder after the
/// matched normalized keys are removed, sorted lexicographically.
pub(crate) fn unmatched_names(
    deduped: Vec<(String, String)>,
    matched: &[(String, i64)],
) -> Vec<String> {
    let matched_keys: std::collections::HashSet<String> =
        matched.iter().map(|(name, _)| normalize(name)).collect();
    let mut neutrals: Vec<String> = deduped
        .into_iter()
        .filter(|(key, _)| !matched_keys.contains(key))
        .map(|(_, display)| display)
        .collect();
    neutrals.sort();
    neutrals
}

/// Write export rows to a temp file in the target directory, then
/// rename over the target path so readers never see a partial export.
pub(crate) fn write_export(path: &Path, rows: &[(String, u64, u64)]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    for (name, added, subtracted) in rows {
        file.write_all(csv::write_row(name, *added, *subtracted).as_bytes())?;
    }
    file.flush()?;
    file.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
