//! SQLite implementation of the KarmaStore trait.
//!
//! The embedded single-file-per-channel engine, built on rusqlite with
//! bundled SQLite. Statements run under `tokio::task::spawn_blocking`
//! with each channel's connection behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use karma_core::{csv, normalize, MostKind};

use crate::error::{Result, StoreError};
use crate::registry::{channel_path, ChannelRegistry};
use crate::traits::{dedupe_normalized, unmatched_names, write_export, KarmaStore};

/// SQLite-based karma store.
///
/// One database file per channel under the data directory, opened
/// lazily and cached in the registry. Thread-safe via a per-channel
/// mutex around the connection.
pub struct SqliteKarmaStore {
    data_dir: PathBuf,
    channels: Arc<ChannelRegistry<Mutex<Connection>>>,
}

impl SqliteKarmaStore {
    /// Open a store rooted at the given data directory.
    ///
    /// Creates the directory if absent. Channel databases themselves
    /// are created on first reference.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        info!(dir = %data_dir.display(), "opening sqlite karma store");
        Ok(Self {
            data_dir,
            channels: Arc::new(ChannelRegistry::new()),
        })
    }

    /// Run a closure against a channel's connection off the runtime.
    async fn with_conn<F, T>(&self, channel: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let channels = self.channels.clone();
        let data_dir = self.data_dir.clone();
        let channel = channel.to_string();

        tokio::task::spawn_blocking(move || {
            let handle = channels.get_or_open(&channel, || open_channel(&data_dir, &channel))?;
            let mut conn = handle
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

/// Open (and if needed create) one channel's database.
fn open_channel(data_dir: &Path, channel: &str) -> Result<Mutex<Connection>> {
    let path = channel_path(data_dir, channel, "db");
    debug!(channel, path = %path.display(), "opening channel database");
    let conn = Connection::open(&path)
        .map_err(|e| StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e)))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS karma (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            normalized TEXT NOT NULL UNIQUE,
            added INTEGER NOT NULL DEFAULT 0,
            subtracted INTEGER NOT NULL DEFAULT 0
        )",
    )?;
    Ok(Mutex::new(conn))
}

/// Insert-if-absent then bump one counter, inside a transaction.
///
/// The `INSERT OR IGNORE` makes a racing duplicate insert harmless:
/// the loser is discarded and the update applies to whichever row won.
fn bump(conn: &mut Connection, name: &str, insert_sql: &str, update_sql: &str) -> Result<()> {
    let normalized = normalize(name);
    let tx = conn.transaction()?;
    tx.execute(insert_sql, params![name, normalized])?;
    tx.execute(update_sql, params![normalized])?;
    tx.commit()?;
    Ok(())
}

const INSERT_ROW: &str =
    "INSERT OR IGNORE INTO karma (name, normalized, added, subtracted) VALUES (?1, ?2, 0, 0)";
const BUMP_ADDED: &str = "UPDATE karma SET added = added + 1 WHERE normalized = ?1";
const BUMP_SUBTRACTED: &str = "UPDATE karma SET subtracted = subtracted + 1 WHERE normalized = ?1";

#[async_trait]
impl KarmaStore for SqliteKarmaStore {
    async fn get(&self, channel: &str, name: &str) -> Result<(u64, u64)> {
        let name = name.to_string();
        self.with_conn(channel, move |conn| {
            let normalized = normalize(&name);
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT added, subtracted FROM karma WHERE normalized = ?1",
                    params![normalized],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((added, subtracted)) => Ok((added as u64, subtracted as u64)),
                None => Err(StoreError::NotFound(name)),
            }
        })
        .await
    }

    async fn get_many(
        &self,
        channel: &str,
        names: &[String],
    ) -> Result<(Vec<(String, i64)>, Vec<String>)> {
        let names = names.to_vec();
        self.with_conn(channel, move |conn| {
            let deduped = dedupe_normalized(&names);
            if deduped.is_empty() {
                return Ok((Vec::new(), Vec::new()));
            }

            let placeholders = vec!["?"; deduped.len()].join(", ");
            let sql = format!(
                "SELECT name, added - subtracted FROM karma
                 WHERE normalized IN ({placeholders})
                 ORDER BY added - subtracted DESC, normalized ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let keys: Vec<&str> = deduped.iter().map(|(key, _)| key.as_str()).collect();
            let matches = stmt
                .query_map(rusqlite::params_from_iter(keys), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let neutrals = unmatched_names(deduped, &matches);
            Ok((matches, neutrals))
        })
        .await
    }

    async fn top(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        self.with_conn(channel, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, added - subtracted FROM karma
                 ORDER BY added - subtracted DESC, normalized ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn bottom(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        self.with_conn(channel, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, added - subtracted FROM karma
                 ORDER BY added - subtracted ASC, normalized ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn rank(&self, channel: &str, name: &str) -> Result<u64> {
        let name = name.to_string();
        self.with_conn(channel, move |conn| {
            let net: Option<i64> = conn
                .query_row(
                    "SELECT added - subtracted FROM karma WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            let net = net.ok_or(StoreError::NotFound(name))?;
            let above: i64 = conn.query_row(
                "SELECT COUNT(*) FROM karma WHERE added - subtracted > ?1",
                params![net],
                |row| row.get(0),
            )?;
            Ok(above as u64 + 1)
        })
        .await
    }

    async fn size(&self, channel: &str) -> Result<u64> {
        self.with_conn(channel, move |conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM karma", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn increment(&self, channel: &str, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_conn(channel, move |conn| {
            bump(conn, &name, INSERT_ROW, BUMP_ADDED)
        })
        .await
    }

    async fn decrement(&self, channel: &str, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_conn(channel, move |conn| {
            bump(conn, &name, INSERT_ROW, BUMP_SUBTRACTED)
        })
        .await
    }

    async fn most(
        &self,
        channel: &str,
        kind: MostKind,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        self.with_conn(channel, move |conn| {
            let sql = match kind {
                MostKind::Increased => {
                    "SELECT name, added FROM karma
                     ORDER BY added DESC, normalized ASC LIMIT ?1"
                }
                MostKind::Decreased => {
                    "SELECT name, subtracted FROM karma
                     ORDER BY subtracted DESC, normalized ASC LIMIT ?1"
                }
                MostKind::Active => {
                    "SELECT name, added + subtracted FROM karma
                     ORDER BY added + subtracted DESC, normalized ASC LIMIT ?1"
                }
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows
                .into_iter()
                .map(|(name, metric)| (name, metric as u64))
                .collect())
        })
        .await
    }

    async fn clear(&self, channel: &str, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_conn(channel, move |conn| {
            conn.execute(
                "DELETE FROM karma WHERE normalized = ?1",
                params![normalize(&name)],
            )?;
            Ok(())
        })
        .await
    }

    async fn dump(&self, channel: &str, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        debug!(channel, path = %path.display(), "dumping channel karma");
        self.with_conn(channel, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, added, subtracted FROM karma ORDER BY normalized ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            write_export(&path, &rows)
        })
        .await
    }

    async fn load(&self, channel: &str, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        debug!(channel, path = %path.display(), "loading channel karma");
        self.with_conn(channel, move |conn| {
            let text = std::fs::read_to_string(&path)?;
            let rows = csv::parse_rows(&text)?;

            let tx = conn.transaction()?;
            tx.execute("DELETE FROM karma", [])?;
            for (name, added, subtracted) in rows {
                tx.execute(
                    "INSERT OR IGNORE INTO karma (name, normalized, added, subtracted)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![name, normalize(&name), added as i64, subtracted as i64],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.channels.close_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, SqliteKarmaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteKarmaStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_vote_tallies() {
        let (_dir, store) = open_store();
        store.increment("#chan", "foo").await.unwrap();
        store.increment("#chan", "foo").await.unwrap();
        store.decrement("#chan", "foo").await.unwrap();

        assert_eq!(store.get("#chan", "foo").await.unwrap(), (2, 1));
    }

    #[tokio::test]
    async fn test_case_insensitive_identity() {
        let (_dir, store) = open_store();
        store.increment("#chan", "Foo").await.unwrap();
        store.increment("#chan", "foo").await.unwrap();

        // One record, addressed by either spelling.
        assert_eq!(store.get("#chan", "FOO").await.unwrap(), (2, 0));
        assert_eq!(store.size("#chan").await.unwrap(), 1);

        // Display name stays as first seen.
        let top = store.top("#chan", 5).await.unwrap();
        assert_eq!(top, vec![("Foo".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.get("#chan", "nobody").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rank_dense_ties() {
        let (_dir, store) = open_store();
        for _ in 0..3 {
            store.increment("#chan", "foo").await.unwrap();
            store.increment("#chan", "bar").await.unwrap();
        }
        store.increment("#chan", "baz").await.unwrap();

        // foo and bar tie at net 3, baz sits below both.
        assert_eq!(store.rank("#chan", "foo").await.unwrap(), 1);
        assert_eq!(store.rank("#chan", "bar").await.unwrap(), 1);
        assert_eq!(store.rank("#chan", "baz").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rank_matches_exact_name() {
        let (_dir, store) = open_store();
        store.increment("#chan", "Foo").await.unwrap();

        assert_eq!(store.rank("#chan", "Foo").await.unwrap(), 1);
        // Normalized spelling has no stored row under that exact name.
        assert!(matches!(
            store.rank("#chan", "foo").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_top_and_bottom_ordering() {
        let (_dir, store) = open_store();
        for _ in 0..3 {
            store.increment("#chan", "high").await.unwrap();
        }
        store.increment("#chan", "mid").await.unwrap();
        for _ in 0..2 {
            store.decrement("#chan", "low").await.unwrap();
        }

        let top = store.top("#chan", 2).await.unwrap();
        assert_eq!(
            top,
            vec![("high".to_string(), 3), ("mid".to_string(), 1)]
        );

        let bottom = store.bottom("#chan", 2).await.unwrap();
        assert_eq!(
            bottom,
            vec![("low".to_string(), -2), ("mid".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_get_many_partitions() {
        let (_dir, store) = open_store();
        store.increment("#chan", "foo").await.unwrap();

        let (matches, neutrals) = store
            .get_many(
                "#chan",
                &["FOO".to_string(), "zzz".to_string(), "aaa".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(matches, vec![("foo".to_string(), 1)]);
        assert_eq!(neutrals, vec!["aaa".to_string(), "zzz".to_string()]);
    }

    #[tokio::test]
    async fn test_get_many_collapses_duplicates() {
        let (_dir, store) = open_store();
        let (matches, neutrals) = store
            .get_many("#chan", &["Foo".to_string(), "foo".to_string()])
            .await
            .unwrap();
        assert!(matches.is_empty());
        assert_eq!(neutrals, vec!["Foo".to_string()]);
    }

    #[tokio::test]
    async fn test_most_kinds() {
        let (_dir, store) = open_store();
        for _ in 0..3 {
            store.increment("#chan", "liked").await.unwrap();
        }
        for _ in 0..4 {
            store.decrement("#chan", "hated").await.unwrap();
        }

        let inc = store.most("#chan", MostKind::Increased, 1).await.unwrap();
        assert_eq!(inc, vec![("liked".to_string(), 3)]);

        let dec = store.most("#chan", MostKind::Decreased, 1).await.unwrap();
        assert_eq!(dec, vec![("hated".to_string(), 4)]);

        let active = store.most("#chan", MostKind::Active, 2).await.unwrap();
        assert_eq!(
            active,
            vec![("hated".to_string(), 4), ("liked".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_clear_deletes_record() {
        let (_dir, store) = open_store();
        store.increment("#chan", "Foo").await.unwrap();
        assert_eq!(store.size("#chan").await.unwrap(), 1);

        store.clear("#chan", "FOO").await.unwrap();
        assert_eq!(store.size("#chan").await.unwrap(), 0);
        assert!(store.get("#chan", "foo").await.is_err());

        // Clearing an absent name is not an error.
        store.clear("#chan", "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_dump_load_round_trip() {
        let (dir, store) = open_store();
        store.increment("#chan", "Foo Bar").await.unwrap();
        store.increment("#chan", "Foo Bar").await.unwrap();
        store.decrement("#chan", "with, comma").await.unwrap();

        let path = dir.path().join("export.csv");
        store.dump("#chan", &path).await.unwrap();
        store.load("#other", &path).await.unwrap();

        assert_eq!(store.get("#other", "foo bar").await.unwrap(), (2, 0));
        assert_eq!(store.get("#other", "with, comma").await.unwrap(), (0, 1));
        assert_eq!(store.size("#other").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_load_replaces_existing() {
        let (dir, store) = open_store();
        store.increment("#src", "foo").await.unwrap();

        let path = dir.path().join("export.csv");
        store.dump("#src", &path).await.unwrap();

        store.increment("#dst", "stale").await.unwrap();
        store.load("#dst", &path).await.unwrap();

        assert_eq!(store.size("#dst").await.unwrap(), 1);
        assert!(store.get("#dst", "stale").await.is_err());
        assert_eq!(store.get("#dst", "foo").await.unwrap(), (1, 0));
    }

    #[tokio::test]
    async fn test_load_malformed_row() {
        let (dir, store) = open_store();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "foo,three,1\n").unwrap();

        assert!(matches!(
            store.load("#chan", &path).await,
            Err(StoreError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let (_dir, store) = open_store();
        store.increment("#one", "foo").await.unwrap();

        assert!(store.get("#two", "foo").await.is_err());
        assert_eq!(store.size("#two").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_then_reuse() {
        let (_dir, store) = open_store();
        store.increment("#chan", "foo").await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        // Handles reopen lazily after close; data persisted.
        assert_eq!(store.get("#chan", "foo").await.unwrap(), (1, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_no_lost_updates() {
        let (_dir, store) = open_store();
        let store = std::sync::Arc::new(store);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.increment("#chan", "foo").await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get("#chan", "foo").await.unwrap(), (200, 0));
        assert_eq!(store.size("#chan").await.unwrap(), 1);
    }
}
