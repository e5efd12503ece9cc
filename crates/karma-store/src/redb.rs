//! redb implementation of the KarmaStore trait.
//!
//! The second interchangeable engine: one redb file per channel, rows
//! keyed by normalized name with a CBOR-encoded record as the value.
//! Ranking and aggregate queries scan the table; channel tables are
//! small enough that a scan is the honest cost model here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::{debug, info};

use karma_core::{csv, normalize, CoreError, KarmaRecord, MostKind};

use crate::error::{Result, StoreError};
use crate::registry::{channel_path, ChannelRegistry};
use crate::traits::{dedupe_normalized, unmatched_names, write_export, KarmaStore};

const KARMA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("karma-1");

/// redb-based karma store.
///
/// Write transactions are serialized by the database, which gives the
/// per-statement atomicity the contract requires; a racing insert for
/// an existing normalized key simply lands on the existing row.
pub struct RedbKarmaStore {
    data_dir: PathBuf,
    channels: Arc<ChannelRegistry<Database>>,
}

impl RedbKarmaStore {
    /// Open a store rooted at the given data directory.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        info!(dir = %data_dir.display(), "opening redb karma store");
        Ok(Self {
            data_dir,
            channels: Arc::new(ChannelRegistry::new()),
        })
    }

    /// Run a closure against a channel's database off the runtime.
    async fn with_db<F, T>(&self, channel: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let channels = self.channels.clone();
        let data_dir = self.data_dir.clone();
        let channel = channel.to_string();

        tokio::task::spawn_blocking(move || {
            let db = channels.get_or_open(&channel, || open_channel(&data_dir, &channel))?;
            f(&db)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

/// Open (and if needed create) one channel's database file.
fn open_channel(data_dir: &Path, channel: &str) -> Result<Database> {
    let path = channel_path(data_dir, channel, "redb");
    debug!(channel, path = %path.display(), "opening channel database");
    let db = Database::builder()
        .create(&path)
        .map_err(|e| StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e)))?;

    // Ensure the table exists so read transactions never miss it.
    let tx = db.begin_write()?;
    {
        let _table = tx.open_table(KARMA_TABLE)?;
    }
    tx.commit()?;
    Ok(db)
}

fn encode_record(record: &KarmaRecord) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf)
        .map_err(|e| StoreError::Codec(CoreError::EncodingError(e.to_string())))?;
    Ok(buf)
}

fn decode_record(bytes: &[u8]) -> Result<KarmaRecord> {
    ciborium::from_reader(bytes)
        .map_err(|e| StoreError::Codec(CoreError::EncodingError(e.to_string())))
}

/// Read every record in the channel.
fn scan(db: &Database) -> Result<Vec<KarmaRecord>> {
    let tx = db.begin_read()?;
    let table = tx.open_table(KARMA_TABLE)?;
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(decode_record(value.value())?);
    }
    Ok(records)
}

/// Insert-if-absent then bump one counter, in a single write transaction.
fn bump(db: &Database, name: &str, positive: bool) -> Result<()> {
    let normalized = normalize(name);
    let tx = db.begin_write()?;
    {
        let mut table = tx.open_table(KARMA_TABLE)?;
        let mut record = match table.get(normalized.as_str())? {
            Some(guard) => decode_record(guard.value())?,
            None => KarmaRecord::new(name),
        };
        if positive {
            record.added += 1;
        } else {
            record.subtracted += 1;
        }
        let encoded = encode_record(&record)?;
        table.insert(normalized.as_str(), encoded.as_slice())?;
    }
    tx.commit()?;
    Ok(())
}

fn by_net_descending(a: &KarmaRecord, b: &KarmaRecord) -> std::cmp::Ordering {
    b.net()
        .cmp(&a.net())
        .then_with(|| a.normalized().cmp(&b.normalized()))
}

#[async_trait]
impl KarmaStore for RedbKarmaStore {
    async fn get(&self, channel: &str, name: &str) -> Result<(u64, u64)> {
        let name = name.to_string();
        self.with_db(channel, move |db| {
            let tx = db.begin_read()?;
            let table = tx.open_table(KARMA_TABLE)?;
            match table.get(normalize(&name).as_str())? {
                Some(guard) => {
                    let record = decode_record(guard.value())?;
                    Ok((record.added, record.subtracted))
                }
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
        self.with_db(channel, move |db| {
            let deduped = dedupe_normalized(&names);
            if deduped.is_empty() {
                return Ok((Vec::new(), Vec::new()));
            }

            let keys: std::collections::HashSet<&str> =
                deduped.iter().map(|(key, _)| key.as_str()).collect();
            let mut found: Vec<KarmaRecord> = scan(db)?
                .into_iter()
                .filter(|record| keys.contains(record.normalized().as_str()))
                .collect();
            found.sort_by(by_net_descending);

            let matches: Vec<(String, i64)> = found
                .into_iter()
                .map(|record| (record.name.clone(), record.net()))
                .collect();
            let neutrals = unmatched_names(deduped, &matches);
            Ok((matches, neutrals))
        })
        .await
    }

    async fn top(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        self.with_db(channel, move |db| {
            let mut records = scan(db)?;
            records.sort_by(by_net_descending);
            records.truncate(limit);
            Ok(records
                .into_iter()
                .map(|record| (record.name.clone(), record.net()))
                .collect())
        })
        .await
    }

    async fn bottom(&self, channel: &str, limit: usize) -> Result<Vec<(String, i64)>> {
        self.with_db(channel, move |db| {
            let mut records = scan(db)?;
            records.sort_by(|a, b| {
                a.net()
                    .cmp(&b.net())
                    .then_with(|| a.normalized().cmp(&b.normalized()))
            });
            records.truncate(limit);
            Ok(records
                .into_iter()
                .map(|record| (record.name.clone(), record.net()))
                .collect())
        })
        .await
    }

    async fn rank(&self, channel: &str, name: &str) -> Result<u64> {
        let name = name.to_string();
        self.with_db(channel, move |db| {
            let records = scan(db)?;
            // Exact stored display name, not normalized.
            let net = records
                .iter()
                .find(|record| record.name == name)
                .map(|record| record.net())
                .ok_or(StoreError::NotFound(name))?;
            let above = records.iter().filter(|record| record.net() > net).count();
            Ok(above as u64 + 1)
        })
        .await
    }

    async fn size(&self, channel: &str) -> Result<u64> {
        self.with_db(channel, move |db| {
            let tx = db.begin_read()?;
            let table = tx.open_table(KARMA_TABLE)?;
            Ok(table.len()?)
        })
        .await
    }

    async fn increment(&self, channel: &str, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_db(channel, move |db| bump(db, &name, true)).await
    }

    async fn decrement(&self, channel: &str, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_db(channel, move |db| bump(db, &name, false)).await
    }

    async fn most(
        &self,
        channel: &str,
        kind: MostKind,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        self.with_db(channel, move |db| {
            let mut records = scan(db)?;
            records.sort_by(|a, b| {
                kind.metric(b)
                    .cmp(&kind.metric(a))
                    .then_with(|| a.normalized().cmp(&b.normalized()))
            });
            records.truncate(limit);
            Ok(records
                .into_iter()
                .map(|record| {
                    let metric = kind.metric(&record);
                    (record.name, metric)
                })
                .collect())
        })
        .await
    }

    async fn clear(&self, channel: &str, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_db(channel, move |db| {
            let tx = db.begin_write()?;
            {
                let mut table = tx.open_table(KARMA_TABLE)?;
                table.remove(normalize(&name).as_str())?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn dump(&self, channel: &str, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        debug!(channel, path = %path.display(), "dumping channel karma");
        self.with_db(channel, move |db| {
            // Table iteration is already normalized-key order.
            let rows: Vec<(String, u64, u64)> = scan(db)?
                .into_iter()
                .map(|record| (record.name, record.added, record.subtracted))
                .collect();
            write_export(&path, &rows)
        })
        .await
    }

    async fn load(&self, channel: &str, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        debug!(channel, path = %path.display(), "loading channel karma");
        self.with_db(channel, move |db| {
            let text = std::fs::read_to_string(&path)?;
            let rows = csv::parse_rows(&text)?;

            let tx = db.begin_write()?;
            {
                tx.delete_table(KARMA_TABLE)?;
                let mut table = tx.open_table(KARMA_TABLE)?;
                for (name, added, subtracted) in rows {
                    let normalized = normalize(&name);
                    // First spelling wins on duplicate keys, matching
                    // the SQLite backend's INSERT OR IGNORE.
                    if table.get(normalized.as_str())?.is_none() {
                        let encoded = encode_record(&KarmaRecord {
                            name,
                            added,
                            subtracted,
                        })?;
                        table.insert(normalized.as_str(), encoded.as_slice())?;
                    }
                }
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
