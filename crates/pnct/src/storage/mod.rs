//! Storage layer for pnct.
//!
//! This module provides `SQLite`-based persistent storage for collected PNCT
//! tables and the history of queries made against them.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::query::Query;

/// Storage engine for datasets and query history.
///
/// Provides persistent storage using `SQLite` with support for:
/// - One dataset per (year, highway), replaced on re-fetch
/// - A history entry for every query served
/// - Freshness checks for cached datasets
/// - Clearing and pruning
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// A dataset as stored, with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDataset {
    /// Row id in the datasets table.
    pub id: i64,
    /// The query the dataset answers.
    pub query: Query,
    /// The processed table.
    pub dataset: Dataset,
    /// BLAKE3 hash of the table.
    pub content_hash: String,
    /// When the table was downloaded.
    pub fetched_at: DateTime<Utc>,
}

/// A stored dataset without its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    /// The query the dataset answers.
    pub query: Query,
    /// Number of rows.
    pub row_count: usize,
    /// When the table was downloaded.
    pub fetched_at: DateTime<Utc>,
}

/// One entry of the query history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Row id in the history table.
    pub id: i64,
    /// Query label, e.g. `BR-101 (2023)`.
    pub query: String,
    /// When the query was made.
    pub timestamp: DateTime<Utc>,
}

/// Result of saving a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Row id of the saved dataset.
    pub id: i64,
    /// Whether the content differs from what was stored before (always
    /// `true` for a first save).
    pub changed: bool,
}

/// Number of rows removed by [`Storage::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearReport {
    /// Datasets removed.
    pub datasets: usize,
    /// History entries removed.
    pub history: usize,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the dashboard read while a fetch is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::migrate(&conn)?;

        debug!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::migrate(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store the dataset for `query`, replacing any previous one, and record
    /// the query in the history.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails.
    pub fn save_dataset(&self, query: &Query, dataset: &Dataset) -> Result<SaveOutcome> {
        let content_hash = dataset.content_hash()?;
        let data = serde_json::to_string(dataset)?;
        let row_count = i64::try_from(dataset.len()).unwrap_or(i64::MAX);
        let now = timestamp_now();

        let previous: Option<String> = self
            .conn
            .query_row(
                "SELECT content_hash FROM datasets WHERE year = ?1 AND highway = ?2",
                params![query.year(), query.highway()],
                |row| row.get(0),
            )
            .optional()?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r"
            INSERT OR REPLACE INTO datasets
                (year, highway, data, row_count, content_hash, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                query.year(),
                query.highway(),
                data,
                row_count,
                content_hash,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO history (query, timestamp) VALUES (?1, ?2)",
            params![query.label(), now],
        )?;
        tx.commit()?;

        let changed = previous.as_deref() != Some(content_hash.as_str());
        if changed {
            info!("Stored {} ({} rows)", query, dataset.len());
        } else {
            info!("{} unchanged since last fetch", query);
        }
        Ok(SaveOutcome { id, changed })
    }

    /// Load the stored dataset for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or deserialization fails.
    pub fn load_dataset(&self, query: &Query) -> Result<Option<StoredDataset>> {
        let row: Option<(i64, String, String, String)> = self
            .conn
            .query_row(
                r"
                SELECT id, data, content_hash, fetched_at
                FROM datasets WHERE year = ?1 AND highway = ?2
                ",
                params![query.year(), query.highway()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(id, data, content_hash, fetched_at)| {
            Ok::<_, Error>(StoredDataset {
                id,
                query: *query,
                dataset: serde_json::from_str(&data)?,
                content_hash,
                fetched_at: parse_timestamp(&fetched_at),
            })
        })
        .transpose()
    }

    /// Load the stored dataset for `query` if it was fetched within `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or deserialization fails.
    pub fn load_fresh(&self, query: &Query, ttl: Duration) -> Result<Option<StoredDataset>> {
        Ok(self.load_dataset(query)?.filter(|stored| {
            // A timestamp in the future (clock change) counts as fresh.
            Utc::now()
                .signed_duration_since(stored.fetched_at)
                .to_std()
                .map_or(true, |age| age <= ttl)
        }))
    }

    /// Record a query in the history without touching the datasets.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_history(&self, query: &Query) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO history (query, timestamp) VALUES (?1, ?2)",
            params![query.label(), timestamp_now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recent history entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, query, timestamp FROM history
            ORDER BY timestamp DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit_i64], |row| {
                let timestamp: String = row.get(2)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    timestamp: parse_timestamp(&timestamp),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Summaries of every stored dataset, newest year first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_datasets(&self) -> Result<Vec<DatasetSummary>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT year, highway, row_count, fetched_at FROM datasets
            ORDER BY year DESC, highway ASC
            ",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(year, highway, row_count, fetched_at)| {
                Ok(DatasetSummary {
                    query: stored_query(year, highway)?,
                    row_count: usize::try_from(row_count).unwrap_or(0),
                    fetched_at: parse_timestamp(&fetched_at),
                })
            })
            .collect()
    }

    /// Delete the stored dataset for `query`.
    ///
    /// Returns `true` if a dataset was deleted, `false` if none was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_dataset(&self, query: &Query) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM datasets WHERE year = ?1 AND highway = ?2",
            params![query.year(), query.highway()],
        )?;
        Ok(affected > 0)
    }

    /// Remove every dataset and history entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<ClearReport> {
        let tx = self.conn.unchecked_transaction()?;
        let datasets = tx.execute("DELETE FROM datasets", [])?;
        let history = tx.execute("DELETE FROM history", [])?;
        tx.commit()?;

        info!(
            "Cleared {} datasets and {} history entries",
            datasets, history
        );
        Ok(ClearReport { datasets, history })
    }

    /// Prune the history to keep only the most recent N entries.
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_history_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep_count).unwrap_or(i64::MAX);
        let affected = self.conn.execute(
            r"
            DELETE FROM history WHERE id NOT IN (
                SELECT id FROM history ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            debug!("Pruned {} history entries to keep {}", affected, keep_count);
        }
        Ok(affected)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (datasets, total_rows, oldest, newest): (i64, i64, Option<String>, Option<String>) =
            self.conn.query_row(
                r"
                SELECT COUNT(*), COALESCE(SUM(row_count), 0), MIN(fetched_at), MAX(fetched_at)
                FROM datasets
                ",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let history_entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            datasets,
            history_entries,
            total_rows,
            oldest_fetch: oldest.as_deref().map(parse_timestamp),
            newest_fetch: newest.as_deref().map(parse_timestamp),
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of stored datasets.
    pub datasets: i64,
    /// Number of history entries.
    pub history_entries: i64,
    /// Rows across all datasets.
    pub total_rows: i64,
    /// When the oldest stored dataset was fetched.
    pub oldest_fetch: Option<DateTime<Utc>>,
    /// When the newest stored dataset was fetched.
    pub newest_fetch: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| {
            warn!("Unparsable timestamp in database: {}", value);
            DateTime::<Utc>::UNIX_EPOCH
        },
        |dt| dt.with_timezone(&Utc),
    )
}

fn stored_query(year: i32, highway: i64) -> Result<Query> {
    let highway = u16::try_from(highway)
        .map_err(|_| Error::internal(format!("stored highway {highway} out of range")))?;
    Query::new(year, highway)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn query(year: i32, highway: u16) -> Query {
        Query::new(year, highway).unwrap()
    }

    fn dataset(rows: &[(&str, &str)]) -> Dataset {
        Dataset::new(
            vec!["br".to_string(), "uf".to_string()],
            rows.iter()
                .map(|(br, uf)| vec![(*br).to_string(), (*uf).to_string()])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        assert!(Storage::open_in_memory().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let storage = create_test_storage();
        let q = query(2023, 101);
        let data = dataset(&[("101", "SC"), ("101", "RS")]);

        let outcome = storage.save_dataset(&q, &data).unwrap();
        assert!(outcome.changed);

        let stored = storage.load_dataset(&q).unwrap().unwrap();
        assert_eq!(stored.id, outcome.id);
        assert_eq!(stored.query, q);
        assert_eq!(stored.dataset, data);
        assert_eq!(stored.content_hash, data.content_hash().unwrap());
    }

    #[test]
    fn test_load_missing() {
        let storage = create_test_storage();
        assert!(storage.load_dataset(&query(2023, 101)).unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous() {
        let storage = create_test_storage();
        let q = query(2023, 101);

        storage.save_dataset(&q, &dataset(&[("101", "SC")])).unwrap();
        let second = dataset(&[("101", "RJ"), ("101", "ES")]);
        let outcome = storage.save_dataset(&q, &second).unwrap();
        assert!(outcome.changed);

        assert_eq!(storage.list_datasets().unwrap().len(), 1);
        assert_eq!(storage.load_dataset(&q).unwrap().unwrap().dataset, second);
    }

    #[test]
    fn test_save_same_content_is_unchanged() {
        let storage = create_test_storage();
        let q = query(2023, 101);
        let data = dataset(&[("101", "SC")]);

        storage.save_dataset(&q, &data).unwrap();
        let outcome = storage.save_dataset(&q, &data).unwrap();
        assert!(!outcome.changed);
    }

    #[test]
    fn test_save_records_history() {
        let storage = create_test_storage();
        storage
            .save_dataset(&query(2023, 101), &dataset(&[("101", "SC")]))
            .unwrap();
        storage
            .save_dataset(&query(2022, 116), &dataset(&[("116", "SP")]))
            .unwrap();

        let history = storage.recent_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "BR-116 (2022)");
        assert_eq!(history[1].query, "BR-101 (2023)");
    }

    #[test]
    fn test_recent_history_limit() {
        let storage = create_test_storage();
        for _ in 0..15 {
            storage.record_history(&query(2023, 101)).unwrap();
        }
        assert_eq!(storage.recent_history(10).unwrap().len(), 10);
        assert!(storage.recent_history(0).unwrap().is_empty());
    }

    #[test]
    fn test_load_fresh() {
        let storage = create_test_storage();
        let q = query(2023, 101);
        storage.save_dataset(&q, &dataset(&[("101", "SC")])).unwrap();

        assert!(storage
            .load_fresh(&q, Duration::from_secs(3_600))
            .unwrap()
            .is_some());

        // Backdate the row past the TTL.
        let old = (Utc::now() - chrono::Duration::hours(2))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        storage
            .conn
            .execute("UPDATE datasets SET fetched_at = ?1", [old])
            .unwrap();

        assert!(storage
            .load_fresh(&q, Duration::from_secs(3_600))
            .unwrap()
            .is_none());
        assert!(storage.load_dataset(&q).unwrap().is_some());
    }

    #[test]
    fn test_list_datasets() {
        let storage = create_test_storage();
        storage
            .save_dataset(&query(2021, 116), &dataset(&[("116", "SP")]))
            .unwrap();
        storage
            .save_dataset(&query(2023, 101), &dataset(&[("101", "SC"), ("101", "PR")]))
            .unwrap();

        let list = storage.list_datasets().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].query, query(2023, 101));
        assert_eq!(list[0].row_count, 2);
        assert_eq!(list[1].query, query(2021, 116));
    }

    #[test]
    fn test_delete_dataset() {
        let storage = create_test_storage();
        let q = query(2023, 101);
        storage.save_dataset(&q, &dataset(&[("101", "SC")])).unwrap();

        assert!(storage.delete_dataset(&q).unwrap());
        assert!(!storage.delete_dataset(&q).unwrap());
        assert!(storage.load_dataset(&q).unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let storage = create_test_storage();
        storage
            .save_dataset(&query(2023, 101), &dataset(&[("101", "SC")]))
            .unwrap();
        storage.record_history(&query(2023, 101)).unwrap();

        let report = storage.clear().unwrap();
        assert_eq!(report.datasets, 1);
        assert_eq!(report.history, 2);
        assert!(storage.recent_history(10).unwrap().is_empty());
        assert!(storage.list_datasets().unwrap().is_empty());
    }

    #[test]
    fn test_prune_history_keep_recent() {
        let storage = create_test_storage();
        for _ in 0..8 {
            storage.record_history(&query(2023, 101)).unwrap();
        }

        assert_eq!(storage.prune_history_keep_recent(5).unwrap(), 3);
        assert_eq!(storage.recent_history(100).unwrap().len(), 5);
        assert_eq!(storage.prune_history_keep_recent(10).unwrap(), 0);
    }

    #[test]
    fn test_stats_empty() {
        let stats = create_test_storage().stats().unwrap();

        assert_eq!(stats.datasets, 0);
        assert_eq!(stats.history_entries, 0);
        assert_eq!(stats.total_rows, 0);
        assert!(stats.oldest_fetch.is_none());
        assert!(stats.newest_fetch.is_none());
    }

    #[test]
    fn test_stats_with_data() {
        let storage = create_test_storage();
        storage
            .save_dataset(&query(2023, 101), &dataset(&[("101", "SC"), ("101", "RS")]))
            .unwrap();
        storage
            .save_dataset(&query(2022, 116), &dataset(&[("116", "SP")]))
            .unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.datasets, 2);
        assert_eq!(stats.history_entries, 2);
        assert_eq!(stats.total_rows, 3);
        assert!(stats.oldest_fetch.is_some());
        assert!(stats.newest_fetch.is_some());
    }

    #[test]
    fn test_open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("rodovias.db");

        let storage = Storage::open(&db_path).unwrap();
        storage
            .save_dataset(&query(2023, 101), &dataset(&[("101", "SC")]))
            .unwrap();
        assert_eq!(storage.path(), db_path);
        assert!(db_path.exists());
        assert!(storage.stats().unwrap().db_size_bytes > 0);
        drop(storage);

        // Data survives reopening.
        let reopened = Storage::open(&db_path).unwrap();
        assert!(reopened.load_dataset(&query(2023, 101)).unwrap().is_some());
    }

    #[test]
    fn test_parse_timestamp_garbage_is_epoch() {
        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_unicode_dataset_roundtrip() {
        let storage = create_test_storage();
        let q = query(2023, 101);
        let data = Dataset::new(
            vec!["município".to_string()],
            vec![vec!["São José".to_string()]],
        )
        .unwrap();
        storage.save_dataset(&q, &data).unwrap();

        let stored = storage.load_dataset(&q).unwrap().unwrap();
        assert_eq!(stored.dataset.rows()[0][0], "São José");
    }
}
