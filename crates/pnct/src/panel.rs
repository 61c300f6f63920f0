//! The operations behind both the CLI and the dashboard.
//!
//! A [`Panel`] answers queries from the local store when it can and from the
//! archive source when it must, and keeps the query history up to date.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::dataset::{Dataset, UF};
use crate::error::{Error, Result};
use crate::ingest::Collector;
use crate::query::Query;
use crate::source::{ArchiveSource, HttpArchiveSource, MemoryArchiveSource, ZIP_CONTENT_TYPE};
use crate::storage::{ClearReport, HistoryEntry, Storage, StorageStats, StoredDataset};

/// The answer to a query.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The query answered.
    pub query: Query,
    /// The processed table.
    pub dataset: Dataset,
    /// When the table was downloaded.
    pub fetched_at: DateTime<Utc>,
    /// Whether the table came from the local store instead of the server.
    pub from_cache: bool,
    /// Whether a download changed the stored table. `false` for cache hits.
    pub changed: bool,
    /// Where the downloaded archive and CSV were saved, for downloads.
    pub raw_files: Option<(PathBuf, PathBuf)>,
}

/// Which UF values a view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UfSelection {
    /// Every UF present in the dataset, in first-seen order.
    pub available: Vec<String>,
    /// The UFs shown.
    pub selected: Vec<String>,
    /// The rows of the selected UFs.
    pub filtered: Dataset,
}

/// Select rows by UF.
///
/// With `requested` unset the first two UFs are selected; an empty request
/// selects nothing. Requested values are matched case-insensitively and
/// unknown ones ignored. A dataset without a UF column is passed through
/// whole.
#[must_use]
pub fn select_ufs(dataset: &Dataset, requested: Option<&[String]>) -> UfSelection {
    let Ok(available) = dataset.distinct(UF) else {
        debug!("Dataset has no UF column, showing all rows");
        return UfSelection {
            available: Vec::new(),
            selected: Vec::new(),
            filtered: dataset.clone(),
        };
    };

    let selected: Vec<String> = match requested {
        None => dataset.default_selection(UF).unwrap_or_default(),
        Some(requested) => available
            .iter()
            .filter(|uf| requested.iter().any(|r| r.trim().eq_ignore_ascii_case(uf)))
            .cloned()
            .collect(),
    };

    let filtered = dataset
        .filter_in(UF, &selected)
        .unwrap_or_else(|_| dataset.clone());
    UfSelection {
        available,
        selected,
        filtered,
    }
}

/// Ties the archive source, the raw-data collector and the store together.
#[derive(Debug, Clone)]
pub struct Panel {
    config: Config,
    source: Arc<dyn ArchiveSource>,
}

impl Panel {
    /// Create a panel using `source` for downloads.
    #[must_use]
    pub fn new(config: Config, source: Arc<dyn ArchiveSource>) -> Self {
        Self { config, source }
    }

    /// Create a panel downloading over HTTP as configured.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        let source = Arc::new(HttpArchiveSource::from_config(&config.source));
        Self::new(config, source)
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the configured store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_storage(&self) -> Result<Storage> {
        Storage::open(self.config.database_path())
    }

    /// Answer `query`, downloading only when the stored table is missing,
    /// older than the cache TTL, or `refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the download, parsing or storage fails.
    #[instrument(skip(self, query), fields(query = %query))]
    pub fn lookup(&self, query: &Query, refresh: bool) -> Result<Lookup> {
        let storage = self.open_storage()?;

        if !refresh {
            if let Some(ttl) = self.config.cache_ttl() {
                if let Some(stored) = storage.load_fresh(query, ttl)? {
                    debug!("Serving {} from cache", query);
                    storage.record_history(query)?;
                    self.prune_history(&storage)?;
                    return Ok(Lookup {
                        query: *query,
                        dataset: stored.dataset,
                        fetched_at: stored.fetched_at,
                        from_cache: true,
                        changed: false,
                        raw_files: None,
                    });
                }
            }
        }

        let collector = Collector::new(self.config.raw_data_dir());
        let collected = collector.collect(self.source.as_ref(), query)?;
        let dataset = collected.dataset.normalize_coordinates();
        let outcome = storage.save_dataset(query, &dataset)?;
        self.prune_history(&storage)?;
        info!("{} rows loaded for {}", dataset.len(), query);

        Ok(Lookup {
            query: *query,
            dataset,
            fetched_at: Utc::now(),
            from_cache: false,
            changed: outcome.changed,
            raw_files: Some((collected.zip_path, collected.csv_path)),
        })
    }

    /// Import an archive file already on disk as the table for `query`.
    ///
    /// The file goes through the same checks and raw-data layout as a
    /// download.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or processed.
    pub fn import(&self, query: &Query, archive_path: &Path) -> Result<Lookup> {
        let bytes = std::fs::read(archive_path)?;
        let base_url = archive_path
            .parent()
            .map(|dir| format!("file://{}", dir.display()))
            .unwrap_or_default();
        let source = MemoryArchiveSource::new(base_url).with_archive(
            *query,
            Some(ZIP_CONTENT_TYPE),
            bytes,
        );
        let panel = Self::new(self.config.clone(), Arc::new(source));
        panel.lookup(query, true)
    }

    /// The stored table for `query`, without downloading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStored`] when nothing is stored for the query.
    pub fn stored(&self, query: &Query) -> Result<StoredDataset> {
        self.open_storage()?
            .load_dataset(query)?
            .ok_or_else(|| Error::NotStored {
                label: query.label(),
            })
    }

    /// The most recent queries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.open_storage()?.recent_history(limit)
    }

    /// Remove every stored table and the whole history.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<ClearReport> {
        self.open_storage()?.clear()
    }

    /// Store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        self.open_storage()?.stats()
    }

    fn prune_history(&self, storage: &Storage) -> Result<()> {
        if self.config.storage.max_history > 0 {
            storage.prune_history_keep_recent(self.config.storage.max_history)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_csv_bytes(b"br;uf\n101;SC\n101;RS\n101;SC\n101;PR\n").unwrap()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_select_ufs_defaults_to_first_two() {
        let selection = select_ufs(&dataset(), None);
        assert_eq!(selection.available, strings(&["SC", "RS", "PR"]));
        assert_eq!(selection.selected, strings(&["SC", "RS"]));
        assert_eq!(selection.filtered.len(), 3);
    }

    #[test]
    fn test_select_ufs_case_insensitive() {
        let selection = select_ufs(&dataset(), Some(&strings(&["pr", " sc "])));
        // Order follows the dataset, not the request.
        assert_eq!(selection.selected, strings(&["SC", "PR"]));
        assert_eq!(selection.filtered.len(), 3);
    }

    #[test]
    fn test_select_ufs_unknown_values_select_nothing() {
        let selection = select_ufs(&dataset(), Some(&strings(&["AM"])));
        assert!(selection.selected.is_empty());
        assert!(selection.filtered.is_empty());
    }

    #[test]
    fn test_select_ufs_empty_request_selects_nothing() {
        let selection = select_ufs(&dataset(), Some(&[]));
        assert_eq!(selection.available.len(), 3);
        assert!(selection.selected.is_empty());
        assert!(selection.filtered.is_empty());
    }

    #[test]
    fn test_select_ufs_without_uf_column() {
        let data = Dataset::from_csv_bytes(b"br;km\n101;10\n").unwrap();
        let selection = select_ufs(&data, Some(&strings(&["SC"])));
        assert!(selection.available.is_empty());
        assert_eq!(selection.filtered, data);
    }
}
