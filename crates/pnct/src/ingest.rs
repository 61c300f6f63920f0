//! Collecting a PNCT table: download, keep the raw files, parse the CSV.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument, warn};
use zip::ZipArchive;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::source::ArchiveSource;

/// Everything produced by one collection run.
#[derive(Debug, Clone)]
pub struct Collected {
    /// The query that was collected.
    pub query: Query,
    /// The parsed table, before any normalization.
    pub dataset: Dataset,
    /// Where the archive was fetched from.
    pub url: String,
    /// Where the archive was saved.
    pub zip_path: PathBuf,
    /// Where the CSV was extracted.
    pub csv_path: PathBuf,
}

/// Downloads archives into a raw-data directory tree and parses them.
///
/// Files are laid out as `<root>/<year>/BR-<n>/arquivos_zip/pnct_<year>_<n>.zip`
/// and `<root>/<year>/BR-<n>/arquivos_csv/<csv name>`.
#[derive(Debug, Clone)]
pub struct Collector {
    root: PathBuf,
}

impl Collector {
    /// Create a collector writing below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Fetch, store and parse the archive for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created, the download fails,
    /// the archive is not a ZIP, holds no CSV, or the CSV cannot be read.
    #[instrument(skip(self, source, query), fields(query = %query))]
    pub fn collect(&self, source: &dyn ArchiveSource, query: &Query) -> Result<Collected> {
        let zip_dir = query.zip_dir(&self.root);
        let csv_dir = query.csv_dir(&self.root);
        create_dir(&zip_dir)?;
        create_dir(&csv_dir)?;

        let archive = source.fetch(query)?;
        let is_zip = archive
            .content_type
            .as_deref()
            .is_some_and(|content_type| content_type.to_ascii_lowercase().contains("zip"));
        if !is_zip {
            error!(
                "Unexpected content type {:?} from {}",
                archive.content_type, archive.url
            );
            return Err(Error::invalid_archive(
                "downloaded content is not a ZIP archive",
            ));
        }

        let zip_path = zip_dir.join(query.archive_name());
        std::fs::write(&zip_path, &archive.bytes).map_err(|err| {
            error!("Failed to save archive to {}: {}", zip_path.display(), err);
            Error::Io(err)
        })?;
        info!("Archive saved to {}", zip_path.display());

        let (csv_path, csv_bytes) = extract_first_csv(&archive.bytes, &csv_dir)?;
        info!("CSV extracted to {}", csv_path.display());

        let dataset = Dataset::from_csv_bytes(&csv_bytes).map_err(|err| {
            error!("Failed to read CSV {}: {}", csv_path.display(), err);
            err
        })?;
        if dataset.is_empty() {
            warn!("{} has no data rows", csv_path.display());
        }

        Ok(Collected {
            query: *query,
            dataset,
            url: archive.url,
            zip_path,
            csv_path,
        })
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            error!("Permission denied creating {}", path.display());
        } else {
            error!("Failed to create {}: {}", path.display(), source);
        }
        Error::DirectoryCreate {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Extract the first `.csv` entry of a ZIP archive into `dir`.
///
/// Returns the written path and the entry's bytes. Directory components of
/// the entry name are dropped so the file always lands directly in `dir`.
fn extract_first_csv(bytes: &[u8], dir: &Path) -> Result<(PathBuf, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
        error!("Corrupted archive: {}", err);
        Error::CorruptArchive {
            message: err.to_string(),
        }
    })?;
    if archive.is_empty() {
        error!("Archive has no entries");
        return Err(Error::CorruptArchive {
            message: "archive is empty".to_string(),
        });
    }

    let index = (0..archive.len())
        .find(|&i| {
            archive.name_for_index(i).is_some_and(|name| {
                !name.ends_with('/')
                    && Path::new(name)
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
        })
        .ok_or_else(|| {
            error!("No CSV entry in archive");
            Error::invalid_archive("no CSV file found in archive")
        })?;

    let mut entry = archive.by_index(index)?;
    let file_name = entry
        .enclosed_name()
        .and_then(|path| path.file_name().map(ToOwned::to_owned))
        .ok_or_else(|| {
            Error::invalid_archive(format!("unsafe entry name in archive: {}", entry.name()))
        })?;

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;

    let path = dir.join(file_name);
    std::fs::write(&path, &contents)?;
    Ok((path, contents))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::source::{MemoryArchiveSource, ZIP_CONTENT_TYPE};

    const CSV: &[u8] = b"br;uf;latitude;longitude\n101;SC;-27.5;-48.5\n101;RS;-29.9;-51.1\n";

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn query() -> Query {
        Query::new(2023, 101).unwrap()
    }

    fn source_with(content_type: Option<&str>, bytes: Vec<u8>) -> MemoryArchiveSource {
        MemoryArchiveSource::new("mem://pnct").with_archive(query(), content_type, bytes)
    }

    #[test]
    fn test_collect_writes_raw_files_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let bytes = zip_with(&[("readme.txt", b"hello"), ("pnct_2023_101.csv", CSV)]);
        let source = source_with(Some(ZIP_CONTENT_TYPE), bytes.clone());

        let collected = collector.collect(&source, &query()).unwrap();

        assert_eq!(collected.dataset.len(), 2);
        assert_eq!(
            collected.zip_path,
            dir.path().join("2023/BR-101/arquivos_zip/pnct_2023_101.zip")
        );
        assert_eq!(
            collected.csv_path,
            dir.path().join("2023/BR-101/arquivos_csv/pnct_2023_101.csv")
        );
        assert_eq!(std::fs::read(&collected.zip_path).unwrap(), bytes);
        assert_eq!(std::fs::read(&collected.csv_path).unwrap(), CSV);
        assert_eq!(collected.url, "mem://pnct/pnct_2023_101.zip");
    }

    #[test]
    fn test_collect_accepts_zip_content_type_variants() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(
            Some("application/x-zip-compressed"),
            zip_with(&[("dados.CSV", CSV)]),
        );

        let collected = collector.collect(&source, &query()).unwrap();
        assert!(collected.csv_path.ends_with("dados.CSV"));
    }

    #[test]
    fn test_collect_rejects_non_zip_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(Some("text/html"), b"<html></html>".to_vec());

        let err = collector.collect(&source, &query()).unwrap_err();
        assert!(matches!(err, Error::InvalidArchive { .. }));
    }

    #[test]
    fn test_collect_rejects_missing_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(None, zip_with(&[("a.csv", CSV)]));

        assert!(collector.collect(&source, &query()).is_err());
    }

    #[test]
    fn test_collect_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(Some(ZIP_CONTENT_TYPE), b"not a zip at all".to_vec());

        let err = collector.collect(&source, &query()).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));
    }

    #[test]
    fn test_collect_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(Some(ZIP_CONTENT_TYPE), zip_with(&[]));

        let err = collector.collect(&source, &query()).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));
    }

    #[test]
    fn test_collect_archive_without_csv() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(
            Some(ZIP_CONTENT_TYPE),
            zip_with(&[("dados.xlsx", b"binary")]),
        );

        let err = collector.collect(&source, &query()).unwrap_err();
        assert!(matches!(err, Error::InvalidArchive { .. }));
        assert!(err.to_string().contains("no CSV"));
    }

    #[test]
    fn test_collect_strips_entry_directories() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(
            Some(ZIP_CONTENT_TYPE),
            zip_with(&[("nested/deeper/contagem.csv", CSV)]),
        );

        let collected = collector.collect(&source, &query()).unwrap();
        assert_eq!(
            collected.csv_path,
            dir.path().join("2023/BR-101/arquivos_csv/contagem.csv")
        );
    }

    #[test]
    fn test_collect_not_found_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = MemoryArchiveSource::new("mem://pnct");

        let err = collector.collect(&source, &query()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_collect_empty_csv_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(dir.path());
        let source = source_with(
            Some(ZIP_CONTENT_TYPE),
            zip_with(&[("vazio.csv", b"br;uf\n")]),
        );

        let collected = collector.collect(&source, &query()).unwrap();
        assert!(collected.dataset.is_empty());
    }
}
