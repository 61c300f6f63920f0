//! Tabular PNCT data.
//!
//! A [`Dataset`] keeps every cell as text, exactly as published, so that
//! tables from different years with different column sets can be stored and
//! exported without loss. Only the coordinate columns get normalized.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Column holding the latitude of the counting station.
pub const LATITUDE: &str = "latitude";
/// Column holding the longitude of the counting station.
pub const LONGITUDE: &str = "longitude";
/// Column holding the state (UF) code.
pub const UF: &str = "uf";
/// Column holding the highway number.
pub const BR: &str = "br";

/// Field separator used by DNIT's CSV files.
const DNIT_DELIMITER: u8 = b';';

/// Number of UF values selected when the user has not picked any.
const DEFAULT_SELECTION_LEN: usize = 2;

/// A table of text cells with named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset, checking that every row matches the header width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when a row has the wrong number of cells.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::internal(format!(
                "row {index} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Parse a DNIT CSV file: `;` separated, Latin-1 encoded, header first.
    ///
    /// Records with more fields than the header are skipped with a warning
    /// instead of failing the whole file. Shorter records are kept, padded
    /// with empty cells.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Csv`] when the input cannot be read as CSV at all.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DNIT_DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|field| decode_latin1(field).trim().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        let mut padded = 0usize;
        let mut record = csv::ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            if record.len() > columns.len() {
                let line = record.position().map_or(0, csv::Position::line);
                warn!(
                    "Skipping line {}: expected {} fields, saw {}",
                    line,
                    columns.len(),
                    record.len()
                );
                skipped += 1;
                continue;
            }
            let mut row: Vec<String> = record.iter().map(decode_latin1).collect();
            if row.len() < columns.len() {
                padded += 1;
                row.resize(columns.len(), String::new());
            }
            rows.push(row);
        }

        if rows.is_empty() {
            warn!("CSV is empty or has no valid rows");
        }
        debug!(
            "Parsed CSV with {} columns, {} rows, {} skipped, {} padded",
            columns.len(),
            rows.len(),
            skipped,
            padded
        );
        Ok(Self { columns, rows })
    }

    /// Column names in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in file order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, matched case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    /// Index of a column that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] when the column is absent.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::missing_column(name))
    }

    /// Coerce latitude and longitude to numbers and drop rows that have
    /// neither.
    ///
    /// Unparsable values become empty cells. Decimal commas are accepted.
    /// A dataset lacking either coordinate column is returned unchanged.
    #[must_use]
    pub fn normalize_coordinates(mut self) -> Self {
        let (Some(lat), Some(lon)) = (self.column_index(LATITUDE), self.column_index(LONGITUDE))
        else {
            debug!("No coordinate columns, skipping normalization");
            return self;
        };

        let before = self.rows.len();
        self.rows.retain_mut(|row| {
            let latitude = parse_number(&row[lat]);
            let longitude = parse_number(&row[lon]);
            row[lat] = latitude.map(|v| v.to_string()).unwrap_or_default();
            row[lon] = longitude.map(|v| v.to_string()).unwrap_or_default();
            latitude.is_some() || longitude.is_some()
        });

        let dropped = before - self.rows.len();
        if dropped > 0 {
            debug!("Dropped {} rows without coordinates", dropped);
        }
        self
    }

    /// Latitude and longitude of a row, when both are present.
    #[must_use]
    pub fn coordinates(&self, row: &[String]) -> Option<(f64, f64)> {
        let lat = self.column_index(LATITUDE)?;
        let lon = self.column_index(LONGITUDE)?;
        Some((parse_number(row.get(lat)?)?, parse_number(row.get(lon)?)?))
    }

    /// Distinct values of a column in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] when the column is absent.
    pub fn distinct(&self, column: &str) -> Result<Vec<String>> {
        let index = self.require_column(column)?;
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for row in &self.rows {
            let value = row[index].as_str();
            if seen.insert(value) {
                values.push(value.to_string());
            }
        }
        Ok(values)
    }

    /// The values preselected in a filter: the first two distinct ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] when the column is absent.
    pub fn default_selection(&self, column: &str) -> Result<Vec<String>> {
        let mut values = self.distinct(column)?;
        values.truncate(DEFAULT_SELECTION_LEN);
        Ok(values)
    }

    /// Rows whose value in `column` is one of `values`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] when the column is absent.
    pub fn filter_in(&self, column: &str, values: &[String]) -> Result<Self> {
        let index = self.require_column(column)?;
        let wanted: HashSet<&str> = values.iter().map(String::as_str).collect();
        Ok(Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| wanted.contains(row[index].as_str()))
                .cloned()
                .collect(),
        })
    }

    /// The first `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Number of rows per value of `column`, in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] when the column is absent.
    pub fn value_counts(&self, column: &str) -> Result<Vec<(String, usize)>> {
        let index = self.require_column(column)?;
        let mut counts: Vec<(String, usize)> = Vec::new();
        for row in &self.rows {
            let value = &row[index];
            match counts.iter_mut().find(|(seen, _)| seen == value) {
                Some((_, count)) => *count += 1,
                None => counts.push((value.clone(), 1)),
            }
        }
        Ok(counts)
    }

    /// Write the dataset as comma-separated UTF-8 with a header row.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV writer fails.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if !self.columns.is_empty() {
            writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.into_inner().map_err(|err| Error::Io(err.into_error()))
    }

    /// BLAKE3 hash of the dataset's canonical JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn content_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

/// Decode ISO-8859-1 bytes. Every byte is the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Parse a numeric cell, accepting a decimal comma. Missing, unparsable and
/// non-finite values are `None`.
fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
