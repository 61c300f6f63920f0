//! A validated request for one PNCT table: a year and a federal highway.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// First year DNIT publishes PNCT counts for.
pub const FIRST_YEAR: i32 = 2000;

/// Highest federal highway number.
pub const MAX_HIGHWAY: u16 = 999;

/// A (year, highway) pair identifying one PNCT archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    year: i32,
    highway: u16,
}

impl Query {
    /// Validate and build a query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] when the year is not between 2000 and
    /// the current year, or the highway is not between 1 and 999.
    pub fn new(year: i32, highway: u16) -> Result<Self> {
        let current_year = Utc::now().year();
        if !(FIRST_YEAR..=current_year).contains(&year) {
            return Err(Error::invalid_query(format!(
                "year {year} must be between {FIRST_YEAR} and {current_year}"
            )));
        }
        if !(1..=MAX_HIGHWAY).contains(&highway) {
            return Err(Error::invalid_query(format!(
                "BR {highway} must be a number between 1 and {MAX_HIGHWAY}"
            )));
        }
        Ok(Self { year, highway })
    }

    /// Parse a query from untrusted text, as received from a form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] when either value is not a number or
    /// is out of range.
    pub fn parse(year: &str, highway: &str) -> Result<Self> {
        let year: i32 = year
            .trim()
            .parse()
            .map_err(|_| Error::invalid_query(format!("year '{}' is not a number", year.trim())))?;
        let highway: u16 = highway.trim().parse().map_err(|_| {
            Error::invalid_query(format!("BR '{}' is not a number", highway.trim()))
        })?;
        Self::new(year, highway)
    }

    /// The year of the count.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The federal highway number.
    #[must_use]
    pub const fn highway(&self) -> u16 {
        self.highway
    }

    /// Human-readable label, e.g. `BR-101 (2023)`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("BR-{} ({})", self.highway, self.year)
    }

    /// File name of the archive on the server.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("pnct_{}_{}.zip", self.year, self.highway)
    }

    /// Full archive URL below `base_url`.
    #[must_use]
    pub fn archive_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.archive_name())
    }

    /// Directory holding everything downloaded for this query.
    #[must_use]
    pub fn raw_dir(&self, root: &Path) -> PathBuf {
        root.join(self.year.to_string())
            .join(format!("BR-{}", self.highway))
    }

    /// Directory the archive is saved to.
    #[must_use]
    pub fn zip_dir(&self, root: &Path) -> PathBuf {
        self.raw_dir(root).join("arquivos_zip")
    }

    /// Directory the CSV is extracted to.
    #[must_use]
    pub fn csv_dir(&self, root: &Path) -> PathBuf {
        self.raw_dir(root).join("arquivos_csv")
    }

    /// Suggested file name for a CSV export.
    #[must_use]
    pub fn export_file_name(&self) -> String {
        format!("dados_br{}_{}.csv", self.highway, self.year)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BR-{} ({})", self.highway, self.year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query::new(2023, 101).unwrap()
    }

    #[test]
    fn test_valid_query() {
        let q = query();
        assert_eq!(q.year(), 2023);
        assert_eq!(q.highway(), 101);
    }

    #[test]
    fn test_year_bounds() {
        assert!(Query::new(2000, 101).is_ok());
        assert!(Query::new(Utc::now().year(), 101).is_ok());
        assert!(matches!(
            Query::new(1999, 101),
            Err(Error::InvalidQuery { .. })
        ));
        assert!(Query::new(Utc::now().year() + 1, 101).is_err());
    }

    #[test]
    fn test_highway_bounds() {
        assert!(Query::new(2023, 1).is_ok());
        assert!(Query::new(2023, 999).is_ok());
        assert!(Query::new(2023, 0).is_err());
        assert!(Query::new(2023, 1000).is_err());
    }

    #[test]
    fn test_invalid_year_message_names_range() {
        let err = Query::new(1990, 101).unwrap_err().to_string();
        assert!(err.contains("1990"));
        assert!(err.contains("2000"));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Query::parse(" 2023 ", "101").unwrap(), query());
        assert!(Query::parse("dois mil", "101").is_err());
        assert!(Query::parse("2023", "-5").is_err());
        assert!(Query::parse("2023", "").is_err());
    }

    #[test]
    fn test_label_and_display() {
        assert_eq!(query().label(), "BR-101 (2023)");
        assert_eq!(query().to_string(), "BR-101 (2023)");
    }

    #[test]
    fn test_archive_url() {
        let q = query();
        assert_eq!(q.archive_name(), "pnct_2023_101.zip");
        assert_eq!(
            q.archive_url("https://servicos.dnit.gov.br/dadospnct/arquivos/"),
            "https://servicos.dnit.gov.br/dadospnct/arquivos/pnct_2023_101.zip"
        );
        assert_eq!(
            q.archive_url("http://localhost:8080"),
            "http://localhost:8080/pnct_2023_101.zip"
        );
    }

    #[test]
    fn test_directories() {
        let root = Path::new("/data/raw");
        let q = query();
        assert_eq!(q.raw_dir(root), PathBuf::from("/data/raw/2023/BR-101"));
        assert_eq!(
            q.zip_dir(root),
            PathBuf::from("/data/raw/2023/BR-101/arquivos_zip")
        );
        assert_eq!(
            q.csv_dir(root),
            PathBuf::from("/data/raw/2023/BR-101/arquivos_csv")
        );
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(query().export_file_name(), "dados_br101_2023.csv");
    }
}
