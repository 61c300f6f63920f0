//! Error types for pnct.
//!
//! This module defines all error types used throughout the pnct crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pnct operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// No dataset has been stored for the query yet.
    #[error("no stored data for {label}; run `pnct fetch` first")]
    NotStored {
        /// Label of the query, e.g. `BR-101 (2023)`.
        label: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Query Errors ===
    /// The requested year or highway is out of range.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the validation failure.
        message: String,
    },

    // === Transport Errors ===
    /// The server has no archive for the requested query.
    #[error("data for {label} not found on the server ({url})")]
    DatasetNotFound {
        /// Label of the query, e.g. `BR-101 (2023)`.
        label: String,
        /// URL that returned 404.
        url: String,
    },

    /// The server answered with an unexpected HTTP status.
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Connecting to or reading from the server failed.
    #[error("network error fetching {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Archive Errors ===
    /// The downloaded archive does not have the expected content.
    #[error("unexpected archive content: {message}")]
    InvalidArchive {
        /// Description of what was wrong.
        message: String,
    },

    /// The downloaded archive could not be read.
    #[error("archive is corrupted: {message}")]
    CorruptArchive {
        /// Description of what went wrong.
        message: String,
    },

    // === Data Errors ===
    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from the dataset.
    #[error("column '{column}' not present in dataset")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The dataset has no rows to work with.
    #[error("dataset is empty")]
    EmptyDataset,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for pnct operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::CorruptArchive {
                message: other.to_string(),
            },
        }
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid query error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create an invalid archive error.
    #[must_use]
    pub fn invalid_archive(message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            message: message.into(),
        }
    }

    /// Create a missing column error.
    #[must_use]
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Check if this error means the server has no data for the query.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DatasetNotFound { .. })
    }

    /// Check if this error is one the user is expected to act on, as
    /// opposed to an unexpected failure worth a look at the logs.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery { .. }
                | Self::DatasetNotFound { .. }
                | Self::Http { .. }
                | Self::Network { .. }
                | Self::Timeout { .. }
                | Self::InvalidArchive { .. }
                | Self::CorruptArchive { .. }
                | Self::Csv(_)
                | Self::DirectoryCreate { .. }
                | Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::NotStored { .. }
        )
    }
}
