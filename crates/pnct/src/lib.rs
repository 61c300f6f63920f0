//! `pnct` - DNIT traffic count panel
//!
//! This library downloads the PNCT (Plano Nacional de Contagem de Tráfego)
//! tables that DNIT publishes per federal highway and year, keeps them in a
//! local SQLite database with a query history, and renders them as tables,
//! charts and maps for the CLI and the web dashboard.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod html;
pub mod ingest;
pub mod logging;
pub mod map;
pub mod panel;
pub mod query;
pub mod source;
pub mod storage;

pub use config::Config;
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use panel::{Lookup, Panel};
pub use query::Query;
pub use source::{ArchiveSource, HttpArchiveSource, MemoryArchiveSource};
pub use storage::{Storage, StorageStats};
