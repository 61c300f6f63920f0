//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::error::Result;
use crate::query::Query;

/// Highway and year of a table.
#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Year of the counts (e.g. 2023)
    #[arg(short, long)]
    pub year: i32,

    /// Federal highway number (e.g. 101 for BR-101)
    #[arg(short, long, value_name = "N")]
    pub br: u16,
}

impl QueryArgs {
    /// Validate into a [`Query`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidQuery`] for an out-of-range year or highway.
    pub fn to_query(&self) -> Result<Query> {
        Query::new(self.year, self.br)
    }
}

/// A table plus the UFs to show from it.
#[derive(Debug, Clone, Args)]
pub struct SelectArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// UF to include; repeat or separate with commas (default: first two)
    #[arg(short, long = "uf", value_name = "UF", value_delimiter = ',')]
    pub ufs: Vec<String>,

    /// Use only the stored table, never download
    #[arg(long)]
    pub offline: bool,
}

/// Fetch command arguments.
#[derive(Debug, Args)]
pub struct FetchCommand {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Download even when a fresh copy is stored
    #[arg(long)]
    pub refresh: bool,

    /// Number of preview rows
    #[arg(short = 'n', long, default_value = "10")]
    pub rows: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Maximum number of rows (0 for all)
    #[arg(short = 'n', long, default_value = "10")]
    pub rows: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Number of entries (default from configuration)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Output file (default: dados_br{N}_{YEAR}.csv)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Map command arguments.
#[derive(Debug, Args)]
pub struct MapCommand {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Output file (default: mapa_br{N}_{YEAR}.html or .geojson)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write GeoJSON instead of an HTML page
    #[arg(long)]
    pub geojson: bool,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    #[command(flatten)]
    pub query: QueryArgs,

    /// PNCT zip archive to load
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on (default from configuration)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Semicolon-separated lines
    #[default]
    Plain,
    /// Aligned table
    Table,
    /// JSON output
    Json,
}
