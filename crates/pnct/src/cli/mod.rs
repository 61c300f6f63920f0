//! Command-line interface for pnct.
//!
//! This module provides the CLI structure and output formatting for the
//! `pnct` binary.

mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    ClearCommand, ConfigCommand, ExportCommand, FetchCommand, HistoryCommand, ImportCommand,
    MapCommand, OutputFormat, QueryArgs, SelectArgs, ServeCommand, ShowCommand, StatsCommand,
    StatusCommand,
};

/// pnct - DNIT traffic counts per federal highway
///
/// Downloads PNCT count tables, keeps them in a local database and shows
/// them as tables, charts and maps, from the terminal or a web dashboard.
#[derive(Debug, Parser)]
#[command(name = "pnct")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download (or reuse) the count table for a highway and year
    Fetch(FetchCommand),

    /// Show rows of a table, filtered by UF
    Show(ShowCommand),

    /// Show recent queries
    History(HistoryCommand),

    /// Count rows per UF
    Stats(StatsCommand),

    /// Write a table as CSV
    Export(ExportCommand),

    /// Write a map of the counting stations
    Map(MapCommand),

    /// Load a PNCT archive already on disk
    Import(ImportCommand),

    /// List stored tables
    List,

    /// Show database status
    Status(StatusCommand),

    /// Remove every stored table and the query history
    Clear(ClearCommand),

    /// Run the web dashboard
    Serve(ServeCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Logging verbosity from `-q` and `-v`.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
