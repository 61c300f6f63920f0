//! `pnct` - CLI for the PNCT traffic panel
//!
//! This binary downloads and inspects DNIT traffic count tables and runs the
//! web dashboard.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use pnct::cli::output::{self, BAR_WIDTH};
use pnct::cli::{
    Cli, Command, ConfigCommand, ExportCommand, FetchCommand, HistoryCommand, ImportCommand,
    MapCommand, OutputFormat, SelectArgs, ShowCommand, StatsCommand,
};
use pnct::dataset::UF;
use pnct::map::{self, MapView};
use pnct::panel::{select_ufs, Lookup, UfSelection};
use pnct::{init_logging, Config, Panel};

/// Where to check which highways and years have counts.
const PNCT_MAP_URL: &str = "https://servicos.dnit.gov.br/dadospnct/mapa";

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(e) = err.downcast_ref::<pnct::Error>() {
                if e.is_not_found() {
                    eprintln!("Check which highways and years have counts at {PNCT_MAP_URL}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(cli.config.clone())?;
    init_logging(cli.verbosity(), config.logging.file.as_deref())?;

    let panel = Panel::from_config(config);

    match cli.command {
        Command::Fetch(cmd) => handle_fetch(&panel, &cmd),
        Command::Show(cmd) => handle_show(&panel, &cmd),
        Command::History(cmd) => handle_history(&panel, &cmd),
        Command::Stats(cmd) => handle_stats(&panel, &cmd),
        Command::Export(cmd) => handle_export(&panel, &cmd),
        Command::Map(cmd) => handle_map(&panel, &cmd),
        Command::Import(cmd) => handle_import(&panel, &cmd),
        Command::List => handle_list(&panel),
        Command::Status(cmd) => handle_status(&panel, cmd.json),
        Command::Clear(cmd) => handle_clear(&panel, cmd.yes),
        Command::Serve(cmd) => {
            let addr = cmd.bind.unwrap_or(panel.config().dashboard.bind);
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(pnct::dashboard::serve(panel, addr))?;
            Ok(())
        }
        Command::Config(cmd) => handle_config(panel.config(), cmd),
    }
}

fn handle_fetch(panel: &Panel, cmd: &FetchCommand) -> anyhow::Result<()> {
    let query = cmd.query.to_query()?;
    let lookup = panel.lookup(&query, cmd.refresh)?;
    print_lookup(&lookup, cmd.rows, cmd.format)
}

fn handle_import(panel: &Panel, cmd: &ImportCommand) -> anyhow::Result<()> {
    let query = cmd.query.to_query()?;
    let lookup = panel
        .import(&query, &cmd.file)
        .with_context(|| format!("failed to import {}", cmd.file.display()))?;
    print_lookup(&lookup, 10, OutputFormat::Table)
}

fn print_lookup(lookup: &Lookup, rows: usize, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let out = serde_json::json!({
            "query": lookup.query,
            "rows": lookup.dataset.len(),
            "from_cache": lookup.from_cache,
            "changed": lookup.changed,
            "fetched_at": lookup.fetched_at,
            "preview": output::records(&lookup.dataset.head(rows)),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let origin = if lookup.from_cache {
        "from local database"
    } else if lookup.changed {
        "downloaded"
    } else {
        "downloaded, unchanged"
    };
    println!(
        "{} rows loaded for {} ({origin})",
        lookup.dataset.len(),
        lookup.query.label()
    );
    if let Some((zip_path, csv_path)) = &lookup.raw_files {
        println!("Archive: {}", zip_path.display());
        println!("CSV:     {}", csv_path.display());
    }
    println!();
    print!("{}", output::render_dataset(&lookup.dataset.head(rows), format));
    Ok(())
}

/// Load the table for `select` and apply its UF filter.
fn select(panel: &Panel, args: &SelectArgs) -> anyhow::Result<UfSelection> {
    let query = args.query.to_query()?;
    let dataset = if args.offline {
        panel.stored(&query)?.dataset
    } else {
        panel.lookup(&query, false)?.dataset
    };
    let requested = (!args.ufs.is_empty()).then_some(args.ufs.as_slice());
    Ok(select_ufs(&dataset, requested))
}

fn describe_selection(selection: &UfSelection) {
    if !selection.available.is_empty() {
        eprintln!(
            "UFs: {} (available: {})",
            selection.selected.join(", "),
            selection.available.join(", ")
        );
    }
}

fn handle_show(panel: &Panel, cmd: &ShowCommand) -> anyhow::Result<()> {
    let selection = select(panel, &cmd.select)?;
    if cmd.format != OutputFormat::Json {
        describe_selection(&selection);
    }
    let rows = if cmd.rows == 0 {
        selection.filtered
    } else {
        selection.filtered.head(cmd.rows)
    };
    print!("{}", output::render_dataset(&rows, cmd.format));
    Ok(())
}

fn handle_history(panel: &Panel, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let limit = cmd
        .limit
        .unwrap_or(panel.config().storage.history_limit);
    let entries = panel.history(limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No queries yet.");
    } else {
        for entry in entries {
            println!(
                "{}  {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.query
            );
        }
    }
    Ok(())
}

fn handle_stats(panel: &Panel, cmd: &StatsCommand) -> anyhow::Result<()> {
    let selection = select(panel, &cmd.select)?;
    let counts = selection.filtered.value_counts(UF)?;

    if cmd.json {
        let counts: serde_json::Map<String, serde_json::Value> = counts
            .into_iter()
            .map(|(uf, n)| (uf, n.into()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        describe_selection(&selection);
        println!("Distribuição por UF");
        print!("{}", output::render_bars(&counts, BAR_WIDTH));
    }
    Ok(())
}

fn handle_export(panel: &Panel, cmd: &ExportCommand) -> anyhow::Result<()> {
    let query = cmd.select.query.to_query()?;
    let selection = select(panel, &cmd.select)?;
    let path = cmd
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(query.export_file_name()));

    write_file(&path, &selection.filtered.to_csv()?)?;
    println!(
        "Wrote {} rows to {}",
        selection.filtered.len(),
        path.display()
    );
    Ok(())
}

fn handle_map(panel: &Panel, cmd: &MapCommand) -> anyhow::Result<()> {
    let query = cmd.select.query.to_query()?;
    let selection = select(panel, &cmd.select)?;
    let markers = map::markers(&selection.filtered)?;
    if markers.is_empty() {
        eprintln!("No rows with coordinates for the selected UFs.");
    }

    let extension = if cmd.geojson { "geojson" } else { "html" };
    let path = cmd.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "mapa_br{}_{}.{extension}",
            query.highway(),
            query.year()
        ))
    });

    let contents = if cmd.geojson {
        serde_json::to_string_pretty(&map::to_geojson(&markers))?
    } else {
        MapView::from_config(&panel.config().dashboard)
            .render_html(&format!("Mapa {}", query.label()), &markers)?
    };
    write_file(&path, contents.as_bytes())?;
    println!("Wrote {} stations to {}", markers.len(), path.display());
    Ok(())
}

fn handle_list(panel: &Panel) -> anyhow::Result<()> {
    let datasets = panel.open_storage()?.list_datasets()?;
    if datasets.is_empty() {
        println!("No stored tables.");
        return Ok(());
    }
    for summary in datasets {
        println!(
            "{:<16} {:>8} rows  fetched {}",
            summary.query.label(),
            summary.row_count,
            summary.fetched_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn handle_status(panel: &Panel, json: bool) -> anyhow::Result<()> {
    let config = panel.config();
    let stats = panel.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "raw_data_dir": config.raw_data_dir(),
            "source": config.source.base_url,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("pnct status");
        println!("-----------");
        println!("Database:      {}", config.database_path().display());
        println!("Raw data:      {}", config.raw_data_dir().display());
        println!("Source:        {}", config.source.base_url);
        println!("Tables:        {}", stats.datasets);
        println!("Rows:          {}", stats.total_rows);
        println!("History:       {}", stats.history_entries);
        println!("Size:          {} bytes", stats.db_size_bytes);
        if let Some(newest) = stats.newest_fetch {
            println!("Last fetch:    {}", newest.format("%Y-%m-%d %H:%M:%S"));
        }
    }
    Ok(())
}

fn handle_clear(panel: &Panel, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This removes every stored table and the query history.");
        println!("Use --yes to confirm.");
        return Ok(());
    }
    let report = panel.clear()?;
    println!(
        "Removed {} tables and {} history entries.",
        report.datasets, report.history
    );
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:   {}", config.database_path().display());
                println!("  History shown:   {}", config.storage.history_limit);
                println!("  History kept:    {}", config.storage.max_history);
                println!();
                println!("[Source]");
                println!("  Base URL:        {}", config.source.base_url);
                println!("  Timeout (s):     {}", config.source.timeout_secs);
                println!("  Raw data dir:    {}", config.raw_data_dir().display());
                println!();
                println!("[Cache]");
                println!("  TTL (s):         {}", config.cache.ttl_secs);
                println!();
                println!("[Dashboard]");
                println!("  Bind:            {}", config.dashboard.bind);
                println!("  Preview rows:    {}", config.dashboard.preview_rows);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            validate_config(&path)?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

/// Load the configuration at `path`, failing when it is invalid.
fn validate_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_from(Some(path.to_path_buf()))
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn write_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
