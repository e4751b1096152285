//! LogTally - periodic log-tree monitoring agent.
//!
//! Thin binary entry point. All logic lives in the `logtally-core` crate.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use logtally_core::agent::Agent;
use logtally_core::config::AgentConfig;
use logtally_core::platform::LocalFileSystem;
use logtally_core::report::{LogEmitter, MonitorTableEmitter, ReportEmitter};
use logtally_core::scanner::{RootHalting, ScanProgress, PROGRESS_CHANNEL_CAPACITY};
use logtally_core::store::MonitorTable;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tracing::{error, info, warn};

/// Count distinct active users and apps in a tree of installation logs.
#[derive(Parser, Debug)]
#[command(name = "logtally", version, about)]
struct CliArgs {
    /// JSON configuration file. Command-line options override it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory to crawl for log roots (repeatable).
    #[arg(short, long = "root", value_name = "DIR", action = clap::ArgAction::Append)]
    roots: Vec<PathBuf>,

    /// SQLite database for the monthly ledger.
    #[arg(long = "db", value_name = "FILE")]
    database: Option<PathBuf>,

    /// Miner to run (repeatable). Defaults to every miner.
    #[arg(short, long = "miner", value_name = "NAME", action = clap::ArgAction::Append)]
    miners: Vec<String>,

    /// First day of the window (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    start: Option<NaiveDate>,

    /// Last day of the window (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    stop: Option<NaiveDate>,

    /// Relative path that marks a log root.
    #[arg(long, value_name = "PATH")]
    marker: Option<PathBuf>,

    /// Stop crawling a root directory after the first log root found in it.
    #[arg(long)]
    halt_siblings: bool,

    /// Archive the report in the monitor table instead of only logging it.
    #[arg(long)]
    archive: bool,

    /// After the run, export unexported ledger rows to this CSV file.
    #[arg(long, value_name = "FILE")]
    export_csv: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("LogTally starting");

    let today = Local::now().date_naive();
    let config = load_config(&args)?;
    config.validate(today).context("Invalid configuration")?;

    let export_path = args.export_csv.clone();
    if export_path.is_some() && config.database_path.is_none() {
        bail!("--export-csv needs a database (--db or databasePath)");
    }

    let mut emitter: Box<dyn ReportEmitter> = match (&config.database_path, config.archive_reports)
    {
        (Some(db), true) => Box::new(MonitorTableEmitter::new(
            MonitorTable::new(db),
            config.monitor_name.clone(),
        )),
        (None, true) => bail!("--archive needs a database (--db or databasePath)"),
        (_, false) => Box::new(LogEmitter),
    };

    let (progress_tx, progress_rx) = crossbeam_channel::bounded(PROGRESS_CHANNEL_CAPACITY);
    let listener = thread::spawn(move || collect_problems(progress_rx));

    let fs = LocalFileSystem;
    let mut agent = Agent::new(config, &fs).with_progress(progress_tx);
    let report = agent
        .run_once(emitter.as_mut(), today)
        .context("Agent run failed")?;

    let stats = &report.log_file_miner_data;
    info!(
        "Run finished: {} users, {} apps, {} files, {} log locations",
        stats.total_unique_active_users,
        stats.total_unique_active_apps,
        stats.total_nr_of_files,
        stats.total_nr_of_directories
    );

    if let (Some(path), Some(store)) = (export_path, agent.store()) {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let rows = store
            .export_csv(BufWriter::new(file))
            .context("Monthly export failed")?;
        info!("Exported {rows} ledger rows to {}", path.display());
    }

    // Dropping the agent closes the channel and ends the listener.
    drop(agent);
    let problems = listener.join().unwrap_or_default();
    if !problems.is_empty() {
        warn!("{} non-fatal problems during the pass:", problems.len());
        for (path, message) in &problems {
            warn!("  {path}: {message}");
        }
    }

    Ok(())
}

/// Drain progress messages until the sender side closes, keeping the
/// non-fatal problems for the end-of-run summary.
fn collect_problems(rx: crossbeam_channel::Receiver<ScanProgress>) -> Vec<(String, String)> {
    rx.iter()
        .filter_map(|msg| match msg {
            ScanProgress::Error { path, message } => Some((path, message)),
            _ => None,
        })
        .collect()
}

/// File configuration (if any) with command-line overrides applied.
fn load_config(args: &CliArgs) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path).context("Failed to load configuration")?,
        None => AgentConfig::default(),
    };

    if !args.roots.is_empty() {
        config.roots = args.roots.clone();
    }
    if !args.miners.is_empty() {
        config.miners = args.miners.clone();
    }
    if let Some(db) = &args.database {
        config.database_path = Some(db.clone());
    }
    if args.start.is_some() || args.stop.is_some() {
        config.start_date = args.start;
        config.stop_date = args.stop;
    }
    if let Some(marker) = &args.marker {
        config.marker = marker.clone();
    }
    if args.halt_siblings {
        config.halting = RootHalting::Siblings;
    }
    if args.archive {
        config.archive_reports = true;
    }
    Ok(config)
}
