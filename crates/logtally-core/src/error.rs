/// Error types for LogTally.
///
/// Each layer owns its own enum so a caller can tell a fatal store fault from
/// a configuration problem that is reported before any crawling starts.
/// Transient listing failures and per-line mining failures are recovered
/// inside the scanner and never surface here except as [`MiningError`]
/// values handed back by a miner.
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Top-level error for one agent run.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Durable store faults. Always fatal to the current run.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("Failed to open store '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A statement or transaction boundary failed. Carries the statement
    /// text and the store path so the failure can be reproduced.
    #[error("Statement failed on '{}': {statement}: {source}", path.display())]
    Statement {
        statement: String,
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Table names are interpolated into SQL and must be plain identifiers.
    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    /// Writing the CSV export failed.
    #[error("Failed to export from '{}': {source}", path.display())]
    Export { path: PathBuf, source: csv::Error },
}

/// Configuration faults detected before the crawl starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown miner '{0}'")]
    UnknownMiner(String),

    #[error("Invalid date window: start {start} is after stop {stop}")]
    InvalidWindow { start: NaiveDate, stop: NaiveDate },

    #[error("No root directories configured")]
    NoRoots,

    /// The monitor name doubles as its archive table name.
    #[error("Monitor name '{0}' cannot be used as an archive table name")]
    InvalidMonitorName(String),
}

/// A single log line that a miner could not interpret.
///
/// The scanner logs these and moves on to the next line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("line has {found} columns, expected at least {expected}")]
    TooFewColumns { found: usize, expected: usize },

    #[error("file header is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("no header has been read for the current file")]
    NoHeader,
}

/// Report delivery faults.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to serialise report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to archive report: {0}")]
    Archive(#[from] StoreError),
}
