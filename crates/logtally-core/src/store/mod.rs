/// Durable store - SQLite bookkeeping that survives between runs.
///
/// Two tables live in the same database file:
///
/// - `MonthlyStats` - the dedup ledger behind [`MonthlyStatsStore`]. One row
///   per (id, year, month, idType); re-inserting a key is a no-op.
/// - one table per monitor - opaque payload archive behind [`MonitorTable`].
///
/// Every operation opens its own connection and drops it before returning,
/// on success and on error alike. Writers are serialised by SQLite's own
/// transaction locking; concurrent agent runs against one file are not
/// supported.
pub mod monitor_table;
pub mod monthly;
pub mod schema;

pub use monitor_table::MonitorTable;
pub use monthly::MonthlyStatsStore;

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::path::Path;
use tracing::error;

/// Open (creating if missing) the database at `path`.
pub(crate) fn open_connection(path: &Path) -> StoreResult<Connection> {
    Connection::open(path).map_err(|source| {
        error!("Failed to open store {}: {source}", path.display());
        StoreError::Open {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Log a failed statement with its store target and wrap it.
pub(crate) fn statement_error(statement: &str, path: &Path, source: rusqlite::Error) -> StoreError {
    error!(
        "Statement failed on {}: {statement}: {source}",
        path.display()
    );
    StoreError::Statement {
        statement: statement.to_string(),
        path: path.to_path_buf(),
        source,
    }
}
