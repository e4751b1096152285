/// Generic per-monitor payload table.
///
/// Each monitor gets its own table `(id, created, exportedDate, data)` in the
/// shared database. Rows are opaque: the agent archives its serialised
/// report here so a later export step can ship it. Not part of the dedup
/// engine.
use crate::error::StoreResult;
use crate::store::schema::{self, validate_table_name};
use crate::store::{open_connection, statement_error};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MonitorTable {
    path: PathBuf,
}

impl MonitorTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the table for `monitor` if it is absent.
    pub fn ensure(&self, monitor: &str) -> StoreResult<()> {
        validate_table_name(monitor)?;
        let conn = open_connection(&self.path)?;
        let exists = schema::table_exists(&conn, monitor)
            .map_err(|e| statement_error(schema::TABLE_EXISTS, &self.path, e))?;
        if !exists {
            let sql = schema::create_monitor_table_sql(monitor);
            conn.execute_batch(&sql)
                .map_err(|e| statement_error(&sql, &self.path, e))?;
            info!("Created monitor table {monitor} in {}", self.path.display());
        }
        Ok(())
    }

    /// Store `data` as a new row. Returns the generated row id.
    pub fn save(&self, monitor: &str, data: &str) -> StoreResult<String> {
        self.ensure(monitor)?;
        let conn = open_connection(&self.path)?;
        let id = Uuid::new_v4().to_string();
        let created = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let sql = schema::insert_monitor_row_sql(monitor);
        conn.execute(&sql, [id.as_str(), created.as_str(), data])
            .map_err(|e| statement_error(&sql, &self.path, e))?;
        debug!("Saved {} bytes to {monitor} as {id}", data.len());
        Ok(id)
    }

    /// Number of payloads stored for `monitor`.
    pub fn count(&self, monitor: &str) -> StoreResult<u64> {
        self.ensure(monitor)?;
        let conn = open_connection(&self.path)?;
        let sql = schema::count_monitor_rows_sql(monitor);
        conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n.max(0) as u64)
            .map_err(|e| statement_error(&sql, &self.path, e))
    }
}
