/// Table definitions and schema checks.
use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};

/// Name of the monthly dedup table.
pub const MONTHLY_STATS_TABLE: &str = "MonthlyStats";

/// Composite key: the same id may appear once per period and category.
pub const CREATE_MONTHLY_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS MonthlyStats (
    id TEXT NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    idType INTEGER NOT NULL,
    exportedDate TEXT,
    PRIMARY KEY (id, year, month, idType)
)
"#;

pub const DROP_MONTHLY_STATS_TABLE: &str = "DROP TABLE IF EXISTS MonthlyStats";

pub const INSERT_MONTHLY_STAT: &str =
    "INSERT OR IGNORE INTO MonthlyStats (id, year, month, idType) VALUES (?1, ?2, ?3, ?4)";

pub const COUNT_FOR_CATEGORY: &str = "SELECT COUNT(*) FROM MonthlyStats WHERE idType = ?1";

pub const COUNT_FOR_PERIOD: &str =
    "SELECT COUNT(*) FROM MonthlyStats WHERE idType = ?1 AND year = ?2 AND month = ?3";

pub const SELECT_RESIDENT_PERIOD: &str = "SELECT year, month FROM MonthlyStats LIMIT 1";

pub const SELECT_UNEXPORTED: &str = "SELECT id, year, month, idType FROM MonthlyStats \
     WHERE exportedDate IS NULL ORDER BY year, month, idType, id";

pub const MARK_EXPORTED: &str =
    "UPDATE MonthlyStats SET exportedDate = ?1 WHERE exportedDate IS NULL";

pub const TABLE_EXISTS: &str =
    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// `CREATE TABLE` for a generic per-monitor payload table.
///
/// `name` must already have passed [`validate_table_name`].
pub fn create_monitor_table_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} \
         (id TEXT PRIMARY KEY, created TEXT NOT NULL, exportedDate TEXT, data TEXT)"
    )
}

pub fn insert_monitor_row_sql(name: &str) -> String {
    format!("INSERT INTO {name} (id, created, data) VALUES (?1, ?2, ?3)")
}

pub fn count_monitor_rows_sql(name: &str) -> String {
    format!("SELECT COUNT(*) FROM {name}")
}

/// `true` if a table called `name` exists.
pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(TABLE_EXISTS, [name], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}
