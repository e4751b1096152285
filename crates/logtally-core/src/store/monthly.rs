/// Monthly dedup ledger.
///
/// Records which entity ids have already been counted for a
/// (year, month, category) so repeated runs inside one period never count
/// the same user or app twice.
///
/// # State machine
///
/// ```text
/// NoTable --ensure_schema--> Empty --add_batch--> HasData(P)
///    ^                         ^                      |
///    |                         +------- reset --------+
/// ```
///
/// The caller compares [`MonthlyStatsStore::resident_period`] with the wall
/// clock and calls [`MonthlyStatsStore::reset`] when the period has moved on.
use crate::error::{StoreError, StoreResult};
use crate::model::{Category, Period};
use crate::store::schema::{self, MONTHLY_STATS_TABLE};
use crate::store::{open_connection, statement_error};
use chrono::Local;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Transaction};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Returned by [`MonthlyStatsStore::current_period`] when no period is resident.
pub const NO_PERIOD: i32 = -1;

const SELECT_RESIDENT_MONTH: &str = "SELECT month FROM MonthlyStats LIMIT 1";

#[derive(Debug)]
pub struct MonthlyStatsStore {
    path: PathBuf,
    /// Set once the table is known to exist; cleared by `reset`.
    schema_confirmed: bool,
}

impl MonthlyStatsStore {
    /// A store backed by the SQLite file at `path`. Nothing is opened until
    /// the first operation; the file is created on demand.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema_confirmed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the table if it does not exist. Cheap after the first call.
    pub fn ensure_schema(&mut self) -> StoreResult<()> {
        if self.schema_confirmed {
            return Ok(());
        }
        let conn = open_connection(&self.path)?;
        let exists = schema::table_exists(&conn, MONTHLY_STATS_TABLE)
            .map_err(|e| statement_error(schema::TABLE_EXISTS, &self.path, e))?;
        if !exists {
            conn.execute_batch(schema::CREATE_MONTHLY_STATS_TABLE)
                .map_err(|e| statement_error(schema::CREATE_MONTHLY_STATS_TABLE, &self.path, e))?;
            info!("Created {MONTHLY_STATS_TABLE} in {}", self.path.display());
        }
        self.schema_confirmed = true;
        Ok(())
    }

    /// Union-insert `ids` under (`period`, `category`) in one transaction.
    ///
    /// Ids already present for that key are skipped silently. Either every
    /// id is recorded or none is: a failure part-way rolls the whole batch
    /// back before the error is returned. Returns the number of rows that
    /// were new.
    pub fn add_batch<I, S>(&mut self, ids: I, period: Period, category: Category) -> StoreResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_schema()?;
        let mut conn = open_connection(&self.path)?;
        let tx = conn
            .transaction()
            .map_err(|e| statement_error("BEGIN TRANSACTION", &self.path, e))?;

        match insert_ids(&tx, ids, period, category) {
            Ok(inserted) => {
                tx.commit()
                    .map_err(|e| statement_error("COMMIT TRANSACTION", &self.path, e))?;
                debug!(
                    "Recorded {inserted} new {} ids for {period}",
                    category.label()
                );
                Ok(inserted)
            }
            Err(e) => {
                rollback(tx, &self.path);
                Err(statement_error(schema::INSERT_MONTHLY_STAT, &self.path, e))
            }
        }
    }

    /// All rows recorded for `category`, across every resident period.
    pub fn count_for_category(&mut self, category: Category) -> StoreResult<u64> {
        self.ensure_schema()?;
        let conn = open_connection(&self.path)?;
        conn.query_row(schema::COUNT_FOR_CATEGORY, [category.as_id()], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n.max(0) as u64)
        .map_err(|e| statement_error(schema::COUNT_FOR_CATEGORY, &self.path, e))
    }

    /// Rows recorded for `category` in `period` only.
    pub fn count_for_period(&mut self, category: Category, period: Period) -> StoreResult<u64> {
        self.ensure_schema()?;
        let conn = open_connection(&self.path)?;
        conn.query_row(
            schema::COUNT_FOR_PERIOD,
            params![category.as_id(), period.year, period.month],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n.max(0) as u64)
        .map_err(|e| statement_error(schema::COUNT_FOR_PERIOD, &self.path, e))
    }

    /// Month of the resident rows, or [`NO_PERIOD`] if the table is empty or
    /// the stored month cannot be read as a number.
    pub fn current_period(&mut self) -> StoreResult<i32> {
        self.ensure_schema()?;
        let conn = open_connection(&self.path)?;
        let month: Option<Value> = conn
            .query_row(SELECT_RESIDENT_MONTH, [], |row| row.get(0))
            .optional()
            .map_err(|e| statement_error(SELECT_RESIDENT_MONTH, &self.path, e))?;
        Ok(month
            .as_ref()
            .and_then(integer_value)
            .and_then(|m| i32::try_from(m).ok())
            .unwrap_or(NO_PERIOD))
    }

    /// Year and month of the resident rows, if any can be read.
    pub fn resident_period(&mut self) -> StoreResult<Option<Period>> {
        self.ensure_schema()?;
        let conn = open_connection(&self.path)?;
        let row: Option<(Value, Value)> = conn
            .query_row(schema::SELECT_RESIDENT_PERIOD, [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(|e| statement_error(schema::SELECT_RESIDENT_PERIOD, &self.path, e))?;

        Ok(row.and_then(|(year, month)| {
            let year = i32::try_from(integer_value(&year)?).ok()?;
            let month = u32::try_from(integer_value(&month)?).ok()?;
            (1..=12).contains(&month).then(|| Period::new(year, month))
        }))
    }

    /// Drop and recreate the table. Destructive; used at period rollover.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.schema_confirmed = false;
        {
            let conn = open_connection(&self.path)?;
            conn.execute_batch(schema::DROP_MONTHLY_STATS_TABLE)
                .map_err(|e| statement_error(schema::DROP_MONTHLY_STATS_TABLE, &self.path, e))?;
        }
        info!("Reset {MONTHLY_STATS_TABLE} in {}", self.path.display());
        self.ensure_schema()
    }

    /// Write every row not yet exported as CSV (`id,year,month,category`)
    /// and stamp those rows with the export time, in one transaction.
    ///
    /// The CSV is built in memory and only handed to `writer` once the stamp
    /// has committed, so a failed export leaves `writer` untouched and the
    /// rows still pending. Returns the number of rows written.
    pub fn export_csv<W: Write>(&mut self, mut writer: W) -> StoreResult<usize> {
        self.ensure_schema()?;
        let mut conn = open_connection(&self.path)?;
        let tx = conn
            .transaction()
            .map_err(|e| statement_error("BEGIN TRANSACTION", &self.path, e))?;

        let rows = match read_unexported(&tx) {
            Ok(rows) => rows,
            Err(e) => {
                rollback(tx, &self.path);
                return Err(statement_error(schema::SELECT_UNEXPORTED, &self.path, e));
            }
        };

        let mut buffer = Vec::new();
        if let Err(source) = write_csv(&mut buffer, &rows) {
            rollback(tx, &self.path);
            return Err(StoreError::Export {
                path: self.path.clone(),
                source,
            });
        }

        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        if let Err(e) = tx.execute(schema::MARK_EXPORTED, [stamp]) {
            rollback(tx, &self.path);
            return Err(statement_error(schema::MARK_EXPORTED, &self.path, e));
        }
        tx.commit()
            .map_err(|e| statement_error("COMMIT TRANSACTION", &self.path, e))?;

        writer
            .write_all(&buffer)
            .and_then(|()| writer.flush())
            .map_err(|e| StoreError::Export {
                path: self.path.clone(),
                source: csv::Error::from(e),
            })?;
        info!("Exported {} monthly rows", rows.len());
        Ok(rows.len())
    }
}

fn insert_ids<I, S>(
    tx: &Transaction<'_>,
    ids: I,
    period: Period,
    category: Category,
) -> rusqlite::Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stmt = tx.prepare(schema::INSERT_MONTHLY_STAT)?;
    let mut inserted = 0;
    for id in ids {
        inserted += stmt.execute(params![
            id.as_ref(),
            period.year,
            period.month,
            category.as_id()
        ])?;
    }
    Ok(inserted)
}

struct ExportRow {
    id: String,
    year: i64,
    month: i64,
    id_type: i64,
}

fn read_unexported(tx: &Transaction<'_>) -> rusqlite::Result<Vec<ExportRow>> {
    let mut stmt = tx.prepare(schema::SELECT_UNEXPORTED)?;
    let rows = stmt.query_map([], |row| {
        Ok(ExportRow {
            id: row.get(0)?,
            year: row.get(1)?,
            month: row.get(2)?,
            id_type: row.get(3)?,
        })
    })?;
    let collected = rows.collect::<rusqlite::Result<Vec<_>>>();
    collected
}

fn write_csv<W: Write>(writer: W, rows: &[ExportRow]) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["id", "year", "month", "category"])?;
    for row in rows {
        let category = Category::from_id(row.id_type)
            .map(Category::label)
            .unwrap_or("unknown");
        csv.write_record([
            row.id.as_str(),
            &row.year.to_string(),
            &row.month.to_string(),
            category,
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Roll back explicitly. A failed rollback is only logged; the caller returns
/// the error that caused it.
fn rollback(tx: Transaction<'_>, path: &Path) {
    if let Err(e) = tx.rollback() {
        warn!("Rollback failed on {}: {e}", path.display());
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn store() -> (TempDir, MonthlyStatsStore) {
        let tmp = TempDir::new().unwrap();
        let store = MonthlyStatsStore::new(tmp.path().join("logtally.sqlite"));
        (tmp, store)
    }

    fn may() -> Period {
        Period::new(2024, 5)
    }

    #[test]
    fn union_insert_keeps_one_row_per_id() {
        let (_tmp, mut store) = store();
        assert_eq!(store.add_batch(["u1", "u2"], may(), Category::User).unwrap(), 2);
        assert_eq!(store.add_batch(["u1", "u3"], may(), Category::User).unwrap(), 1);

        assert_eq!(store.count_for_category(Category::User).unwrap(), 3);
        assert_eq!(store.count_for_period(Category::User, may()).unwrap(), 3);
        assert_eq!(
            store
                .count_for_period(Category::User, Period::new(2024, 6))
                .unwrap(),
            0
        );
        assert_eq!(store.count_for_category(Category::App).unwrap(), 0);
    }

    #[test]
    fn duplicate_ids_inside_one_batch_are_ignored() {
        let (_tmp, mut store) = store();
        let inserted = store
            .add_batch(vec!["a".to_string(), "a".to_string()], may(), Category::App)
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn reset_empties_the_table() {
        let (_tmp, mut store) = store();
        store.add_batch(["u1", "u2"], may(), Category::User).unwrap();
        store.reset().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.count_for_category(Category::User).unwrap(), 0);
    }

    #[test]
    fn empty_table_reports_no_period() {
        let (_tmp, mut store) = store();
        assert_eq!(store.current_period().unwrap(), NO_PERIOD);
        assert_eq!(store.resident_period().unwrap(), None);
    }

    #[test]
    fn resident_period_reflects_inserted_rows() {
        let (_tmp, mut store) = store();
        store.add_batch(["u1"], may(), Category::User).unwrap();
        assert_eq!(store.current_period().unwrap(), 5);
        assert_eq!(store.resident_period().unwrap(), Some(may()));
    }

    #[test]
    fn unparseable_month_reports_no_period() {
        let (_tmp, mut store) = store();
        store.ensure_schema().unwrap();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO MonthlyStats (id, year, month, idType) VALUES ('x', 2024, 'may', 1)",
            [],
        )
        .unwrap();
        assert_eq!(store.current_period().unwrap(), NO_PERIOD);
        assert_eq!(store.resident_period().unwrap(), None);
    }

    /// A failure part-way through a batch must leave none of its rows behind.
    #[test]
    fn failed_batch_is_rolled_back() {
        let (_tmp, mut store) = store();
        store.ensure_schema().unwrap();
        {
            let conn = Connection::open(store.path()).unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON MonthlyStats \
                 WHEN NEW.id = 'poison' BEGIN SELECT RAISE(ABORT, 'poisoned id'); END;",
            )
            .unwrap();
        }

        let err = store
            .add_batch(["good-1", "good-2", "poison"], may(), Category::User)
            .unwrap_err();
        match err {
            StoreError::Statement { statement, .. } => {
                assert_eq!(statement, schema::INSERT_MONTHLY_STAT)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count_for_category(Category::User).unwrap(), 0);
    }

    /// `reset` must clear the schema cache, otherwise a table dropped behind
    /// the store's back would never be recreated.
    #[test]
    fn reset_recreates_a_table_dropped_externally() {
        let (_tmp, mut store) = store();
        store.ensure_schema().unwrap();
        Connection::open(store.path())
            .unwrap()
            .execute_batch("DROP TABLE MonthlyStats")
            .unwrap();

        // Cached: the missing table surfaces as a store fault.
        assert!(store.add_batch(["u1"], may(), Category::User).is_err());

        store.reset().unwrap();
        assert_eq!(store.add_batch(["u1"], may(), Category::User).unwrap(), 1);
    }

    #[test]
    fn export_writes_each_row_once() {
        let (_tmp, mut store) = store();
        store.add_batch(["u2", "u1"], may(), Category::User).unwrap();
        store.add_batch(["app-1"], may(), Category::App).unwrap();

        let mut out = Vec::new();
        assert_eq!(store.export_csv(&mut out).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "id,year,month,category",
                "u1,2024,5,user",
                "u2,2024,5,user",
                "app-1,2024,5,app",
            ]
        );

        let mut again = Vec::new();
        assert_eq!(store.export_csv(&mut again).unwrap(), 0);
    }

    /// A failed stamp must leave the caller's output empty and the rows
    /// pending for the next export.
    #[test]
    fn failed_stamp_writes_nothing() {
        let (_tmp, mut store) = store();
        store.add_batch(["u1"], may(), Category::User).unwrap();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_stamp BEFORE UPDATE ON MonthlyStats \
             BEGIN SELECT RAISE(ABORT, 'read only'); END;",
        )
        .unwrap();

        let mut out = Vec::new();
        match store.export_csv(&mut out).unwrap_err() {
            StoreError::Statement { statement, .. } => {
                assert_eq!(statement, schema::MARK_EXPORTED)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(out.is_empty());

        conn.execute_batch("DROP TRIGGER reject_stamp").unwrap();
        let mut retry = Vec::new();
        assert_eq!(store.export_csv(&mut retry).unwrap(), 1);
        assert!(String::from_utf8(retry).unwrap().contains("u1,2024,5,user"));
    }

    #[test]
    fn missing_directory_is_an_open_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = MonthlyStatsStore::new(tmp.path().join("missing").join("db.sqlite"));
        assert!(matches!(
            store.ensure_schema(),
            Err(StoreError::Open { .. })
        ));
    }
}
