/// Reporting - the finished report document and the delivery boundary.
///
/// The core only builds a [`StatisticsReport`] and hands its JSON form to a
/// [`ReportEmitter`]. Where it ends up (log, archive table, a notifier) is
/// the emitter's business.
use crate::error::ReportError;
use crate::model::{DateWindow, Period, StatisticsAggregate};
use crate::store::MonitorTable;
use serde::Serialize;
use tracing::info;

/// Distinct ids recorded in the monthly ledger after this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTotals {
    pub period: Period,
    pub unique_users: u64,
    pub unique_apps: u64,
}

/// The document delivered at the end of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub installation_id: String,
    pub window: DateWindow,
    pub log_file_miner_data: StatisticsAggregate,
    pub monthly: Option<MonthlyTotals>,
}

impl StatisticsReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Label used when emitting a monitor's report.
pub fn report_label(monitor: &str) -> String {
    format!("{monitor} has analyzed the following system")
}

/// Downstream delivery of a finished report.
pub trait ReportEmitter {
    /// Deliver `payloads` (serialised documents) under an event `label`.
    fn emit(&mut self, label: &str, payloads: &[String]) -> Result<(), ReportError>;
}

/// Writes reports to the log.
#[derive(Debug, Default)]
pub struct LogEmitter;

impl ReportEmitter for LogEmitter {
    fn emit(&mut self, label: &str, payloads: &[String]) -> Result<(), ReportError> {
        info!("{label}");
        for payload in payloads {
            info!("{payload}");
        }
        Ok(())
    }
}

/// Archives each payload as a row in the monitor's table.
#[derive(Debug)]
pub struct MonitorTableEmitter {
    table: MonitorTable,
    monitor: String,
}

impl MonitorTableEmitter {
    pub fn new(table: MonitorTable, monitor: impl Into<String>) -> Self {
        Self {
            table,
            monitor: monitor.into(),
        }
    }
}

impl ReportEmitter for MonitorTableEmitter {
    fn emit(&mut self, label: &str, payloads: &[String]) -> Result<(), ReportError> {
        for payload in payloads {
            let id = self.table.save(&self.monitor, payload)?;
            info!("{label} (archived as {id})");
        }
        Ok(())
    }
}
