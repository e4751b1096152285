/// Agent configuration.
///
/// Loaded from a JSON file; every field has a default so a partial file
/// (or none at all) is valid. The binary layers command-line overrides on
/// top before calling [`AgentConfig::validate`].
///
/// ```json
/// {
///   "roots": ["/srv/qlik/logs"],
///   "databasePath": "/var/lib/logtally/logtally.sqlite",
///   "miners": ["Session"],
///   "halting": "subtree"
/// }
/// ```
use crate::error::ConfigError;
use crate::miner::MinerKind;
use crate::model::DateWindow;
use crate::scanner::crawler::{DEFAULT_LISTING_RETRIES, DEFAULT_MARKER};
use crate::scanner::{CrawlOptions, RootHalting};
use crate::store::schema::{validate_table_name, MONTHLY_STATS_TABLE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MONITOR_NAME: &str = "LogFileParserMonitor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Names the monitor in report labels and its archive table.
    pub monitor_name: String,
    /// Directories to crawl for log roots.
    pub roots: Vec<PathBuf>,
    /// SQLite file for the monthly ledger. `None` disables bookkeeping.
    pub database_path: Option<PathBuf>,
    /// Miner names to run. Empty runs every miner.
    pub miners: Vec<String>,
    /// Relative path that marks a valid log root.
    pub marker: PathBuf,
    pub listing_retries: u32,
    pub halting: RootHalting,
    /// Inclusive first day of the window. Defaults to two days ago.
    pub start_date: Option<NaiveDate>,
    /// Inclusive last day of the window. Defaults to `start_date`.
    pub stop_date: Option<NaiveDate>,
    pub installation_id: Option<String>,
    pub license_serial_no: Option<String>,
    /// Also archive each report in the monitor table.
    pub archive_reports: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            monitor_name: DEFAULT_MONITOR_NAME.to_string(),
            roots: Vec::new(),
            database_path: None,
            miners: Vec::new(),
            marker: PathBuf::from(DEFAULT_MARKER),
            listing_retries: DEFAULT_LISTING_RETRIES,
            halting: RootHalting::Subtree,
            start_date: None,
            stop_date: None,
            installation_id: None,
            license_serial_no: None,
            archive_reports: false,
        }
    }
}

impl AgentConfig {
    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Check everything that can be checked before touching the filesystem.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ConfigError> {
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        if let Some(unknown) = self
            .miners
            .iter()
            .find(|name| MinerKind::from_name(name).is_none())
        {
            return Err(ConfigError::UnknownMiner(unknown.clone()));
        }
        if self.archive_reports {
            self.check_monitor_name()?;
        }
        self.date_window(today).map(|_| ())
    }

    /// The archive table is named after the monitor, so the name must be a
    /// plain identifier that no store table already uses.
    fn check_monitor_name(&self) -> Result<(), ConfigError> {
        let name = self.monitor_name.as_str();
        let reserved = name.eq_ignore_ascii_case(MONTHLY_STATS_TABLE)
            || name
                .get(..7)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite_"));
        if reserved || validate_table_name(name).is_err() {
            return Err(ConfigError::InvalidMonitorName(name.to_string()));
        }
        Ok(())
    }

    /// The window to scan when run on `today`.
    pub fn date_window(&self, today: NaiveDate) -> Result<DateWindow, ConfigError> {
        match (self.start_date, self.stop_date) {
            (None, None) => Ok(DateWindow::archived_day(today)),
            (start, stop) => {
                let start = start.or(stop).unwrap_or(today);
                let stop = stop.unwrap_or(start);
                if start > stop {
                    return Err(ConfigError::InvalidWindow { start, stop });
                }
                Ok(DateWindow::new(start, stop))
            }
        }
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            marker: self.marker.clone(),
            listing_retries: self.listing_retries,
            halting: self.halting,
        }
    }

    /// Installation id for the report: the configured one, else
    /// `<serial>_<first root>`.
    pub fn installation_id(&self) -> String {
        if let Some(id) = &self.installation_id {
            return id.clone();
        }
        let serial = self.license_serial_no.as_deref().unwrap_or("(unknown)");
        match self.roots.first() {
            Some(root) => format!("{serial}_{}", root.display()),
            None => serial.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = AgentConfig::from_json(r#"{ "roots": ["/logs"], "halting": "siblings" }"#).unwrap();
        assert_eq!(cfg.roots, vec![PathBuf::from("/logs")]);
        assert_eq!(cfg.halting, RootHalting::Siblings);
        assert_eq!(cfg.monitor_name, DEFAULT_MONITOR_NAME);
        assert_eq!(cfg.listing_retries, 10);
        assert!(cfg.database_path.is_none());
    }

    #[test]
    fn dates_parse_from_iso_strings() {
        let cfg =
            AgentConfig::from_json(r#"{ "startDate": "2024-05-01", "stopDate": "2024-05-03" }"#)
                .unwrap();
        let window = cfg.date_window(date(2024, 6, 1)).unwrap();
        assert_eq!(window.start().date_naive(), date(2024, 5, 1));
        assert_eq!(window.stop().date_naive(), date(2024, 5, 3));
    }

    #[test]
    fn missing_dates_use_the_archived_day() {
        let window = AgentConfig::default().date_window(date(2024, 6, 10)).unwrap();
        assert_eq!(window.start().date_naive(), date(2024, 6, 8));
        assert_eq!(window.stop().date_naive(), date(2024, 6, 8));
    }

    #[test]
    fn reversed_window_is_rejected() {
        let cfg = AgentConfig {
            start_date: Some(date(2024, 5, 3)),
            stop_date: Some(date(2024, 5, 1)),
            ..AgentConfig::default()
        };
        assert!(matches!(
            cfg.date_window(date(2024, 6, 1)),
            Err(ConfigError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn validate_requires_roots_and_known_miners() {
        let today = date(2024, 6, 1);
        assert!(matches!(
            AgentConfig::default().validate(today),
            Err(ConfigError::NoRoots)
        ));
        let cfg = AgentConfig {
            roots: vec![PathBuf::from("/logs")],
            miners: vec!["Session".into(), "Nope".into()],
            ..AgentConfig::default()
        };
        assert!(matches!(cfg.validate(today), Err(ConfigError::UnknownMiner(n)) if n == "Nope"));
    }

    #[test]
    fn archiving_rejects_unusable_monitor_names() {
        let today = date(2024, 6, 1);
        let with_name = |name: &str, archive_reports: bool| AgentConfig {
            roots: vec![PathBuf::from("/logs")],
            monitor_name: name.to_string(),
            archive_reports,
            ..AgentConfig::default()
        };

        for bad in ["My Monitor", "monthlystats", "MonthlyStats", "sqlite_master", ""] {
            assert!(
                matches!(
                    with_name(bad, true).validate(today),
                    Err(ConfigError::InvalidMonitorName(n)) if n == bad
                ),
                "{bad:?} should be rejected"
            );
        }
        assert!(with_name("LogFileParserMonitor", true).validate(today).is_ok());
        // Without archiving the name is only a label.
        assert!(with_name("My Monitor", false).validate(today).is_ok());
    }

    #[test]
    fn unparseable_file_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logtally.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AgentConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn installation_id_falls_back_to_serial_and_root() {
        let cfg = AgentConfig {
            roots: vec![PathBuf::from("/logs")],
            license_serial_no: Some("1234".into()),
            ..AgentConfig::default()
        };
        assert_eq!(cfg.installation_id(), "1234_/logs");
    }
}
