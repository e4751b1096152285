/// One complete agent run: crawl, book the month, report.
///
/// The [`Agent`] owns the configuration and (optionally) the monthly ledger.
/// Each [`Agent::run_once`] builds a fresh set of miners and a fresh
/// [`StatisticsAggregate`], so runs never share mutable state.
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::miner::build_miners;
use crate::model::{Category, Period, StatisticsAggregate};
use crate::platform::FileSystem;
use crate::report::{report_label, MonthlyTotals, ReportEmitter, StatisticsReport};
use crate::scanner::{run_pass, ScanProgress};
use crate::store::MonthlyStatsStore;
use chrono::NaiveDate;
use crossbeam_channel::Sender;
use tracing::{info, warn};

pub struct Agent<'a> {
    config: AgentConfig,
    fs: &'a dyn FileSystem,
    store: Option<MonthlyStatsStore>,
    progress_tx: Option<Sender<ScanProgress>>,
}

impl<'a> Agent<'a> {
    /// Build an agent. The monthly ledger is opened lazily at
    /// `config.database_path`, if set.
    pub fn new(config: AgentConfig, fs: &'a dyn FileSystem) -> Self {
        let store = config.database_path.clone().map(MonthlyStatsStore::new);
        Self {
            config,
            fs,
            store,
            progress_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: Sender<ScanProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn store(&mut self) -> Option<&mut MonthlyStatsStore> {
        self.store.as_mut()
    }

    /// Run one pass as of `today` and hand the report to `emitter`.
    ///
    /// Configuration and store faults abort the run before anything is
    /// emitted. Missing roots do not: they produce an empty aggregate.
    pub fn run_once(
        &mut self,
        emitter: &mut dyn ReportEmitter,
        today: NaiveDate,
    ) -> Result<StatisticsReport, AgentError> {
        self.config.validate(today)?;
        let window = self.config.date_window(today)?;
        let mut miners = build_miners(&self.config.miners)?;

        let present = self
            .config
            .roots
            .iter()
            .filter(|root| self.fs.exists(root))
            .count();
        if present == 0 {
            warn!(
                "None of the {} configured roots exist; reporting an empty aggregate",
                self.config.roots.len()
            );
        }

        let mut stats = StatisticsAggregate::new();
        stats.license_serial_no = self.config.license_serial_no.clone();

        let summary = run_pass(
            self.fs,
            self.config.crawl_options(),
            &self.config.roots,
            &window,
            &mut miners,
            &mut stats,
            self.progress_tx.clone(),
        );
        if summary.listings_abandoned > 0 {
            warn!(
                "{} directory listings were abandoned during the pass",
                summary.listings_abandoned
            );
        }

        let monthly = match self.store.as_mut() {
            Some(store) => Some(book_month(store, &stats, Period::from_date(today))?),
            None => None,
        };

        let report = StatisticsReport {
            installation_id: self.config.installation_id(),
            window,
            log_file_miner_data: stats,
            monthly,
        };
        let json = report.to_json()?;
        emitter.emit(&report_label(&self.config.monitor_name), &[json])?;
        Ok(report)
    }
}

/// Roll the ledger over if it holds another month, then add this run's ids.
fn book_month(
    store: &mut MonthlyStatsStore,
    stats: &StatisticsAggregate,
    period: Period,
) -> Result<MonthlyTotals, AgentError> {
    match store.resident_period()? {
        Some(resident) if resident != period => {
            info!("Monthly ledger holds {resident}, current period is {period}; resetting");
            store.reset()?;
        }
        _ => {}
    }

    let users = store.add_batch(stats.active_users(), period, Category::User)?;
    let apps = store.add_batch(stats.active_apps(), period, Category::App)?;
    info!("Booked {users} new users and {apps} new apps for {period}");

    Ok(MonthlyTotals {
        period,
        unique_users: store.count_for_period(Category::User, period)?,
        unique_apps: store.count_for_period(Category::App, period)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::platform::LocalFileSystem;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Keeps every emitted payload.
    #[derive(Default)]
    struct Captured {
        labels: Vec<String>,
        payloads: Vec<String>,
    }

    impl ReportEmitter for Captured {
        fn emit(&mut self, label: &str, payloads: &[String]) -> Result<(), ReportError> {
            self.labels.push(label.to_string());
            self.payloads.extend_from_slice(payloads);
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_roots_still_produce_a_report() {
        let tmp = TempDir::new().unwrap();
        let config = AgentConfig {
            roots: vec![tmp.path().join("absent")],
            installation_id: Some("node-1".into()),
            ..AgentConfig::default()
        };
        let fs = LocalFileSystem;
        let mut agent = Agent::new(config, &fs);
        let mut emitter = Captured::default();

        let report = agent.run_once(&mut emitter, date(2024, 5, 10)).unwrap();

        assert_eq!(report.log_file_miner_data.total_nr_of_files, 0);
        assert!(report.monthly.is_none());
        assert_eq!(
            emitter.labels,
            vec!["LogFileParserMonitor has analyzed the following system"]
        );
        assert!(emitter.payloads[0].contains("\"installationId\": \"node-1\""));
    }

    #[test]
    fn progress_from_the_pass_reaches_the_listener() {
        let tmp = TempDir::new().unwrap();
        let config = AgentConfig {
            roots: vec![tmp.path().join("absent")],
            ..AgentConfig::default()
        };
        let fs = LocalFileSystem;
        let (tx, rx) = crossbeam_channel::bounded(crate::scanner::PROGRESS_CHANNEL_CAPACITY);
        let mut agent = Agent::new(config, &fs).with_progress(tx);
        agent
            .run_once(&mut Captured::default(), date(2024, 5, 10))
            .unwrap();
        drop(agent);

        let messages: Vec<ScanProgress> = rx.iter().collect();
        assert!(matches!(messages.first(), Some(ScanProgress::Error { .. })));
        assert!(matches!(messages.last(), Some(ScanProgress::Complete { .. })));
    }

    #[test]
    fn unknown_miner_aborts_before_emitting() {
        let config = AgentConfig {
            roots: vec![PathBuf::from("/nowhere")],
            miners: vec!["Bogus".into()],
            ..AgentConfig::default()
        };
        let fs = LocalFileSystem;
        let mut agent = Agent::new(config, &fs);
        let mut emitter = Captured::default();

        let err = agent.run_once(&mut emitter, date(2024, 5, 10)).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(emitter.payloads.is_empty());
    }

    #[test]
    fn bad_archive_name_fails_before_the_ledger_is_touched() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("logtally.sqlite");
        let config = AgentConfig {
            roots: vec![tmp.path().join("absent")],
            database_path: Some(db.clone()),
            monitor_name: "My Monitor".into(),
            archive_reports: true,
            ..AgentConfig::default()
        };
        let fs = LocalFileSystem;
        let mut agent = Agent::new(config, &fs);
        let mut emitter = Captured::default();

        let err = agent.run_once(&mut emitter, date(2024, 5, 10)).unwrap_err();
        assert!(matches!(
            err,
            AgentError::Config(crate::error::ConfigError::InvalidMonitorName(_))
        ));
        assert!(emitter.payloads.is_empty());
        assert!(!db.exists());
    }

    #[test]
    fn stale_ledger_is_reset_on_a_new_month() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("logtally.sqlite");
        let mut store = MonthlyStatsStore::new(&db);
        store
            .add_batch(["CORP\\old"], Period::new(2024, 4), Category::User)
            .unwrap();

        let config = AgentConfig {
            roots: vec![tmp.path().join("absent")],
            database_path: Some(db.clone()),
            ..AgentConfig::default()
        };
        let fs = LocalFileSystem;
        let mut agent = Agent::new(config, &fs);
        let report = agent
            .run_once(&mut Captured::default(), date(2024, 5, 2))
            .unwrap();

        let monthly = report.monthly.unwrap();
        assert_eq!(monthly.period, Period::new(2024, 5));
        assert_eq!(monthly.unique_users, 0);
        let store = agent.store().unwrap();
        assert_eq!(store.count_for_category(Category::User).unwrap(), 0);
    }
}
