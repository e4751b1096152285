/// Run-scoped statistics aggregate.
///
/// Exactly one aggregate exists per pass. Miners add ids through
/// [`StatisticsAggregate::record_active_user`] and
/// [`StatisticsAggregate::record_active_app`]; the id sets themselves are
/// private so no miner can remove or rewrite another miner's entries.
/// [`StatisticsAggregate::finalize`] runs once after the crawl and fills the
/// derived totals that are serialised into the report.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsAggregate {
    /// When this aggregate was created.
    pub collection_date_utc: DateTime<Utc>,

    /// License serial of the scanned installation, supplied upstream.
    pub license_serial_no: Option<String>,

    #[serde(skip)]
    active_users: BTreeSet<String>,

    #[serde(skip)]
    active_apps: BTreeSet<String>,

    pub total_unique_active_users: u64,
    pub total_unique_active_apps: u64,

    /// Log files handed to a miner.
    pub total_nr_of_files: u64,

    /// Log locations scanned by a miner.
    pub total_nr_of_directories: u64,

    /// Wall-clock crawl time, whole seconds.
    pub total_scan_time_taken_sec: u64,
}

impl Default for StatisticsAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsAggregate {
    pub fn new() -> Self {
        Self {
            collection_date_utc: Utc::now(),
            license_serial_no: None,
            active_users: BTreeSet::new(),
            active_apps: BTreeSet::new(),
            total_unique_active_users: 0,
            total_unique_active_apps: 0,
            total_nr_of_files: 0,
            total_nr_of_directories: 0,
            total_scan_time_taken_sec: 0,
        }
    }

    /// Record a user as active. Blank ids are ignored.
    ///
    /// Returns `true` if the user was not seen before in this pass.
    pub fn record_active_user(&mut self, id: &str) -> bool {
        insert_trimmed(&mut self.active_users, id)
    }

    /// Record an app as active. Blank ids are ignored.
    pub fn record_active_app(&mut self, id: &str) -> bool {
        insert_trimmed(&mut self.active_apps, id)
    }

    /// Unique active user ids, sorted.
    pub fn active_users(&self) -> &BTreeSet<String> {
        &self.active_users
    }

    /// Unique active app ids, sorted.
    pub fn active_apps(&self) -> &BTreeSet<String> {
        &self.active_apps
    }

    /// Compute derived totals from the accumulated sets and copy the crawl
    /// counters. Called once, after every miner has finalised.
    pub fn finalize(&mut self, files: u64, directories: u64, elapsed: Duration) {
        self.total_unique_active_users = self.active_users.len() as u64;
        self.total_unique_active_apps = self.active_apps.len() as u64;
        self.total_nr_of_files = files;
        self.total_nr_of_directories = directories;
        self.total_scan_time_taken_sec = elapsed.as_secs();
    }
}

fn insert_trimmed(set: &mut BTreeSet<String>, id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() || set.contains(id) {
        return false;
    }
    set.insert(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_are_counted_once() {
        let mut stats = StatisticsAggregate::new();
        assert!(stats.record_active_user("DOMAIN\\alice"));
        assert!(!stats.record_active_user("DOMAIN\\alice"));
        assert!(stats.record_active_user("DOMAIN\\bob"));
        stats.finalize(0, 0, Duration::ZERO);
        assert_eq!(stats.total_unique_active_users, 2);
    }

    #[test]
    fn blank_ids_are_ignored() {
        let mut stats = StatisticsAggregate::new();
        assert!(!stats.record_active_app(""));
        assert!(!stats.record_active_app("   "));
        assert!(stats.active_apps().is_empty());
    }

    /// Elapsed time is reported in whole seconds, not the seconds component
    /// of a minute, so a 75 s crawl reports 75.
    #[test]
    fn finalize_copies_counters_and_total_seconds() {
        let mut stats = StatisticsAggregate::new();
        stats.record_active_app("app-1");
        stats.finalize(12, 3, Duration::from_millis(75_900));
        assert_eq!(stats.total_unique_active_apps, 1);
        assert_eq!(stats.total_nr_of_files, 12);
        assert_eq!(stats.total_nr_of_directories, 3);
        assert_eq!(stats.total_scan_time_taken_sec, 75);
    }

    #[test]
    fn id_sets_are_not_serialised() {
        let mut stats = StatisticsAggregate::new();
        stats.record_active_user("DOMAIN\\alice");
        stats.finalize(1, 1, Duration::ZERO);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"totalUniqueActiveUsers\":1"));
        assert!(!json.contains("alice"));
    }
}
