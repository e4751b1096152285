/// Date window used to select log files by modification time.
///
/// Both ends are inclusive. The stop instant is the last millisecond of the
/// stop date (`23:59:59.999` local time), so a window built from a single
/// date covers that whole calendar day and nothing of the next.
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    start: DateTime<Local>,
    stop: DateTime<Local>,
    /// `start` and `stop` as raw instants. Mtimes are compared against these
    /// so an out-of-range mtime never goes through a calendar conversion.
    #[serde(skip)]
    start_at: SystemTime,
    #[serde(skip)]
    stop_at: SystemTime,
}

impl DateWindow {
    /// Window from `start_date` 00:00:00.000 to `stop_date` 23:59:59.999.
    pub fn new(start_date: NaiveDate, stop_date: NaiveDate) -> Self {
        let start = start_date.and_time(NaiveTime::MIN);
        let stop = stop_date.and_time(NaiveTime::MIN) + Duration::days(1)
            - Duration::milliseconds(1);
        let (start, stop) = (local_earliest(start), local_latest(stop));
        Self {
            start,
            stop,
            start_at: start.into(),
            stop_at: stop.into(),
        }
    }

    /// The default run window: the whole day two days before `today`.
    ///
    /// By then the product has rolled and archived that day's logs, so the
    /// files are no longer being appended to.
    pub fn archived_day(today: NaiveDate) -> Self {
        let day = today - Duration::days(2);
        Self::new(day, day)
    }

    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    pub fn stop(&self) -> DateTime<Local> {
        self.stop
    }

    /// `true` when `instant` lies inside the window, ends included.
    pub fn contains(&self, instant: SystemTime) -> bool {
        instant >= self.start_at && instant <= self.stop_at
    }
}

/// Resolve a naive local time, taking the earlier instant on a DST overlap
/// and treating a DST gap as UTC.
fn local_earliest(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

fn local_latest(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .latest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, ms: u32) -> SystemTime {
        let naive = date(y, m, d).and_hms_milli_opt(h, min, s, ms).unwrap();
        local_earliest(naive).into()
    }

    /// The last millisecond of the stop date is inside the window.
    #[test]
    fn stop_instant_is_inclusive() {
        let window = DateWindow::new(date(2024, 5, 1), date(2024, 5, 1));
        assert!(window.contains(local(2024, 5, 1, 23, 59, 59, 999)));
    }

    /// One millisecond after the stop instant is outside the window.
    #[test]
    fn one_millisecond_after_stop_is_excluded() {
        let window = DateWindow::new(date(2024, 5, 1), date(2024, 5, 1));
        let after = local(2024, 5, 1, 23, 59, 59, 999) + std::time::Duration::from_millis(1);
        assert!(!window.contains(after));
    }

    #[test]
    fn start_instant_is_inclusive() {
        let window = DateWindow::new(date(2024, 5, 1), date(2024, 5, 3));
        assert!(window.contains(local(2024, 5, 1, 0, 0, 0, 0)));
        assert!(!window.contains(
            local(2024, 5, 1, 0, 0, 0, 0) - std::time::Duration::from_millis(1)
        ));
    }

    /// Mtimes far outside the calendar range are simply outside the window.
    #[test]
    fn extreme_mtimes_are_excluded_without_panicking() {
        let window = DateWindow::new(date(2024, 5, 1), date(2024, 5, 1));
        let far_future = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(9_000_000_000_000);
        assert!(!window.contains(far_future));
        assert!(!window.contains(SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn archived_day_covers_two_days_ago() {
        let window = DateWindow::archived_day(date(2024, 3, 2));
        assert_eq!(window.start().date_naive(), date(2024, 2, 29));
        assert_eq!(window.stop().date_naive(), date(2024, 2, 29));
        assert!(window.contains(local(2024, 2, 29, 12, 0, 0, 0)));
        assert!(!window.contains(local(2024, 3, 1, 0, 0, 0, 0)));
    }
}
