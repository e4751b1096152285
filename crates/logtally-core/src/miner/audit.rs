/// Audit-activity miner - distinct active users from proxy audit logs.
///
/// Proxy audit logs live under `<root>/Proxy/Trace` and record every
/// authenticated request. Only `UserDirectory` and `UserId` are used.
use super::columns::{split_fields, TabHeader};
use super::{existing_location, is_internal_user, Miner};
use crate::error::MiningError;
use crate::model::StatisticsAggregate;
use crate::platform::FileSystem;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default)]
pub struct AuditActivityMiner {
    /// (directory column, user column) of the current file.
    columns: Option<(usize, usize)>,
    header_read: bool,
    files: u64,
    lines: u64,
}

impl AuditActivityMiner {
    pub const NAME: &'static str = "AuditActivity";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Miner for AuditActivityMiner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_location(&self, root: &Path, fs: &dyn FileSystem) -> Option<PathBuf> {
        existing_location(root, &["Proxy", "Trace"], fs)
    }

    fn init_file(&mut self, header: &str, _stats: &mut StatisticsAggregate, _location: &Path) {
        self.files += 1;
        self.header_read = true;
        let header = TabHeader::parse(header);
        self.columns = header
            .index_of("UserDirectory")
            .zip(header.index_of("UserId"));
    }

    fn mine(&mut self, line: &str, stats: &mut StatisticsAggregate) -> Result<(), MiningError> {
        if !self.header_read {
            return Err(MiningError::NoHeader);
        }
        let Some((dir_col, user_col)) = self.columns else {
            return Err(MiningError::MissingColumn("UserId"));
        };
        if line.trim().is_empty() {
            return Ok(());
        }

        let fields = split_fields(line);
        let expected = dir_col.max(user_col) + 1;
        if fields.len() < expected {
            return Err(MiningError::TooFewColumns {
                found: fields.len(),
                expected,
            });
        }
        self.lines += 1;

        let (directory, user_id) = (fields[dir_col], fields[user_col]);
        if !user_id.is_empty() && !is_internal_user(directory, user_id) {
            stats.record_active_user(&format!("{directory}\\{user_id}"));
        }
        Ok(())
    }

    fn finalize(&mut self, _stats: &mut StatisticsAggregate) {
        debug!(
            "{} miner finished: {} files, {} audit lines",
            Self::NAME,
            self.files,
            self.lines
        );
        self.columns = None;
        self.header_read = false;
    }
}
