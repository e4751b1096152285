/// Session miner - distinct active users and apps from engine session logs.
///
/// Session logs live under `<root>/Engine/Trace` and have one line per
/// closed session. The header names the columns; the ones used here are
/// `ActiveUserDirectory`, `ActiveUserId` and `AppId` (older releases only
/// write `AppTitle`).
use super::columns::{split_fields, TabHeader};
use super::{existing_location, is_internal_user, Miner};
use crate::error::MiningError;
use crate::model::StatisticsAggregate;
use crate::platform::FileSystem;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct SessionColumns {
    user_directory: usize,
    user_id: usize,
    app: Option<usize>,
    /// Fields a data line needs so every index above is in range.
    width: usize,
}

#[derive(Debug, Default)]
pub struct SessionMiner {
    columns: Option<SessionColumns>,
    missing: Option<&'static str>,
    files: u64,
    lines: u64,
}

impl SessionMiner {
    pub const NAME: &'static str = "Session";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Miner for SessionMiner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_location(&self, root: &Path, fs: &dyn FileSystem) -> Option<PathBuf> {
        existing_location(root, &["Engine", "Trace"], fs)
    }

    fn init_file(&mut self, header: &str, _stats: &mut StatisticsAggregate, location: &Path) {
        self.files += 1;
        self.columns = None;
        self.missing = None;

        let header = TabHeader::parse(header);
        let user_directory = header.index_of("ActiveUserDirectory");
        let user_id = header.index_of("ActiveUserId");
        let app = header.first_of(&["AppId", "AppTitle"]);

        match (user_directory, user_id) {
            (Some(user_directory), Some(user_id)) => {
                let width = [Some(user_directory), Some(user_id), app]
                    .into_iter()
                    .flatten()
                    .max()
                    .unwrap_or(0)
                    + 1;
                self.columns = Some(SessionColumns {
                    user_directory,
                    user_id,
                    app,
                    width,
                });
            }
            (None, _) => self.missing = Some("ActiveUserDirectory"),
            (_, None) => self.missing = Some("ActiveUserId"),
        }

        if let Some(column) = self.missing {
            warn!(
                "Session log under {} has no '{column}' column; its lines will be skipped",
                location.display()
            );
        }
    }

    fn mine(&mut self, line: &str, stats: &mut StatisticsAggregate) -> Result<(), MiningError> {
        let columns = match (self.columns, self.missing) {
            (Some(c), _) => c,
            (None, Some(column)) => return Err(MiningError::MissingColumn(column)),
            (None, None) => return Err(MiningError::NoHeader),
        };
        if line.trim().is_empty() {
            return Ok(());
        }

        let fields = split_fields(line);
        if fields.len() < columns.width {
            return Err(MiningError::TooFewColumns {
                found: fields.len(),
                expected: columns.width,
            });
        }
        self.lines += 1;

        let directory = fields[columns.user_directory];
        let user_id = fields[columns.user_id];
        if !user_id.is_empty() && !is_internal_user(directory, user_id) {
            stats.record_active_user(&format!("{directory}\\{user_id}"));
        }
        if let Some(app) = columns.app {
            stats.record_active_app(fields[app]);
        }
        Ok(())
    }

    fn finalize(&mut self, _stats: &mut StatisticsAggregate) {
        debug!(
            "{} miner finished: {} files, {} session lines",
            Self::NAME,
            self.files,
            self.lines
        );
        self.columns = None;
        self.missing = None;
    }
}
