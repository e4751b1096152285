/// Miners - pluggable per-category extraction from log files.
///
/// Every miner implements the [`Miner`] contract. The crawler drives it:
///
/// 1. [`Miner::resolve_location`] once per recognised log root.
/// 2. [`Miner::init_file`] with the first line of each matching file.
/// 3. [`Miner::mine`] for every following line, in order.
/// 4. [`Miner::finalize`] once after the whole pass.
///
/// The set of variants is closed ([`MinerKind`]) and selected by name from
/// configuration, so there is no runtime discovery.
pub mod audit;
pub mod columns;
pub mod session;

pub use audit::AuditActivityMiner;
pub use session::SessionMiner;

use crate::error::{ConfigError, MiningError};
use crate::model::StatisticsAggregate;
use crate::platform::FileSystem;
use std::path::{Path, PathBuf};

/// Extraction logic for one log category.
pub trait Miner {
    /// Stable tag used for file-name matching and diagnostics.
    fn name(&self) -> &str;

    /// Where under `root` this miner reads logs. `None` = not applicable.
    fn resolve_location(&self, root: &Path, fs: &dyn FileSystem) -> Option<PathBuf>;

    /// Called with the header line of each matching file, before any data
    /// line. Resets per-file state.
    fn init_file(&mut self, header: &str, stats: &mut StatisticsAggregate, location: &Path);

    /// Called with each data line of the current file.
    fn mine(&mut self, line: &str, stats: &mut StatisticsAggregate) -> Result<(), MiningError>;

    /// Called once after the entire pass.
    fn finalize(&mut self, stats: &mut StatisticsAggregate);
}

/// The closed set of miner variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerKind {
    Session,
    AuditActivity,
}

impl MinerKind {
    /// Every variant, in the order they run by default.
    pub fn all() -> &'static [MinerKind] {
        &[MinerKind::Session, MinerKind::AuditActivity]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Session => SessionMiner::NAME,
            Self::AuditActivity => AuditActivityMiner::NAME,
        }
    }

    /// Case-insensitive lookup by miner name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn build(self) -> Box<dyn Miner> {
        match self {
            Self::Session => Box::new(SessionMiner::new()),
            Self::AuditActivity => Box::new(AuditActivityMiner::new()),
        }
    }
}

/// Build the active miner list. An empty `names` list selects every variant.
pub fn build_miners(names: &[String]) -> Result<Vec<Box<dyn Miner>>, ConfigError> {
    if names.is_empty() {
        return Ok(MinerKind::all().iter().map(|kind| kind.build()).collect());
    }
    names
        .iter()
        .map(|name| {
            MinerKind::from_name(name)
                .map(MinerKind::build)
                .ok_or_else(|| ConfigError::UnknownMiner(name.clone()))
        })
        .collect()
}

/// Resolve `<root>/<first>/<second>` if it exists.
pub(crate) fn existing_location(
    root: &Path,
    relative: &[&str],
    fs: &dyn FileSystem,
) -> Option<PathBuf> {
    let location = relative.iter().fold(root.to_path_buf(), |p, part| p.join(part));
    fs.exists(&location).then_some(location)
}

/// Service accounts the product uses internally; not real user activity.
pub(crate) fn is_internal_user(directory: &str, user_id: &str) -> bool {
    directory.eq_ignore_ascii_case("INTERNAL")
        || user_id
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sa_"))
}
