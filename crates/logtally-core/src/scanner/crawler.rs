/// Depth-first log-root crawler.
///
/// Walks each configured root with an explicit stack of sibling queues
/// instead of recursion. Every directory is either recognised as a valid
/// log root (the marker sub-path exists beneath it) or listed and descended
/// into. A recognised root is handed to every miner and then *not* descended
/// into, so a nested installation below it is never recognised separately.
///
/// # Halting
///
/// [`RootHalting::Subtree`] prunes only the recognised root's own subtree.
/// [`RootHalting::Siblings`] stops crawling the configured root as soon as
/// one installation is found: the root's own unvisited siblings and those of
/// every enclosing directory are dropped.
///
/// # Listing retries
///
/// Directory listings on unstable remote storage can come back invalid for a
/// moment. A listing is retried up to `listing_retries` extra times with no
/// backoff; after that the branch is abandoned without raising.
use crate::miner::Miner;
use crate::model::{DateWindow, StatisticsAggregate};
use crate::platform::{FileSystem, LogFile};
use crate::scanner::progress::ScanProgress;
use compact_str::CompactString;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Marker sub-path that only genuine installations contain.
pub const DEFAULT_MARKER: &str = "Repository/Trace";

/// Extra listing attempts after the first one fails.
pub const DEFAULT_LISTING_RETRIES: u32 = 10;

/// What to skip once a directory is recognised as a log root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootHalting {
    /// Skip only the root's own subdirectories.
    #[default]
    Subtree,
    /// Stop crawling the configured root after the first log root found.
    Siblings,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Relative path whose presence marks a valid log root.
    pub marker: PathBuf,
    pub listing_retries: u32,
    pub halting: RootHalting,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            marker: PathBuf::from(DEFAULT_MARKER),
            listing_retries: DEFAULT_LISTING_RETRIES,
            halting: RootHalting::default(),
        }
    }
}

/// Counters from one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Files handed to a miner.
    pub files_mined: u64,
    /// Mining locations scanned (one per miner per recognised root).
    pub log_dirs_scanned: u64,
    /// Directories examined for the marker.
    pub dirs_visited: u64,
    /// Recognised log roots, in discovery order.
    pub roots_found: Vec<PathBuf>,
    /// Data lines handed to `Miner::mine`.
    pub lines_mined: u64,
    /// Data lines a miner rejected.
    pub lines_rejected: u64,
    /// Listings abandoned after exhausting retries.
    pub listings_abandoned: u64,
    pub elapsed: Duration,
}

pub struct DirectoryCrawler<'a> {
    fs: &'a dyn FileSystem,
    options: CrawlOptions,
    progress_tx: Option<Sender<ScanProgress>>,
    summary: CrawlSummary,
}

impl<'a> DirectoryCrawler<'a> {
    pub fn new(fs: &'a dyn FileSystem, options: CrawlOptions) -> Self {
        Self {
            fs,
            options,
            progress_tx: None,
            summary: CrawlSummary::default(),
        }
    }

    /// Send [`ScanProgress`] messages to `tx` during the crawl.
    pub fn with_progress(mut self, tx: Sender<ScanProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Perform one pass over `roots`. Returns after every matched file has
    /// been read. Never fails: missing roots, bad listings and unreadable
    /// files are logged and skipped.
    pub fn crawl(
        mut self,
        roots: &[PathBuf],
        window: &DateWindow,
        miners: &mut [Box<dyn Miner>],
        stats: &mut StatisticsAggregate,
    ) -> CrawlSummary {
        let start = Instant::now();

        for root in roots {
            if !self.fs.exists(root) {
                warn!(
                    "Root directory {} does not exist or is not accessible; skipping",
                    root.display()
                );
                self.send(ScanProgress::Error {
                    path: root.display().to_string(),
                    message: "root directory does not exist".into(),
                });
                continue;
            }
            info!("Crawling {}", root.display());
            self.crawl_root(root, window, miners, stats);
        }

        self.summary.elapsed = start.elapsed();
        debug!(
            "Crawl complete: {} dirs visited, {} roots, {} files, {} lines ({} rejected) in {:?}",
            self.summary.dirs_visited,
            self.summary.roots_found.len(),
            self.summary.files_mined,
            self.summary.lines_mined,
            self.summary.lines_rejected,
            self.summary.elapsed
        );
        self.send(ScanProgress::Complete {
            duration: self.summary.elapsed,
            files_mined: self.summary.files_mined,
            roots_found: self.summary.roots_found.len() as u64,
        });
        self.summary
    }

    fn crawl_root(
        &mut self,
        root: &Path,
        window: &DateWindow,
        miners: &mut [Box<dyn Miner>],
        stats: &mut StatisticsAggregate,
    ) {
        // Each level holds the not-yet-visited siblings of one listing.
        let mut levels: Vec<VecDeque<PathBuf>> = vec![VecDeque::from([root.to_path_buf()])];

        while let Some(level) = levels.last_mut() {
            let Some(dir) = level.pop_front() else {
                levels.pop();
                continue;
            };
            self.summary.dirs_visited += 1;

            if !self.fs.exists(&dir) {
                debug!("{} vanished during the crawl", dir.display());
                continue;
            }

            if self.is_log_root(&dir) {
                self.mine_root(&dir, window, miners, stats);
                if self.options.halting == RootHalting::Siblings {
                    // The find halts every enclosing level, not just this one.
                    let skipped: usize = levels.iter().map(VecDeque::len).sum();
                    if skipped > 0 {
                        debug!(
                            "Skipping {skipped} unvisited directories under {} after log root {}",
                            root.display(),
                            dir.display()
                        );
                    }
                    levels.clear();
                }
                continue;
            }

            if let Some(children) = self.list_dirs_with_retry(&dir) {
                if !children.is_empty() {
                    levels.push(children.into());
                }
            }
        }
    }

    fn is_log_root(&self, dir: &Path) -> bool {
        self.fs.child_exists(dir, &self.options.marker)
    }

    fn list_dirs_with_retry(&mut self, dir: &Path) -> Option<Vec<PathBuf>> {
        let mut retries = 0;
        loop {
            if let Some(children) = self.fs.list_dirs(dir) {
                return Some(children);
            }
            if retries >= self.options.listing_retries {
                warn!(
                    "Listing {} failed after {} attempts; abandoning branch",
                    dir.display(),
                    retries + 1
                );
                self.summary.listings_abandoned += 1;
                self.send(ScanProgress::Error {
                    path: dir.display().to_string(),
                    message: format!("listing failed after {} attempts", retries + 1),
                });
                return None;
            }
            retries += 1;
            debug!("Retrying listing of {} ({retries})", dir.display());
        }
    }

    fn mine_root(
        &mut self,
        root: &Path,
        window: &DateWindow,
        miners: &mut [Box<dyn Miner>],
        stats: &mut StatisticsAggregate,
    ) {
        info!("Valid log root found => {}", root.display());
        self.summary.roots_found.push(root.to_path_buf());
        self.send(ScanProgress::RootFound {
            path: root.display().to_string(),
        });

        for miner in miners.iter_mut() {
            if let Some(location) = miner.resolve_location(root, self.fs) {
                self.scan_logs(&location, window, miner.as_mut(), stats);
            }
        }
    }

    fn scan_logs(
        &mut self,
        location: &Path,
        window: &DateWindow,
        miner: &mut dyn Miner,
        stats: &mut StatisticsAggregate,
    ) {
        info!("Log location found => {}", location.display());
        self.summary.log_dirs_scanned += 1;

        let files = select_files(self.fs.list_files(location), window, miner.name());
        for file in files {
            self.summary.files_mined += 1;
            info!(
                "{} miner is reading file {} ({} bytes)",
                miner.name(),
                file.path.display(),
                file.len
            );
            self.mine_file(&file, location, miner, stats);
        }
    }

    fn mine_file(
        &mut self,
        file: &LogFile,
        location: &Path,
        miner: &mut dyn Miner,
        stats: &mut StatisticsAggregate,
    ) {
        let lines = match self.fs.open_lines(&file.path) {
            Ok(lines) => lines,
            Err(err) => {
                warn!("Cannot open {}: {err}", file.path.display());
                self.send(ScanProgress::Error {
                    path: file.path.display().to_string(),
                    message: err.to_string(),
                });
                return;
            }
        };

        let mut line_no: u64 = 0;
        for line in lines {
            let line = match line {
                Ok(l) => l,
                Err(err) => {
                    // Forward-only stream: the rest of the file is lost.
                    warn!(
                        "Read error in {} after line {line_no}: {err}",
                        file.path.display()
                    );
                    self.send(ScanProgress::Error {
                        path: file.path.display().to_string(),
                        message: err.to_string(),
                    });
                    break;
                }
            };
            line_no += 1;

            if line_no == 1 {
                let header = line.strip_prefix('\u{feff}').unwrap_or(&line);
                miner.init_file(header, stats, location);
                continue;
            }

            self.summary.lines_mined += 1;
            if let Err(err) = miner.mine(&line, stats) {
                self.summary.lines_rejected += 1;
                debug!(
                    "{} miner skipped {}:{line_no}: {err}",
                    miner.name(),
                    file.path.display()
                );
            }
        }

        self.send(ScanProgress::FileMined {
            miner: CompactString::new(miner.name()),
            path: file.path.display().to_string(),
            lines: line_no.saturating_sub(1),
        });
    }

    fn send(&self, msg: ScanProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(msg);
        }
    }
}

/// Keep files modified inside `window` whose name contains `tag`, ignoring
/// case. Input order is preserved.
pub fn select_files(files: Vec<LogFile>, window: &DateWindow, tag: &str) -> Vec<LogFile> {
    files
        .into_iter()
        .filter(|f| f.modified.is_some_and(|m| window.contains(m)))
        .filter(|f| name_matches(&f.name, tag))
        .collect()
}

/// Case-insensitive substring match of a miner tag in a file name.
pub fn name_matches(file_name: &str, tag: &str) -> bool {
    !tag.is_empty() && file_name.to_lowercase().contains(&tag.to_lowercase())
}
