/// Scanner module - one complete mining pass over the log tree.
///
/// [`run_pass`] drives the [`crawler::DirectoryCrawler`], finalises every
/// miner, then finalises the shared [`StatisticsAggregate`]. The pass is
/// synchronous and single-threaded; callers that want live progress pass a
/// channel sender and drain it themselves.
pub mod crawler;
pub mod progress;

pub use crawler::{CrawlOptions, CrawlSummary, DirectoryCrawler, RootHalting};
pub use progress::{ScanProgress, PROGRESS_CHANNEL_CAPACITY};

use crate::miner::Miner;
use crate::model::{DateWindow, StatisticsAggregate};
use crate::platform::FileSystem;
use crossbeam_channel::Sender;
use std::path::PathBuf;
use tracing::info;

/// Crawl `roots`, feed matching files to `miners`, and finalise `stats`.
///
/// `stats` must be a fresh aggregate owned by this pass.
pub fn run_pass(
    fs: &dyn FileSystem,
    options: CrawlOptions,
    roots: &[PathBuf],
    window: &DateWindow,
    miners: &mut [Box<dyn Miner>],
    stats: &mut StatisticsAggregate,
    progress_tx: Option<Sender<ScanProgress>>,
) -> CrawlSummary {
    info!(
        "Starting pass over {} roots, window {} .. {}",
        roots.len(),
        window.start().format("%Y-%m-%d %H:%M:%S%.3f"),
        window.stop().format("%Y-%m-%d %H:%M:%S%.3f")
    );

    let mut crawler = DirectoryCrawler::new(fs, options);
    if let Some(tx) = progress_tx {
        crawler = crawler.with_progress(tx);
    }
    let summary = crawler.crawl(roots, window, miners, stats);

    for miner in miners.iter_mut() {
        miner.finalize(stats);
    }
    stats.finalize(
        summary.files_mined,
        summary.log_dirs_scanned,
        summary.elapsed,
    );

    info!(
        "Pass finished: {} unique users, {} unique apps, {} files in {}s",
        stats.total_unique_active_users,
        stats.total_unique_active_apps,
        stats.total_nr_of_files,
        stats.total_scan_time_taken_sec
    );
    summary
}
