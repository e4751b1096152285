/// Scan progress reporting - lightweight messages sent from the crawler to
/// an optional listener via a bounded crossbeam channel.
///
/// The crawl is single-threaded and must never stall on a slow listener, so
/// messages are sent with `try_send` and dropped when the channel is full.
use compact_str::CompactString;
use std::time::Duration;

/// Suggested capacity for a progress channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

#[derive(Debug)]
pub enum ScanProgress {
    /// A directory was recognised as a valid log root.
    RootFound { path: String },
    /// A matching file has been fully read by a miner.
    FileMined {
        miner: CompactString,
        path: String,
        lines: u64,
    },
    /// A non-fatal problem (missing root, abandoned listing, unreadable file).
    Error { path: String, message: String },
    /// The pass finished.
    Complete {
        duration: Duration,
        files_mined: u64,
        roots_found: u64,
    },
}
