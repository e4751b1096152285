/// LogTally Core - log-tree crawling, mining, and monthly bookkeeping.
///
/// This crate contains all business logic with zero CLI dependencies.
/// The `logtally` binary is a thin shell that parses arguments, installs
/// logging, and calls [`agent::Agent::run_once`].
///
/// # Modules
///
/// - [`model`] - Date window, period/category keys, and the per-pass statistics aggregate.
/// - [`platform`] - Filesystem collaborator trait and the local implementation.
/// - [`scanner`] - Single-threaded depth-first crawler that feeds log files to miners.
/// - [`miner`] - The miner contract and the closed set of miner variants.
/// - [`store`] - SQLite-backed monthly dedup ledger and per-monitor payload table.
/// - [`report`] - Report document and emitter boundary.
/// - [`config`] - Agent configuration (JSON file plus defaults).
/// - [`agent`] - One complete monitoring run.
pub mod agent;
pub mod config;
pub mod error;
pub mod miner;
pub mod model;
pub mod platform;
pub mod report;
pub mod scanner;
pub mod store;
