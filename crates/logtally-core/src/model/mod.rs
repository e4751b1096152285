/// Data model for a LogTally pass.
///
/// Re-exports the date window, the period/category keys used by the monthly
/// store, and the statistics aggregate that miners fill during a crawl.
pub mod date_window;
pub mod period;
pub mod statistics;

pub use date_window::DateWindow;
pub use period::{Category, Period};
pub use statistics::StatisticsAggregate;
