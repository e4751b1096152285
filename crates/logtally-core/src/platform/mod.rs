/// Platform layer - the filesystem collaborator the crawler talks to.
///
/// The crawler never touches `std::fs` directly; everything goes through the
/// [`FileSystem`] trait so listing hiccups on unstable remote storage can be
/// reproduced in tests.
pub mod fs;

pub use fs::{FileSystem, LineReader, LocalFileSystem, LogFile};
