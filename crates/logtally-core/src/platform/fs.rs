/// Filesystem collaborator: existence checks, directory listing, file
/// enumeration with refreshed metadata, and forward-only line streaming.
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// A regular file found under a mining location.
#[derive(Debug, Clone)]
pub struct LogFile {
    pub path: PathBuf,
    /// File name only, lossily decoded.
    pub name: String,
    /// Last-modified time after a metadata refresh. `None` if unavailable.
    pub modified: Option<SystemTime>,
    pub len: u64,
}

/// Read-only view of the filesystem used by the crawler.
pub trait FileSystem {
    /// `true` if `path` exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// `true` if `relative` exists beneath `dir`.
    fn child_exists(&self, dir: &Path, relative: &Path) -> bool {
        self.exists(&dir.join(relative))
    }

    /// Immediate subdirectories of `path`, sorted by name.
    ///
    /// `None` means the listing came back invalid and may succeed if retried.
    /// An empty vec is a genuine empty directory.
    fn list_dirs(&self, path: &Path) -> Option<Vec<PathBuf>>;

    /// Every regular file beneath `dir`, recursively, in sorted tree order.
    fn list_files(&self, dir: &Path) -> Vec<LogFile>;

    /// Open `path` for forward-only line reading.
    fn open_lines(&self, path: &Path) -> io::Result<LineReader<Box<dyn BufRead>>>;
}

/// The real, local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dirs(&self, path: &Path) -> Option<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Listing {} failed: {err}", path.display());
                return None;
            }
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    debug!("Listing {} returned a bad entry: {err}", path.display());
                    return None;
                }
            };
            // Symlinked directories are not followed, which rules out cycles.
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => dirs.push(entry.path()),
                Ok(_) => {}
                Err(err) => {
                    debug!("Cannot type {}: {err}", entry.path().display());
                }
            }
        }
        dirs.sort();
        Some(dirs)
    }

    fn list_files(&self, dir: &Path) -> Vec<LogFile> {
        let walker = jwalk::WalkDir::new(dir)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .parallelism(jwalk::Parallelism::Serial);

        let mut files = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    debug!("Skipping unreadable entry under {}: {err}", dir.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            // Re-stat rather than trusting the walker's cached metadata: some
            // shares report zero-length, stale entries until touched.
            let (modified, len) = match std::fs::metadata(&path) {
                Ok(meta) => (meta.modified().ok(), meta.len()),
                Err(err) => {
                    debug!("Cannot stat {}: {err}", path.display());
                    continue;
                }
            };
            files.push(LogFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                modified,
                len,
            });
        }
        files
    }

    fn open_lines(&self, path: &Path) -> io::Result<LineReader<Box<dyn BufRead>>> {
        let file = File::open(path)?;
        Ok(LineReader::new(Box::new(BufReader::new(file))))
    }
}

/// Line iterator that tolerates invalid UTF-8 and CRLF endings.
///
/// Unlike [`BufRead::lines`], a line with bad bytes is decoded lossily instead
/// of producing an error, so one corrupt record cannot end the file early.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(512),
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn lines_of(bytes: &[u8]) -> Vec<String> {
        LineReader::new(Cursor::new(bytes.to_vec()))
            .map(|l| l.unwrap())
            .collect()
    }

    #[test]
    fn line_reader_strips_crlf_and_lf() {
        assert_eq!(lines_of(b"a\r\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn line_reader_keeps_empty_lines() {
        assert_eq!(lines_of(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn line_reader_decodes_invalid_utf8_lossily() {
        let lines = lines_of(b"ok\n\xff\xfebad\nlast\n");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("bad"));
        assert_eq!(lines[2], "last");
    }

    #[test]
    fn list_dirs_returns_only_directories_sorted() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        std::fs::write(tmp.path().join("file.txt"), "x").unwrap();

        let dirs = LocalFileSystem.list_dirs(tmp.path()).unwrap();
        assert_eq!(dirs, vec![tmp.path().join("a"), tmp.path().join("b")]);
    }

    #[test]
    fn list_dirs_on_missing_path_is_invalid() {
        let tmp = TempDir::new().unwrap();
        assert!(LocalFileSystem.list_dirs(&tmp.path().join("nope")).is_none());
    }

    #[test]
    fn list_files_recurses_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(tmp.path().join("b.log"), "x").unwrap();
        std::fs::write(tmp.path().join("a.log"), "xy").unwrap();
        std::fs::write(sub.join("c.log"), "xyz").unwrap();

        let files = LocalFileSystem.list_files(tmp.path());
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.log", "b.log", "c.log"]);
        assert_eq!(files[2].len, 3);
        assert!(files.iter().all(|f| f.modified.is_some()));
    }
}
