//! Bounded, cached reads of source lines around an error location.
//!
//! Mirrors Python's `linecache` idiom: a file is read once, split into
//! lines, and kept in memory only as long as the cache is alive. The cache
//! is cleared after each batch of reads (one analyzer invocation) so that
//! files edited between runs are re-read rather than served stale.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use crate::types::SourceWindow;

/// Default number of lines read above and below the error line.
pub const DEFAULT_RADIUS: u32 = 5;

/// Caches whole-file line splits keyed by path, so that multiple frames in
/// the same file within one invocation only pay the read cost once.
///
/// The cache is a `Mutex`, not a `RefCell`: batch diagnosis shares one
/// `Analyzer` (and therefore one reader) across rayon worker threads, so
/// the cache must be `Sync`.
#[derive(Default)]
pub struct SourceWindowReader {
    cache: Mutex<HashMap<String, Option<Vec<String>>>>,
}

impl SourceWindowReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the window `[max(1, line-radius), line+radius]` for `path`.
    ///
    /// Never loads more of the file than it must: once a path has been
    /// read and split, subsequent calls for the same path reuse the split
    /// lines from the in-memory cache until [`Self::clear`] is called.
    pub fn read_window(&self, path: &str, line: u32, radius: u32) -> SourceWindow {
        let mut cache = self.cache.lock().unwrap();
        let lines = cache
            .entry(path.to_owned())
            .or_insert_with(|| fs::read_to_string(path).ok().map(|s| s.lines().map(str::to_owned).collect()));

        let Some(lines) = lines else {
            return SourceWindow::absent(path, line);
        };

        let start = line.saturating_sub(radius).max(1);
        let end = line.saturating_add(radius);
        let slice: Vec<String> = lines
            .iter()
            .enumerate()
            .filter_map(|(idx, text)| {
                let one_based = idx as u32 + 1;
                (one_based >= start && one_based <= end).then(|| text.clone())
            })
            .collect();
        let actual_end = end.min(lines.len() as u32);

        SourceWindow {
            file_path: path.to_owned(),
            error_line: line,
            start_line: start,
            end_line: actual_end.max(start),
            lines: slice,
            exists: true,
        }
    }

    pub fn read_default(&self, path: &str, line: u32) -> SourceWindow {
        self.read_window(path, line, DEFAULT_RADIUS)
    }

    /// Drop all cached file contents. Call after each analyzer invocation
    /// so a watched file that changes between calls is re-read.
    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_window_around_line() {
        let content = (1..=20).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let file = write_temp(&content);
        let reader = SourceWindowReader::new();
        let window = reader.read_default(file.path().to_str().unwrap(), 10);
        assert!(window.exists);
        assert_eq!(window.start_line, 5);
        assert_eq!(window.end_line, 15);
        assert_eq!(window.lines.len(), 11);
        assert_eq!(window.lines[5], "line 10");
    }

    #[test]
    fn clamps_start_at_one() {
        let content = (1..=5).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let file = write_temp(&content);
        let reader = SourceWindowReader::new();
        let window = reader.read_default(file.path().to_str().unwrap(), 1);
        assert_eq!(window.start_line, 1);
    }

    #[test]
    fn missing_file_yields_absent_window() {
        let reader = SourceWindowReader::new();
        let window = reader.read_default("/no/such/file/at/all.py", 5);
        assert!(!window.exists);
        assert!(window.lines.is_empty());
    }

    #[test]
    fn clear_forces_fresh_read() {
        let file = write_temp("one\ntwo\nthree");
        let reader = SourceWindowReader::new();
        let _ = reader.read_default(file.path().to_str().unwrap(), 2);
        assert!(reader.cache.lock().unwrap().contains_key(file.path().to_str().unwrap()));
        reader.clear();
        assert!(reader.cache.lock().unwrap().is_empty());
    }
}
