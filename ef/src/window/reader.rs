//! Line-range readers over the active source file
//!
//! Both readers use the same 1-based line counter: a line is emitted when
//! `start <= counter <= end`. A range starting at 0 therefore yields one line
//! fewer than a range starting at 1 or later.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::cursor::LineRange;
use crate::error::{FeedError, FeedResult};

/// Samples for one window; `None` is the absent marker
pub type Window = Vec<Option<f64>>;

/// Extract field `field_index` of a comma-delimited line as a finite number
///
/// Missing, non-numeric and non-finite fields all map to `None`.
pub fn parse_field(line: &str, field_index: usize) -> Option<f64> {
    line.trim_end_matches(['\r', '\n'])
        .split(',')
        .nth(field_index)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn parse_bytes(raw: &[u8], field_index: usize) -> Option<f64> {
    parse_field(&String::from_utf8_lossy(raw), field_index)
}

/// First `count` samples of `path`, skipping one header line when `header` is set
///
/// Used for offline analysis of a local recording; shorter files yield
/// shorter windows.
pub fn read_leading(path: impl Into<PathBuf>, field_index: usize, count: u64, header: bool) -> FeedResult<Window> {
    let first = if header { 2 } else { 1 };
    let range = LineRange {
        start: first,
        end: (first + count).saturating_sub(1),
    };
    ScanReader::new(path, field_index).read_window(range)
}

/// Write one sample per line; an absent sample becomes an empty line
///
/// The output reads back through [`parse_field`] with field index 0.
pub fn write_window(path: &Path, window: &[Option<f64>]) -> FeedResult<()> {
    debug!(path = %path.display(), len = window.len(), "write_window: called");
    let mut out = String::with_capacity(window.len() * 8);
    for sample in window {
        if let Some(v) = sample {
            out.push_str(&v.to_string());
        }
        out.push('\n');
    }
    std::fs::write(path, out).map_err(|source| FeedError::WindowWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Anything that can produce the samples for a line range
pub trait WindowSource: Send {
    /// Read the lines of `range` and parse the configured field of each
    fn read_window(&mut self, range: LineRange) -> FeedResult<Window>;

    /// File backing this source
    fn path(&self) -> &Path;
}

/// How windows are read from disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStrategy {
    /// Re-scan from the top of the file on every request
    #[default]
    Scan,
    /// Seek using cached line offsets
    Indexed,
}

/// Build the reader for `strategy`
pub fn open_source(strategy: ReadStrategy, path: impl Into<PathBuf>, field_index: usize) -> Box<dyn WindowSource> {
    let path = path.into();
    debug!(?strategy, path = %path.display(), field_index, "open_source: called");
    match strategy {
        ReadStrategy::Scan => Box::new(ScanReader::new(path, field_index)),
        ReadStrategy::Indexed => Box::new(IndexedReader::new(path, field_index)),
    }
}

fn unavailable(path: &Path) -> impl Fn(std::io::Error) -> FeedError + '_ {
    move |source| FeedError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

/// Sequential reader: cost is proportional to `range.end`
#[derive(Debug, Clone)]
pub struct ScanReader {
    path: PathBuf,
    field_index: usize,
}

impl ScanReader {
    pub fn new(path: impl Into<PathBuf>, field_index: usize) -> Self {
        Self {
            path: path.into(),
            field_index,
        }
    }
}

impl WindowSource for ScanReader {
    fn read_window(&mut self, range: LineRange) -> FeedResult<Window> {
        debug!(start = range.start, end = range.end, "ScanReader::read_window: called");
        let file = File::open(&self.path).map_err(unavailable(&self.path))?;
        let mut reader = BufReader::new(file);

        let mut values = Vec::new();
        let mut counter: u64 = 0;
        let mut buf = Vec::new();

        // Stop as soon as the last line of the range is consumed
        while counter < range.end {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).map_err(unavailable(&self.path))?;
            if n == 0 {
                break;
            }
            counter += 1;
            if range.contains(counter) {
                values.push(parse_bytes(&buf, self.field_index));
            }
        }

        debug!(lines_read = counter, returned = values.len(), "ScanReader::read_window: done");
        Ok(values)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Identity of the file content the index was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

/// Seeking reader backed by a lazily extended line-offset index
///
/// Only newline-terminated lines are indexed, so a trailing partial line is
/// re-read until it is completed. Whenever the file's length or mtime moves,
/// the indexed prefix is re-hashed: an unchanged prefix keeps the index (the
/// file was appended to), anything else rebuilds it.
#[derive(Clone)]
pub struct IndexedReader {
    path: PathBuf,
    field_index: usize,
    /// `starts[i]` is the byte offset of line `i + 1`
    starts: Vec<u64>,
    /// Byte offset just past the last indexed newline
    indexed_end: u64,
    /// Running SHA-256 of bytes `[0, indexed_end)`
    prefix: Sha256,
    fingerprint: Option<Fingerprint>,
}

impl IndexedReader {
    pub fn new(path: impl Into<PathBuf>, field_index: usize) -> Self {
        Self {
            path: path.into(),
            field_index,
            starts: Vec::new(),
            indexed_end: 0,
            prefix: Sha256::new(),
            fingerprint: None,
        }
    }

    /// Lines currently covered by the index
    pub fn indexed_lines(&self) -> usize {
        self.starts.len()
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.indexed_end = 0;
        self.prefix = Sha256::new();
        self.fingerprint = None;
    }

    /// True when bytes `[0, indexed_end)` of `file` still hash to the indexed prefix
    fn prefix_matches(&self, file: &mut File) -> FeedResult<bool> {
        file.seek(SeekFrom::Start(0)).map_err(unavailable(&self.path))?;
        let mut remaining = self.indexed_end;
        let mut hasher = Sha256::new();
        let mut chunk = [0u8; 8192];

        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            let n = file.read(&mut chunk[..want]).map_err(unavailable(&self.path))?;
            if n == 0 {
                return Ok(false);
            }
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }

        Ok(hasher.finalize() == self.prefix.clone().finalize())
    }

    /// Drop the index unless the file is the indexed content plus (possibly) appended bytes
    fn revalidate(&mut self, file: &mut File, current: Fingerprint) -> FeedResult<()> {
        if self.indexed_end == 0 || self.fingerprint == Some(current) {
            return Ok(());
        }

        let intact = current.len >= self.indexed_end && self.prefix_matches(file)?;
        if !intact {
            info!(path = %self.path.display(), indexed = self.starts.len(), "Source changed, rebuilding line index");
            self.reset();
        }
        Ok(())
    }
}

impl WindowSource for IndexedReader {
    fn read_window(&mut self, range: LineRange) -> FeedResult<Window> {
        debug!(start = range.start, end = range.end, indexed = self.starts.len(), "IndexedReader::read_window: called");
        let mut file = File::open(&self.path).map_err(unavailable(&self.path))?;
        let meta = file.metadata().map_err(unavailable(&self.path))?;
        let current = Fingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        };
        self.revalidate(&mut file, current)?;

        let first = range.start.max(1);
        let (seek_to, mut counter) = match self.starts.get(first as usize - 1) {
            Some(&offset) => (offset, first - 1),
            None => (self.indexed_end, self.starts.len() as u64),
        };

        file.seek(SeekFrom::Start(seek_to)).map_err(unavailable(&self.path))?;
        let mut reader = BufReader::new(file);

        let mut values = Vec::new();
        let mut offset = seek_to;
        let mut buf = Vec::new();

        while counter < range.end {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).map_err(unavailable(&self.path))?;
            if n == 0 {
                break;
            }
            counter += 1;

            let terminated = buf.last() == Some(&b'\n');
            if terminated && counter == self.starts.len() as u64 + 1 {
                self.starts.push(offset);
                self.prefix.update(&buf);
                self.indexed_end = offset + n as u64;
            }
            offset += n as u64;

            if range.contains(counter) {
                values.push(parse_bytes(&buf, self.field_index));
            }
        }

        self.fingerprint = Some(current);
        debug!(returned = values.len(), indexed = self.starts.len(), "IndexedReader::read_window: done");
        Ok(values)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Lines `1..=n` where field 0 is the line number and field 1 is ten times it
    fn numbered_file(dir: &TempDir, name: &str, n: u64) -> PathBuf {
        let path = dir.path().join(name);
        let mut content = String::new();
        for i in 1..=n {
            content.push_str(&format!("{},{}\n", i, i * 10));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn values(range: std::ops::RangeInclusive<u64>) -> Window {
        range.map(|v| Some(v as f64)).collect()
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("1.5,2.5", 0), Some(1.5));
        assert_eq!(parse_field("1.5, 2.5 \r\n", 1), Some(2.5));
        assert_eq!(parse_field("-3e2", 0), Some(-300.0));
        assert_eq!(parse_field("abc,1", 0), None);
        assert_eq!(parse_field("1", 3), None);
        assert_eq!(parse_field("", 0), None);
        assert_eq!(parse_field("NaN", 0), None);
        assert_eq!(parse_field("inf", 0), None);
    }

    #[test]
    fn test_parse_field_rejects_numeric_prefix() {
        assert_eq!(parse_field("12abc", 0), None);
        assert_eq!(parse_field("0.42mV", 0), None);
        assert_eq!(parse_field("1.5,0.42mV", 1), None);
        assert_eq!(parse_field("1.5,0.42mV", 0), Some(1.5));
    }

    #[test]
    fn test_scan_reads_inclusive_range() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 100);
        let mut reader = ScanReader::new(&path, 0);

        let window = reader.read_window(LineRange { start: 10, end: 15 }).unwrap();
        assert_eq!(window, values(10..=15));
    }

    #[test]
    fn test_scan_range_starting_at_zero_skips_missing_line_zero() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 100);
        let mut reader = ScanReader::new(&path, 0);

        let window = reader.read_window(LineRange { start: 0, end: 5 }).unwrap();
        assert_eq!(window, values(1..=5));
    }

    #[test]
    fn test_scan_selects_field() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 20);
        let mut reader = ScanReader::new(&path, 1);

        let window = reader.read_window(LineRange { start: 2, end: 3 }).unwrap();
        assert_eq!(window, vec![Some(20.0), Some(30.0)]);
    }

    #[test]
    fn test_scan_short_file_truncates_window() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 12);
        let mut reader = ScanReader::new(&path, 0);

        let window = reader.read_window(LineRange { start: 10, end: 20 }).unwrap();
        assert_eq!(window, values(10..=12));

        let beyond = reader.read_window(LineRange { start: 50, end: 60 }).unwrap();
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_malformed_lines_keep_position() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ecg.csv");
        std::fs::write(&path, "1\n2\nlead-off\n4\n\n6\r\n7").unwrap();
        let mut reader = ScanReader::new(&path, 0);

        let window = reader.read_window(LineRange { start: 1, end: 7 }).unwrap();
        assert_eq!(
            window,
            vec![Some(1.0), Some(2.0), None, Some(4.0), None, Some(6.0), Some(7.0)]
        );
    }

    #[test]
    fn test_invalid_utf8_line_is_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ecg.csv");
        std::fs::write(&path, b"1\n\xff\xfe\n3\n").unwrap();
        let mut reader = ScanReader::new(&path, 0);

        let window = reader.read_window(LineRange { start: 1, end: 3 }).unwrap();
        assert_eq!(window, vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.csv");

        for mut reader in [
            open_source(ReadStrategy::Scan, &path, 0),
            open_source(ReadStrategy::Indexed, &path, 0),
        ] {
            let err = reader.read_window(LineRange { start: 1, end: 2 }).unwrap_err();
            assert!(matches!(err, FeedError::SourceUnavailable { .. }));
        }
    }

    #[test]
    fn test_indexed_matches_scan() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 500);
        let mut scan = ScanReader::new(&path, 1);
        let mut indexed = IndexedReader::new(&path, 1);

        let ranges = [(0, 40), (60, 100), (30, 70), (450, 520), (0, 10), (200, 200)];
        for (start, end) in ranges {
            let range = LineRange { start, end };
            assert_eq!(
                indexed.read_window(range).unwrap(),
                scan.read_window(range).unwrap(),
                "range {start}..={end}"
            );
        }
        assert_eq!(indexed.indexed_lines(), 500);
    }

    #[test]
    fn test_indexed_extends_on_append() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 10);
        let mut reader = IndexedReader::new(&path, 0);

        assert_eq!(reader.read_window(LineRange { start: 8, end: 12 }).unwrap(), values(8..=10));

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        for i in 11..=15 {
            writeln!(file, "{},{}", i, i * 10).unwrap();
        }
        drop(file);

        assert_eq!(reader.read_window(LineRange { start: 8, end: 12 }).unwrap(), values(8..=12));
        assert_eq!(reader.read_window(LineRange { start: 14, end: 20 }).unwrap(), values(14..=15));
    }

    #[test]
    fn test_indexed_completes_partial_tail_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ecg.csv");
        std::fs::write(&path, "1\n2\n3").unwrap();
        let mut reader = IndexedReader::new(&path, 0);

        assert_eq!(reader.read_window(LineRange { start: 1, end: 5 }).unwrap(), values(1..=3));
        assert_eq!(reader.indexed_lines(), 2);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"3\n4\n").unwrap();
        drop(file);

        assert_eq!(
            reader.read_window(LineRange { start: 3, end: 5 }).unwrap(),
            vec![Some(33.0), Some(4.0)]
        );
    }

    #[test]
    fn test_indexed_rebuilds_after_rewrite() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 50);
        let mut reader = IndexedReader::new(&path, 0);
        reader.read_window(LineRange { start: 1, end: 50 }).unwrap();

        // Shorter content with different line widths
        std::fs::write(&path, "100\n200\n300\n").unwrap();

        assert_eq!(
            reader.read_window(LineRange { start: 1, end: 5 }).unwrap(),
            vec![Some(100.0), Some(200.0), Some(300.0)]
        );
    }

    #[test]
    fn test_indexed_rebuilds_after_longer_rewrite_with_newline_on_old_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ecg.csv");
        let original: String = (1..=50).map(|i| format!("{}\n", i)).collect();
        assert_eq!(original.len(), 141);
        std::fs::write(&path, &original).unwrap();

        let mut indexed = IndexedReader::new(&path, 0);
        let mut scan = ScanReader::new(&path, 0);
        indexed.read_window(LineRange { start: 1, end: 50 }).unwrap();

        // Three-byte lines put a newline at byte 140, where the old index ended
        let rewritten: String = (0..200).map(|i| format!("{:02}\n", i % 100)).collect();
        assert_eq!(rewritten.as_bytes()[140], b'\n');
        std::fs::write(&path, &rewritten).unwrap();

        let range = LineRange { start: 10, end: 14 };
        let expected = scan.read_window(range).unwrap();
        assert_eq!(expected, vec![Some(9.0), Some(10.0), Some(11.0), Some(12.0), Some(13.0)]);
        assert_eq!(indexed.read_window(range).unwrap(), expected);
    }

    #[test]
    fn test_indexed_keeps_index_when_appended() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 20);
        let mut reader = IndexedReader::new(&path, 0);
        reader.read_window(LineRange { start: 1, end: 20 }).unwrap();
        assert_eq!(reader.indexed_lines(), 20);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "21,210").unwrap();
        drop(file);

        assert_eq!(reader.read_window(LineRange { start: 5, end: 6 }).unwrap(), values(5..=6));
        assert_eq!(reader.indexed_lines(), 20);
        assert_eq!(reader.read_window(LineRange { start: 20, end: 21 }).unwrap(), values(20..=21));
        assert_eq!(reader.indexed_lines(), 21);
    }

    #[test]
    fn test_read_leading() {
        let temp = TempDir::new().unwrap();
        let path = numbered_file(&temp, "ecg.csv", 30);

        assert_eq!(read_leading(&path, 0, 5, false).unwrap(), values(1..=5));
        assert_eq!(read_leading(&path, 1, 2, true).unwrap(), vec![Some(20.0), Some(30.0)]);
        assert_eq!(read_leading(&path, 0, 100, false).unwrap(), values(1..=30));
        assert!(read_leading(&path, 0, 0, false).unwrap().is_empty());
    }

    #[test]
    fn test_read_leading_skips_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ecg.csv");
        std::fs::write(&path, "MLII,V5\n-0.145,-0.065\n-0.145,-0.065\n-0.12,-0.08\n").unwrap();

        assert_eq!(
            read_leading(&path, 0, 2, true).unwrap(),
            vec![Some(-0.145), Some(-0.145)]
        );
        assert_eq!(read_leading(&path, 0, 1, false).unwrap(), vec![None]);
    }

    #[test]
    fn test_write_window_reads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("saved.csv");
        let window = vec![Some(0.5), None, Some(-1.25), Some(3.0)];

        write_window(&path, &window).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.5\n\n-1.25\n3\n");
        assert_eq!(read_leading(&path, 0, 10, false).unwrap(), window);
    }

    #[test]
    fn test_write_window_into_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent").join("saved.csv");
        let err = write_window(&path, &[Some(1.0)]).unwrap_err();
        assert!(matches!(err, FeedError::WindowWrite { .. }));
    }

    #[test]
    fn test_read_strategy_yaml() {
        let strategy: ReadStrategy = serde_yaml::from_str("indexed").unwrap();
        assert_eq!(strategy, ReadStrategy::Indexed);
        assert_eq!(ReadStrategy::default(), ReadStrategy::Scan);
    }
}
