//! Line sources for the worker pool.
//!
//! A snapshot directory yields one gzip shard per work item. A single plain
//! JSONL file (the papers pipeline output) is cut into byte ranges so that
//! several workers can share it. A line belongs to the range holding its
//! first byte, so every line is read exactly once.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::discovery::find_gz_files;
use crate::error::ShardError;
use crate::stream::{GzipLines, open_gzip_file, take_line};

/// Read buffer for plain range readers
const RANGE_BUF_SIZE: usize = 256 * 1024;

/// `[start, end)` of a plain file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub path: PathBuf,
    pub start: u64,
    pub end: u64,
}

/// Cut `path` into at most `parts` ranges of roughly equal size.
///
/// An empty file gives one empty range.
pub fn split_ranges(path: &Path, parts: usize) -> Result<Vec<ByteRange>, ShardError> {
    let len = std::fs::metadata(path)
        .map_err(|e| ShardError::open(path, e))?
        .len();
    if len == 0 {
        return Ok(vec![ByteRange {
            path: path.to_path_buf(),
            start: 0,
            end: 0,
        }]);
    }
    let parts = (parts.max(1) as u64).min(len);
    let step = len.div_ceil(parts);
    Ok((0..parts)
        .map(|i| ByteRange {
            path: path.to_path_buf(),
            start: i * step,
            end: ((i + 1) * step).min(len),
        })
        .filter(|r| r.start < r.end)
        .collect())
}

/// Lines whose first byte falls inside one [`ByteRange`]
pub struct RangeLines {
    reader: BufReader<File>,
    range: ByteRange,
    pos: u64,
    bytes: Vec<u8>,
    lines_read: usize,
    invalid_utf8: usize,
    done: bool,
}

impl std::fmt::Debug for RangeLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeLines")
            .field("range", &self.range)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

/// Open `range`, skipping the tail of a line that started before it
pub fn open_range(range: &ByteRange) -> Result<RangeLines, ShardError> {
    let path = &range.path;
    let file = File::open(path).map_err(|e| ShardError::open(path, e))?;
    let mut reader = BufReader::with_capacity(RANGE_BUF_SIZE, file);
    let decode = |source| ShardError::Decode {
        path: path.clone(),
        lines_read: 0,
        source,
    };

    let mut pos = range.start;
    if range.start > 0 {
        // Reading from the byte before `start` consumes exactly the line
        // that owns it (just its `\n` when `start` is a line start)
        reader
            .seek(SeekFrom::Start(range.start - 1))
            .map_err(decode)?;
        let mut skipped = Vec::new();
        let n = reader.read_until(b'\n', &mut skipped).map_err(decode)?;
        pos = range.start - 1 + n as u64;
    }

    Ok(RangeLines {
        reader,
        range: range.clone(),
        pos,
        bytes: Vec::new(),
        lines_read: 0,
        invalid_utf8: 0,
        done: false,
    })
}

impl RangeLines {
    /// Same contract as [`GzipLines::next_line`]
    pub fn next_line(&mut self, buf: &mut String) -> Result<bool, ShardError> {
        buf.clear();
        loop {
            if self.done || self.pos >= self.range.end {
                self.done = true;
                return Ok(false);
            }
            self.bytes.clear();
            let n = match self.reader.read_until(b'\n', &mut self.bytes) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Err(ShardError::Decode {
                        path: self.range.path.clone(),
                        lines_read: self.lines_read,
                        source: e,
                    });
                }
            };
            if n == 0 {
                self.done = true;
                return Ok(false);
            }
            self.pos += n as u64;
            self.lines_read += 1;
            if take_line(&mut self.bytes, buf) {
                return Ok(true);
            }
            self.invalid_utf8 += 1;
        }
    }

    /// Bytes consumed since the start of the range
    pub fn bytes_read(&self) -> u64 {
        self.pos.saturating_sub(self.range.start)
    }

    pub fn total_bytes(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn invalid_utf8(&self) -> usize {
        self.invalid_utf8
    }
}

/// One unit of work for a line-oriented pool stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSource {
    Gzip(PathBuf),
    Plain(ByteRange),
}

impl LineSource {
    pub fn open(&self) -> Result<SourceLines, ShardError> {
        match self {
            Self::Gzip(path) => open_gzip_file(path).map(SourceLines::Gzip),
            Self::Plain(range) => open_range(range).map(SourceLines::Plain),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Gzip(path) => path,
            Self::Plain(range) => &range.path,
        }
    }
}

/// Reader for either kind of [`LineSource`]
#[derive(Debug)]
pub enum SourceLines {
    Gzip(GzipLines),
    Plain(RangeLines),
}

impl SourceLines {
    pub fn next_line(&mut self, buf: &mut String) -> Result<bool, ShardError> {
        match self {
            Self::Gzip(r) => r.next_line(buf),
            Self::Plain(r) => r.next_line(buf),
        }
    }

    pub fn bytes_read(&self) -> u64 {
        match self {
            Self::Gzip(r) => r.bytes_read(),
            Self::Plain(r) => r.bytes_read(),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        match self {
            Self::Gzip(r) => r.total_bytes(),
            Self::Plain(r) => r.total_bytes(),
        }
    }

    pub fn invalid_utf8(&self) -> usize {
        match self {
            Self::Gzip(r) => r.invalid_utf8(),
            Self::Plain(r) => r.invalid_utf8(),
        }
    }
}

/// Work items for `input`: every `.gz` shard below a directory, a single
/// `.gz` file as is, or a plain file cut into `parts` byte ranges.
pub fn plan_sources(input: &Path, parts: usize) -> Result<Vec<LineSource>, ShardError> {
    let meta = std::fs::metadata(input).map_err(|e| ShardError::open(input, e))?;
    if meta.is_dir() {
        return Ok(find_gz_files(input)?
            .into_iter()
            .map(LineSource::Gzip)
            .collect());
    }
    if input.extension().is_some_and(|ext| ext == "gz") {
        return Ok(vec![LineSource::Gzip(input.to_path_buf())]);
    }
    Ok(split_ranges(input, parts)?
        .into_iter()
        .map(LineSource::Plain)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn read_all(range: &ByteRange) -> Vec<String> {
        let mut r = open_range(range).unwrap();
        let mut buf = String::new();
        let mut out = Vec::new();
        while r.next_line(&mut buf).unwrap() {
            out.push(buf.clone());
        }
        out
    }

    #[test]
    fn ranges_cover_every_line_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("papers.jsonl");
        let lines: Vec<String> = (0..97).map(|i| format!("{{\"n\":{}}}", i * 37)).collect();
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        for parts in [1, 2, 3, 7, 16, 1000] {
            let ranges = split_ranges(&path, parts).unwrap();
            assert!(ranges.len() <= parts);
            let got: Vec<String> = ranges.iter().flat_map(read_all).collect();
            assert_eq!(got, lines, "parts={parts}");
        }
    }

    #[test]
    fn range_starting_on_line_boundary_keeps_that_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("two.jsonl");
        fs::write(&path, "aaaa\nbbbb\n").unwrap();
        let second = ByteRange {
            path: path.clone(),
            start: 5,
            end: 10,
        };
        assert_eq!(read_all(&second), vec!["bbbb"]);
        let first = ByteRange {
            path,
            start: 0,
            end: 5,
        };
        assert_eq!(read_all(&first), vec!["aaaa"]);
    }

    #[test]
    fn last_line_without_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tail.jsonl");
        fs::write(&path, "one\ntwo").unwrap();
        let got: Vec<String> = split_ranges(&path, 2)
            .unwrap()
            .iter()
            .flat_map(read_all)
            .collect();
        assert_eq!(got, vec!["one", "two"]);
    }

    #[test]
    fn empty_file_is_one_empty_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jsonl");
        fs::write(&path, "").unwrap();
        let ranges = split_ranges(&path, 4).unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(read_all(&ranges[0]).is_empty());
    }

    #[test]
    fn plain_range_skips_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, b"ok\n\xff\nfine\n").unwrap();
        let mut r = open_range(&split_ranges(&path, 1).unwrap()[0]).unwrap();
        let mut buf = String::new();
        let mut n = 0;
        while r.next_line(&mut buf).unwrap() {
            n += 1;
        }
        assert_eq!(n, 2);
        assert_eq!(r.invalid_utf8(), 1);
        assert_eq!(r.bytes_read(), r.total_bytes());
    }

    #[test]
    fn plan_sources_by_input_kind() {
        let dir = TempDir::new().unwrap();
        let shards = dir.path().join("works");
        fs::create_dir_all(shards.join("updated_date=2024-01-01")).unwrap();
        for name in ["part_000.gz", "part_001.gz"] {
            let mut enc = GzEncoder::new(
                File::create(shards.join("updated_date=2024-01-01").join(name)).unwrap(),
                Compression::fast(),
            );
            writeln!(enc, "{{}}").unwrap();
            enc.finish().unwrap();
        }
        let from_dir = plan_sources(&shards, 8).unwrap();
        assert_eq!(from_dir.len(), 2);
        assert!(from_dir.iter().all(|s| matches!(s, LineSource::Gzip(_))));

        let plain = dir.path().join("papers.jsonl");
        fs::write(&plain, "{}\n{}\n{}\n{}\n").unwrap();
        let ranges = plan_sources(&plain, 2).unwrap();
        assert_eq!(ranges.len(), 2);
        assert!(ranges.iter().all(|s| s.path() == plain));

        let mut total = 0;
        for source in &ranges {
            let mut lines = source.open().unwrap();
            let mut buf = String::new();
            while lines.next_line(&mut buf).unwrap() {
                total += 1;
            }
        }
        assert_eq!(total, 4);

        let err = plan_sources(&dir.path().join("missing.jsonl"), 2).unwrap_err();
        assert!(matches!(err, ShardError::NotFound(_)));
    }
}
