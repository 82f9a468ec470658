//! Streaming gzip decompression of local shard files.
//!
//! File → byte counter → gunzip → buffered line reader. Nothing is held in
//! memory beyond the read buffer, so arbitrarily large shards are fine.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::MultiGzDecoder;

use crate::error::ShardError;

/// Buffer size for gzip stream reader (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Initial capacity for the per-reader line byte buffer
const LINE_BUF_CAPACITY: usize = 4096;

/// Shared byte counter for progress tracking (compressed bytes consumed)
pub type ByteCounter = Arc<AtomicU64>;

/// Buffered reader over a gzipped file with byte counting
pub type GzipReader = BufReader<MultiGzDecoder<CountingReader<File>>>;

/// Reader wrapper that tracks bytes read
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Forward-only line source over one gzip shard.
///
/// Lines are yielded without the trailing newline. Once a decode error has
/// been returned the reader is exhausted; everything yielded before it is
/// still valid.
pub struct GzipLines {
    reader: GzipReader,
    path: PathBuf,
    counter: ByteCounter,
    total_bytes: u64,
    bytes: Vec<u8>,
    lines_read: usize,
    invalid_utf8: usize,
    done: bool,
}

impl std::fmt::Debug for GzipLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipLines")
            .field("path", &self.path)
            .field("lines_read", &self.lines_read)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Strip the line terminator from `bytes` and copy it into `buf`.
///
/// `false` when the line is not valid UTF-8 (`buf` is left empty).
pub(crate) fn take_line(bytes: &mut Vec<u8>, buf: &mut String) -> bool {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => {
            buf.push_str(s);
            true
        }
        Err(_) => false,
    }
}

/// Open a local `.gz` shard for line-by-line reading
pub fn open_gzip_file(path: &Path) -> Result<GzipLines, ShardError> {
    let file = File::open(path).map_err(|e| ShardError::open(path, e))?;
    let total_bytes = file
        .metadata()
        .map_err(|e| ShardError::open(path, e))?
        .len();

    let counter = Arc::new(AtomicU64::new(0));
    let counting_reader = CountingReader {
        inner: file,
        count: counter.clone(),
    };
    let gz = MultiGzDecoder::new(counting_reader);

    Ok(GzipLines {
        reader: BufReader::with_capacity(GZIP_BUF_SIZE, gz),
        path: path.to_path_buf(),
        counter,
        total_bytes,
        bytes: Vec::with_capacity(LINE_BUF_CAPACITY),
        lines_read: 0,
        invalid_utf8: 0,
        done: false,
    })
}

impl GzipLines {
    /// Read the next line into `buf` (cleared first).
    ///
    /// Returns `Ok(false)` at end of stream. Lines that are not valid UTF-8
    /// are skipped and counted in [`invalid_utf8`](Self::invalid_utf8).
    pub fn next_line(&mut self, buf: &mut String) -> Result<bool, ShardError> {
        buf.clear();
        loop {
            if self.done {
                return Ok(false);
            }
            self.bytes.clear();
            let n = match self.reader.read_until(b'\n', &mut self.bytes) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Err(ShardError::Decode {
                        path: self.path.clone(),
                        lines_read: self.lines_read,
                        source: e,
                    });
                }
            };
            if n == 0 {
                self.done = true;
                return Ok(false);
            }
            self.lines_read += 1;
            if take_line(&mut self.bytes, buf) {
                return Ok(true);
            }
            self.invalid_utf8 += 1;
        }
    }

    /// Compressed bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Compressed size of the shard
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Lines read so far (including skipped non-UTF-8 lines)
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Lines skipped because they were not valid UTF-8
    pub fn invalid_utf8(&self) -> usize {
        self.invalid_utf8
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for GzipLines {
    type Item = Result<String, ShardError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = String::new();
        match self.next_line(&mut buf) {
            Ok(true) => Some(Ok(buf)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
