//! Per-item processing for every pool stage

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use oacrawl_core::{FileError, LineSource, PartialWriter, open_gzip_file};

use crate::dataset::DatasetCounts;
use crate::filter::{PaperFilter, Verdict};
use crate::graph::write_paper;
use crate::record::{RecordParser, WorkDetail};

/// Statistics from processing a single shard
#[derive(Debug, Clone, Default)]
pub struct FileStats {
    pub lines_scanned: usize,
    /// Author lines without affiliation pairs, work lines that are not
    /// JSON objects, or (graph, dataset) papers without id or year
    pub skipped: usize,
    pub invalid_utf8: usize,
    /// Records written to the partial, or papers counted
    pub written: usize,
    /// Co-authorship edges emitted (graph)
    pub edges: usize,
    pub topic_rejected: usize,
    pub country_rejected: usize,
    pub elapsed: Duration,
}

impl FileStats {
    /// Log stats for non-TTY output
    pub fn log(&self, name: &str) {
        log::debug!(
            "{name}: {} written from {} lines ({} skipped) in {:.1}s",
            self.written,
            self.lines_scanned,
            self.skipped,
            self.elapsed.as_secs_f64()
        );
    }
}

fn shard_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Stream one authors shard, writing a compressed line per author that has
/// at least one affiliation pair.
pub fn process_author_file(
    path: &Path,
    parser: &mut RecordParser,
    out: &mut PartialWriter,
    pb: &ProgressBar,
) -> Result<FileStats, FileError> {
    let start = Instant::now();
    let mut lines = open_gzip_file(path)?;
    pb.set_length(lines.total_bytes());

    let mut stats = FileStats::default();
    let mut line = String::new();
    while lines.next_line(&mut line)? {
        if line.is_empty() {
            continue;
        }
        stats.lines_scanned += 1;
        let record = parser.parse_author_line(&line);
        if record.is_empty() {
            stats.skipped += 1;
        } else {
            record.write_compressed(out)?;
            stats.written += 1;
        }
        if stats.lines_scanned % 4096 == 0 {
            pb.set_position(lines.bytes_read());
        }
    }
    stats.invalid_utf8 = lines.invalid_utf8();
    stats.elapsed = start.elapsed();
    stats.log(&shard_name(path));
    Ok(stats)
}

/// Stream one works shard, copying every accepted raw line to the partial.
pub fn process_work_file(
    path: &Path,
    filter: &PaperFilter<'_>,
    parser: &mut RecordParser,
    out: &mut PartialWriter,
    pb: &ProgressBar,
) -> Result<FileStats, FileError> {
    let start = Instant::now();
    let mut lines = open_gzip_file(path)?;
    pb.set_length(lines.total_bytes());

    let mut stats = FileStats::default();
    let mut line = String::new();
    while lines.next_line(&mut line)? {
        if line.is_empty() {
            continue;
        }
        stats.lines_scanned += 1;
        if stats.lines_scanned % 4096 == 0 {
            pb.set_position(lines.bytes_read());
        }
        let Some(paper) = parser.parse_paper_line(&line) else {
            stats.skipped += 1;
            continue;
        };
        match filter.classify(&paper, parser) {
            Verdict::Keep => {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
                stats.written += 1;
            }
            Verdict::TopicMismatch => stats.topic_rejected += 1,
            Verdict::NoAffiliatedAuthor => stats.country_rejected += 1,
        }
    }
    stats.invalid_utf8 = lines.invalid_utf8();
    stats.elapsed = start.elapsed();
    stats.log(&shard_name(path));
    Ok(stats)
}

/// Paper with an id and a publication year
fn dated<'a>(parser: &mut RecordParser, line: &'a str) -> Option<(WorkDetail<'a>, i32)> {
    let paper = parser.parse_work_detail(line)?;
    let year = paper.publication_year?;
    (!paper.paper_id.is_empty()).then_some((paper, year))
}

/// Write the tagged edge and metadata lines of every dated paper.
pub fn process_graph_source(
    source: &LineSource,
    metadata: bool,
    parser: &mut RecordParser,
    out: &mut PartialWriter,
    pb: &ProgressBar,
) -> Result<FileStats, FileError> {
    let start = Instant::now();
    let mut lines = source.open()?;
    pb.set_length(lines.total_bytes());

    let mut stats = FileStats::default();
    let mut line = String::new();
    while lines.next_line(&mut line)? {
        if line.is_empty() {
            continue;
        }
        stats.lines_scanned += 1;
        if stats.lines_scanned % 4096 == 0 {
            pb.set_position(lines.bytes_read());
        }
        let Some((paper, year)) = dated(parser, &line) else {
            stats.skipped += 1;
            continue;
        };
        stats.edges += write_paper(out, &paper, year, metadata)?;
        stats.written += 1;
    }
    stats.invalid_utf8 = lines.invalid_utf8();
    stats.elapsed = start.elapsed();
    stats.log(&shard_name(source.path()));
    Ok(stats)
}

/// Fold every paper with a publication year into fresh counts. Nothing is
/// written to the partial.
pub fn process_dataset_source(
    source: &LineSource,
    parser: &mut RecordParser,
    pb: &ProgressBar,
) -> Result<(FileStats, DatasetCounts), FileError> {
    let start = Instant::now();
    let mut lines = source.open()?;
    pb.set_length(lines.total_bytes());

    let mut stats = FileStats::default();
    let mut counts = DatasetCounts::default();
    let mut line = String::new();
    while lines.next_line(&mut line)? {
        if line.is_empty() {
            continue;
        }
        stats.lines_scanned += 1;
        if stats.lines_scanned % 4096 == 0 {
            pb.set_position(lines.bytes_read());
        }
        let Some((paper, year)) = parser
            .parse_work_detail(&line)
            .and_then(|p| p.publication_year.map(|y| (p, y)))
        else {
            stats.skipped += 1;
            continue;
        };
        counts.add(&paper, year);
        stats.written += 1;
    }
    stats.invalid_utf8 = lines.invalid_utf8();
    stats.elapsed = start.elapsed();
    stats.log(&shard_name(source.path()));
    Ok((stats, counts))
}
