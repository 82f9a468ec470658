//! Run summaries for every pipeline.
//!
//! Shard-level counters come from [`FileStats`]; the runner folds them
//! into a [`RunSummary`] together with index, merge and output figures.

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use oacrawl_core::fmt_num;

use crate::worker::FileStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Authors,
    Papers,
    Graph,
    Weights,
    Dataset,
}

impl Pipeline {
    pub const fn title(self) -> &'static str {
        match self {
            Self::Authors => "Authors: Affiliation Index",
            Self::Papers => "Papers: Country/Topic Filter",
            Self::Graph => "Graph: Co-authorship Edges",
            Self::Weights => "Weights: Edge Counts",
            Self::Dataset => "Dataset: Distributions",
        }
    }
}

/// Summary of pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub pipeline: Pipeline,
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub workers: usize,
    pub lines_scanned: usize,
    /// Authors without pairs, or works with nothing extractable
    pub skipped: usize,
    pub invalid_utf8: usize,
    /// Compressed authors, kept papers, papers used by graph and dataset,
    /// or distinct weighted pairs
    pub records_written: usize,
    /// Edges emitted by graph workers
    pub edges: usize,
    /// Edges whose year falls in no interval
    pub edges_unrouted: usize,
    pub topic_rejected: usize,
    pub country_rejected: usize,
    /// Authors held by the index (including ones without data)
    pub authors_indexed: usize,
    /// Authors written to the compressed output
    pub authors_serialized: usize,
    pub bytes_merged: u64,
    /// Files written by graph, weights and dataset runs
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl RunSummary {
    pub fn empty(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            total_files: 0,
            completed_files: 0,
            failed_files: 0,
            workers: 0,
            lines_scanned: 0,
            skipped: 0,
            invalid_utf8: 0,
            records_written: 0,
            edges: 0,
            edges_unrouted: 0,
            topic_rejected: 0,
            country_rejected: 0,
            authors_indexed: 0,
            authors_serialized: 0,
            bytes_merged: 0,
            outputs: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Fold per-file stats in
    pub fn from_files(pipeline: Pipeline, files: &[FileStats], total: usize, failed: usize) -> Self {
        let mut s = Self {
            total_files: total,
            completed_files: files.len(),
            failed_files: failed,
            ..Self::empty(pipeline)
        };
        for f in files {
            s.lines_scanned += f.lines_scanned;
            s.skipped += f.skipped;
            s.invalid_utf8 += f.invalid_utf8;
            s.records_written += f.written;
            s.edges += f.edges;
            s.topic_rejected += f.topic_rejected;
            s.country_rejected += f.country_rejected;
        }
        s
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(self.pipeline.title())
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Files"),
            Cell::new(format!(
                "{}/{} ({} failed, {} workers)",
                self.completed_files, self.total_files, self.failed_files, self.workers
            )),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Lines scanned"),
            Cell::new(fmt_num(self.lines_scanned)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Skipped"),
            Cell::new(fmt_num(self.skipped)),
            Cell::new(format!("{:.1}", pct(self.skipped, self.lines_scanned))),
        ]);
        if self.invalid_utf8 > 0 {
            table.add_row(vec![
                Cell::new("Invalid UTF-8").fg(Color::Yellow),
                Cell::new(fmt_num(self.invalid_utf8)).fg(Color::Yellow),
                Cell::new(""),
            ]);
        }

        match self.pipeline {
            Pipeline::Authors => {
                table.add_row(vec![
                    Cell::new("Authors extracted"),
                    Cell::new(fmt_num(self.records_written)),
                    Cell::new(format!(
                        "{:.1}",
                        pct(self.records_written, self.lines_scanned)
                    )),
                ]);
                table.add_row(vec![
                    Cell::new("Authors indexed"),
                    Cell::new(fmt_num(self.authors_indexed)),
                    Cell::new(""),
                ]);
                table.add_row(vec![
                    Cell::new("Authors written").fg(Color::Green),
                    Cell::new(fmt_num(self.authors_serialized)).fg(Color::Green),
                    Cell::new(""),
                ]);
            }
            Pipeline::Papers => {
                table.add_row(vec![
                    Cell::new("Topic rejected"),
                    Cell::new(fmt_num(self.topic_rejected)),
                    Cell::new(format!(
                        "{:.1}",
                        pct(self.topic_rejected, self.lines_scanned)
                    )),
                ]);
                table.add_row(vec![
                    Cell::new("Country rejected"),
                    Cell::new(fmt_num(self.country_rejected)),
                    Cell::new(format!(
                        "{:.1}",
                        pct(self.country_rejected, self.lines_scanned)
                    )),
                ]);
                table.add_row(vec![
                    Cell::new("Papers kept").fg(Color::Green),
                    Cell::new(fmt_num(self.records_written)).fg(Color::Green),
                    Cell::new(format!(
                        "{:.1}",
                        pct(self.records_written, self.lines_scanned)
                    ))
                    .fg(Color::Green),
                ]);
            }
            Pipeline::Graph => {
                table.add_row(vec![
                    Cell::new("Papers used"),
                    Cell::new(fmt_num(self.records_written)),
                    Cell::new(format!(
                        "{:.1}",
                        pct(self.records_written, self.lines_scanned)
                    )),
                ]);
                if self.edges_unrouted > 0 {
                    table.add_row(vec![
                        Cell::new("Edges outside intervals").fg(Color::Yellow),
                        Cell::new(fmt_num(self.edges_unrouted)).fg(Color::Yellow),
                        Cell::new(format!("{:.1}", pct(self.edges_unrouted, self.edges))),
                    ]);
                }
                let routed = self.edges.saturating_sub(self.edges_unrouted);
                table.add_row(vec![
                    Cell::new("Edges written").fg(Color::Green),
                    Cell::new(fmt_num(routed)).fg(Color::Green),
                    Cell::new(""),
                ]);
            }
            Pipeline::Weights => {
                table.add_row(vec![
                    Cell::new("Weighted pairs").fg(Color::Green),
                    Cell::new(fmt_num(self.records_written)).fg(Color::Green),
                    Cell::new(""),
                ]);
            }
            Pipeline::Dataset => {
                table.add_row(vec![
                    Cell::new("Papers counted").fg(Color::Green),
                    Cell::new(fmt_num(self.records_written)).fg(Color::Green),
                    Cell::new(format!(
                        "{:.1}",
                        pct(self.records_written, self.lines_scanned)
                    ))
                    .fg(Color::Green),
                ]);
            }
        }

        if !self.outputs.is_empty() {
            table.add_row(vec![
                Cell::new("Files written"),
                Cell::new(self.outputs.len().to_string()),
                Cell::new(""),
            ]);
        }
        table.add_row(vec![
            Cell::new("Time"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!("=== {} ===", self.pipeline.title());
        log::info!(
            "Files: {}/{} completed ({} failed, {} workers)",
            self.completed_files,
            self.total_files,
            self.failed_files,
            self.workers
        );
        log::info!(
            "Lines: {} scanned, {} skipped, {} invalid UTF-8",
            fmt_num(self.lines_scanned),
            fmt_num(self.skipped),
            fmt_num(self.invalid_utf8)
        );
        match self.pipeline {
            Pipeline::Authors => log::info!(
                "Authors: {} extracted, {} indexed, {} written",
                fmt_num(self.records_written),
                fmt_num(self.authors_indexed),
                fmt_num(self.authors_serialized)
            ),
            Pipeline::Papers => log::info!(
                "Papers: {} kept ({} topic rejected, {} country rejected)",
                fmt_num(self.records_written),
                fmt_num(self.topic_rejected),
                fmt_num(self.country_rejected)
            ),
            Pipeline::Graph => log::info!(
                "Graph: {} papers, {} edges ({} outside intervals)",
                fmt_num(self.records_written),
                fmt_num(self.edges),
                fmt_num(self.edges_unrouted)
            ),
            Pipeline::Weights => {
                log::info!("Weights: {} pairs", fmt_num(self.records_written))
            }
            Pipeline::Dataset => {
                log::info!("Dataset: {} papers counted", fmt_num(self.records_written))
            }
        }
        for path in &self.outputs {
            log::info!("Wrote {}", path.display());
        }
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.lines_scanned > 0 && !self.elapsed.is_zero() {
            let per_sec = self.lines_scanned as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {per_sec:.0} lines/sec");
        }
    }
}
