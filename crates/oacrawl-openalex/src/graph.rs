//! Co-authorship edge lists from filtered papers.
//!
//! Workers turn every paper into tagged lines in their partial:
//!
//! - `e,<year>,<paper>,<a>,<b>`: one per author pair (`i < j` in authorship
//!   order); a single-author paper gives the self-loop `a,a`
//! - `m,<paper>,<topic>;<topic>`: concept names, commas replaced by spaces
//!
//! The merged partials are then routed by [`split_tagged`] into the edge
//! outputs chosen by an [`EdgeSplit`] and the metadata file. Ids lose their
//! `https://openalex.org/` prefix.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use oacrawl_core::{PipelineError, ProgressContext, open_range, split_ranges};
use rustc_hash::FxHashMap;

use crate::record::WorkDetail;

/// Prefix of OpenAlex entity URLs
pub const OPENALEX_URL_PREFIX: &str = "https://openalex.org/";

const OUT_BUF_SIZE: usize = 256 * 1024;

/// `W123` from `https://openalex.org/W123`; other ids pass through
pub fn short_id(id: &str) -> &str {
    id.strip_prefix(OPENALEX_URL_PREFIX).unwrap_or(id)
}

/// Inclusive range of publication years; an open bound matches everything
/// on that side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearInterval {
    pub start: Option<i32>,
    pub end: Option<i32>,
    /// As written, used to name the output file
    text: String,
}

impl YearInterval {
    pub fn contains(&self, year: i32) -> bool {
        self.start.map_or(true, |s| year >= s) && self.end.map_or(true, |e| year <= e)
    }

    /// File-name label: `2000-2010` becomes `2000_2010`
    pub fn label(&self) -> String {
        self.text.replace('-', "_")
    }
}

impl fmt::Display for YearInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<i32>, open: &str| {
            b.map_or_else(|| open.to_string(), |y| y.to_string())
        };
        write!(
            f,
            "{} to {}",
            bound(self.start, "START"),
            bound(self.end, "END")
        )
    }
}

impl FromStr for YearInterval {
    type Err = String;

    /// `2000-2010`, `-1999`, `2011-`, `-`, or a single year `2005`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let year = |part: &str| -> Result<Option<i32>, String> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse::<i32>()
                .map(Some)
                .map_err(|_| format!("invalid year '{part}' in interval '{text}'"))
        };
        let (start, end) = match text.split_once('-') {
            Some((a, b)) => (year(a)?, year(b)?),
            None if text.is_empty() => return Err("empty year interval".to_string()),
            None => {
                let y = year(text)?;
                (y, y)
            }
        };
        if let (Some(a), Some(b)) = (start, end) {
            if a > b {
                return Err(format!("interval '{text}' ends before it starts"));
            }
        }
        Ok(Self {
            start,
            end,
            text: text.to_string(),
        })
    }
}

/// Parse a comma-separated interval list such as `-1999,2000-2009,2010-`
pub fn parse_intervals(spec: &str) -> Result<Vec<YearInterval>, PipelineError> {
    spec.split(',')
        .map(|part| part.parse().map_err(PipelineError::config))
        .collect()
}

/// Where edge lines end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeSplit {
    /// Every edge in the output file
    All,
    /// One file per interval, `<label>_<output name>`; a paper goes to the
    /// first interval holding its year
    Intervals(Vec<YearInterval>),
    /// `<dir>/<year>.csv`, appended to
    PerYear(PathBuf),
}

/// Sibling of `output` named `<prefix><output file name>`
pub fn prefixed_path(output: &Path, prefix: &str) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{prefix}{name}"))
}

/// Write the tagged edge lines (and the metadata line when `metadata`) of
/// one paper. Returns the number of edges.
pub fn write_paper<W: Write>(
    out: &mut W,
    paper: &WorkDetail<'_>,
    year: i32,
    metadata: bool,
) -> io::Result<usize> {
    let id = short_id(&paper.paper_id);
    let authors: Vec<&str> = paper.author_ids.iter().map(|a| short_id(a)).collect();

    let mut edges = 0;
    if let [only] = authors.as_slice() {
        writeln!(out, "e,{year},{id},{only},{only}")?;
        edges = 1;
    } else {
        for (i, a) in authors.iter().enumerate() {
            for b in &authors[i + 1..] {
                writeln!(out, "e,{year},{id},{a},{b}")?;
                edges += 1;
            }
        }
    }

    if metadata {
        write!(out, "m,{id},")?;
        for (i, topic) in paper.topics.iter().enumerate() {
            if i > 0 {
                out.write_all(b";")?;
            }
            out.write_all(topic.replace(',', " ").as_bytes())?;
        }
        out.write_all(b"\n")?;
    }
    Ok(edges)
}

/// Counters from routing the tagged file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub edges: usize,
    /// Edges whose year is in no interval
    pub unrouted: usize,
    pub metadata: usize,
    /// Lines without a known tag or year
    pub malformed: usize,
    /// Files written, in creation order
    pub outputs: Vec<PathBuf>,
}

type Out = BufWriter<File>;

/// Open edge writers
enum Targets {
    One(Out),
    Intervals(Vec<(YearInterval, Out)>),
    PerYear {
        dir: PathBuf,
        files: FxHashMap<i32, Out>,
    },
}

fn create(path: &Path, outputs: &mut Vec<PathBuf>) -> Result<Out, PipelineError> {
    let file = File::create(path)
        .map_err(|e| PipelineError::infra(format!("cannot create {}", path.display()), e))?;
    outputs.push(path.to_path_buf());
    Ok(BufWriter::with_capacity(OUT_BUF_SIZE, file))
}

impl Targets {
    fn open(
        split: &EdgeSplit,
        output: &Path,
        outputs: &mut Vec<PathBuf>,
    ) -> Result<Self, PipelineError> {
        Ok(match split {
            EdgeSplit::All => Self::One(create(output, outputs)?),
            EdgeSplit::Intervals(intervals) => Self::Intervals(
                intervals
                    .iter()
                    .map(|iv| {
                        let path = prefixed_path(output, &format!("{}_", iv.label()));
                        create(&path, outputs).map(|w| (iv.clone(), w))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            EdgeSplit::PerYear(dir) => {
                fs::create_dir_all(dir).map_err(|e| {
                    PipelineError::infra(format!("cannot create {}", dir.display()), e)
                })?;
                Self::PerYear {
                    dir: dir.clone(),
                    files: FxHashMap::default(),
                }
            }
        })
    }

    /// Writer for `year`, `None` when no interval holds it
    fn pick(
        &mut self,
        year: i32,
        outputs: &mut Vec<PathBuf>,
    ) -> Result<Option<&mut Out>, PipelineError> {
        match self {
            Self::One(w) => Ok(Some(w)),
            Self::Intervals(list) => Ok(list
                .iter_mut()
                .find(|(iv, _)| iv.contains(year))
                .map(|(_, w)| w)),
            Self::PerYear { dir, files } => {
                if !files.contains_key(&year) {
                    let path = dir.join(format!("{year}.csv"));
                    let file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .map_err(|e| {
                            PipelineError::infra(format!("cannot open {}", path.display()), e)
                        })?;
                    outputs.push(path);
                    files.insert(year, BufWriter::with_capacity(OUT_BUF_SIZE, file));
                }
                Ok(files.get_mut(&year))
            }
        }
    }

    fn flush(self) -> io::Result<()> {
        match self {
            Self::One(mut w) => w.flush(),
            Self::Intervals(list) => list.into_iter().try_for_each(|(_, mut w)| w.flush()),
            Self::PerYear { files, .. } => files.into_values().try_for_each(|mut w| w.flush()),
        }
    }
}

/// Route the merged tagged file into edge files and `metadata`.
///
/// Edge lines lose their tag: `<year>,<paper>,<a>,<b>`.
pub fn split_tagged(
    tagged: &Path,
    split: &EdgeSplit,
    output: &Path,
    metadata: Option<&Path>,
    progress: &ProgressContext,
) -> Result<SplitStats, PipelineError> {
    let mut stats = SplitStats::default();
    let mut targets = Targets::open(split, output, &mut stats.outputs)?;
    let mut meta = metadata
        .map(|p| create(p, &mut stats.outputs))
        .transpose()?;

    let read_err = |e: oacrawl_core::ShardError| {
        PipelineError::infra(
            format!("cannot read {}", tagged.display()),
            io::Error::other(e.to_string()),
        )
    };
    let write_err = |e: io::Error| PipelineError::infra("cannot write graph output", e);

    let ranges = split_ranges(tagged, 1).map_err(read_err)?;
    let mut lines = open_range(&ranges[0]).map_err(read_err)?;
    let pb = progress.bytes_bar("split", lines.total_bytes());
    let mut line = String::new();
    let mut n = 0usize;
    while lines.next_line(&mut line).map_err(read_err)? {
        n += 1;
        if n % 4096 == 0 {
            pb.set_position(lines.bytes_read());
        }
        match line.split_once(',') {
            Some(("e", edge)) => {
                let Some(year) = edge
                    .split_once(',')
                    .and_then(|(y, _)| y.parse::<i32>().ok())
                else {
                    stats.malformed += 1;
                    continue;
                };
                match targets.pick(year, &mut stats.outputs)? {
                    Some(w) => {
                        w.write_all(edge.as_bytes()).map_err(write_err)?;
                        w.write_all(b"\n").map_err(write_err)?;
                        stats.edges += 1;
                    }
                    None => stats.unrouted += 1,
                }
            }
            Some(("m", entry)) => {
                if let Some(w) = meta.as_mut() {
                    w.write_all(entry.as_bytes()).map_err(write_err)?;
                    w.write_all(b"\n").map_err(write_err)?;
                    stats.metadata += 1;
                }
            }
            _ => stats.malformed += 1,
        }
    }
    pb.finish_and_clear();

    targets.flush().map_err(write_err)?;
    if let Some(mut w) = meta {
        w.flush().map_err(write_err)?;
    }
    if lines.invalid_utf8() > 0 {
        log::warn!(
            "{}: {} lines with invalid UTF-8 skipped",
            tagged.display(),
            lines.invalid_utf8()
        );
    }
    Ok(stats)
}
