//! `oacrawl graph` - co-authorship edge lists from filtered papers

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use oacrawl_core::{PipelineError, SharedProgress};
use oacrawl_openalex::{EdgeSplit, GraphConfig, parse_intervals, run_graph};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Papers JSONL, a .gz file, or a directory of .gz shards
    #[arg(short, long, default_value = "papers.jsonl")]
    pub input: PathBuf,

    /// Edge file; also the base name of interval files
    #[arg(short, long, default_value = "dataset.csv")]
    pub output: PathBuf,

    /// Comma-separated year intervals, e.g. "-1999,2000-2009,2010-"
    #[arg(long, conflicts_with = "per_year", allow_hyphen_values = true)]
    pub format: Option<String>,

    /// Write one <year>.csv per publication year into this directory
    #[arg(long)]
    pub per_year: Option<PathBuf>,

    /// Skip the metadata_<output> topic file
    #[arg(long)]
    pub no_metadata: bool,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory for partial and intermediate files
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep the merged tagged file after splitting
    #[arg(long)]
    pub keep_intermediate: bool,
}

fn graph_config(args: GraphArgs, config: &Config) -> Result<GraphConfig, PipelineError> {
    let split = match (args.format, args.per_year) {
        (Some(format), _) => EdgeSplit::Intervals(parse_intervals(&format)?),
        (None, Some(dir)) => EdgeSplit::PerYear(dir),
        (None, None) => EdgeSplit::All,
    };
    Ok(GraphConfig {
        input: args.input,
        output: args.output,
        split,
        metadata: !args.no_metadata,
        workers: config.workers.resolve(args.workers),
        work_dir: config.paths.resolve_work_dir(args.work_dir),
        keep_intermediate: args.keep_intermediate,
    })
}

pub fn run(args: GraphArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let graph_config = graph_config(args, config)?;

    log::info!("Generating co-authorship graph");
    log::info!("  Input: {}", graph_config.input.display());
    match &graph_config.split {
        EdgeSplit::All => log::info!("  Output: {}", graph_config.output.display()),
        EdgeSplit::Intervals(intervals) => {
            for (i, interval) in intervals.iter().enumerate() {
                log::info!("  Interval {i}: {interval}");
            }
        }
        EdgeSplit::PerYear(dir) => log::info!("  Per-year files in {}", dir.display()),
    }

    let summary = run_graph(&graph_config, progress)?;
    super::report(&summary, progress);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: GraphArgs,
    }

    fn parse(argv: &[&str]) -> Result<GraphArgs, clap::Error> {
        TestCli::try_parse_from(std::iter::once("graph").chain(argv.iter().copied()))
            .map(|c| c.args)
    }

    #[test]
    fn format_becomes_intervals() {
        let args = parse(&["--format", "-1999,2000-"]).unwrap();
        let cfg = graph_config(args, &Config::default()).unwrap();
        let EdgeSplit::Intervals(intervals) = cfg.split else {
            panic!("expected intervals");
        };
        assert_eq!(intervals.len(), 2);
        assert!(cfg.metadata);
        assert_eq!(cfg.input, PathBuf::from("papers.jsonl"));
    }

    #[test]
    fn bad_format_is_config_error() {
        let args = parse(&["--format", "2000-199x"]).unwrap();
        let err = graph_config(args, &Config::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn format_and_per_year_conflict() {
        assert!(parse(&["--format", "2000-", "--per-year", "years"]).is_err());
        let args = parse(&["--per-year", "years", "--no-metadata"]).unwrap();
        let cfg = graph_config(args, &Config::default()).unwrap();
        assert_eq!(cfg.split, EdgeSplit::PerYear(PathBuf::from("years")));
        assert!(cfg.metadata_path().is_none());
    }
}
