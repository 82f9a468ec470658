//! `oacrawl dataset` - distribution CSVs for a set of papers

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use oacrawl_core::SharedProgress;
use oacrawl_openalex::{DatasetConfig, run_dataset};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Papers JSONL, a .gz file, or a directory of .gz shards
    #[arg(short, long, default_value = "papers.jsonl")]
    pub input: PathBuf,

    /// Directory for the CSV files
    #[arg(short, long, default_value = "stats")]
    pub output: PathBuf,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory for partial files
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
}

pub fn run(args: DatasetArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let dataset_config = DatasetConfig {
        input: args.input,
        output_dir: args.output,
        workers: config.workers.resolve(args.workers),
        work_dir: config.paths.resolve_work_dir(args.work_dir),
    };

    log::info!("Computing dataset statistics");
    log::info!("  Input: {}", dataset_config.input.display());
    log::info!("  Output: {}", dataset_config.output_dir.display());

    let summary = run_dataset(&dataset_config, progress)?;
    super::report(&summary, progress);
    Ok(())
}
