//! `oacrawl authors` - build the compressed affiliation index

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use oacrawl_core::SharedProgress;
use oacrawl_openalex::{AuthorsConfig, run_authors};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct AuthorsArgs {
    /// OpenAlex snapshot root (contains data/authors)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file for compressed authors
    #[arg(short, long, default_value = "authors_compressed.jsonl")]
    pub output: PathBuf,

    /// Only keep authors affiliated with this country at some point (e.g. US)
    #[arg(short = 'c', long, value_parser = super::parse_country)]
    pub country: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory for partial and intermediate files
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep the merged extraction file after aggregation
    #[arg(long)]
    pub keep_intermediate: bool,
}

pub fn run(args: AuthorsArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let authors_config = AuthorsConfig {
        snapshot_dir: args.input,
        output: args.output,
        country_code: args.country,
        workers: config.workers.resolve(args.workers),
        work_dir: config.paths.resolve_work_dir(args.work_dir),
        keep_intermediate: args.keep_intermediate,
    };

    log::info!("Building affiliation index");
    log::info!("  Snapshot: {}", authors_config.snapshot_dir.display());
    log::info!("  Output: {}", authors_config.output.display());
    log::info!(
        "  Country: {}",
        authors_config.country_code.as_deref().unwrap_or("(any)")
    );

    let summary = run_authors(&authors_config, progress)?;
    super::report(&summary, progress);
    Ok(())
}
