//! `oacrawl weights` - count repeated author pairs in an edge list

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use oacrawl_core::SharedProgress;
use oacrawl_openalex::{WeightsConfig, run_weights};

#[derive(Args, Debug)]
pub struct WeightsArgs {
    /// Edge CSV written by `oacrawl graph`
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (default: weighted_<input name> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: WeightsArgs, progress: &SharedProgress) -> Result<()> {
    let config = WeightsConfig {
        input: args.input,
        output: args.output,
    };
    log::info!("Weighting edges of {}", config.input.display());
    log::info!("  Output: {}", config.output_path().display());

    let summary = run_weights(&config, progress)?;
    super::report(&summary, progress);
    Ok(())
}
