//! oacrawl - OpenAlex snapshot affiliation index and paper filter
//!
//! `authors` builds a per-author, per-year country index from the snapshot's
//! author shards; `papers` keeps works whose authors were affiliated with a
//! country in the publication year. `graph`, `weights` and `dataset` turn
//! the kept papers into co-authorship edge lists and distributions.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use oacrawl_core::PipelineError;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "oacrawl")]
#[command(about = "Affiliation index and country/topic paper filter for OpenAlex snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./oacrawl.toml or ~/.config/oacrawl/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the compressed author affiliation index
    Authors(cmd::authors::AuthorsArgs),
    /// Filter works by author country and topic
    Papers(cmd::papers::PapersArgs),
    /// Co-authorship edge lists from papers
    Graph(cmd::graph::GraphArgs),
    /// Count repeated author pairs in an edge list
    Weights(cmd::weights::WeightsArgs),
    /// Per-year, per-author and per-topic distributions of papers
    Dataset(cmd::dataset::DatasetArgs),
    /// Show current configuration
    Config,
}

/// Exit code for an error that escaped to `main`
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .and_then(|e| u8::try_from(e.exit_code()).ok())
        .unwrap_or(1)
}

/// The single stderr line printed for a failed run
fn error_line(err: &anyhow::Error) -> String {
    format!("Error: {err:#}")
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_line(&e));
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(oacrawl_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug (progress bars show activity)
    //   non-TTY: info unless --debug (logs are the only progress indicator)
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let verbosity = oacrawl_core::Verbosity::from_flags(is_tty, cli.debug);
    oacrawl_core::init_logging(verbosity, multi);

    // A config file that cannot be read or parsed is a configuration error
    let config = if let Some(path) = &cli.config {
        Config::from_file(path)
    } else {
        Config::load()
    }
    .map_err(|e| PipelineError::config(format!("{e:#}")))?;

    match cli.command {
        Command::Authors(args) => cmd::authors::run(args, &config, &progress),
        Command::Papers(args) => cmd::papers::run(args, &config, &progress),
        Command::Graph(args) => cmd::graph::run(args, &config, &progress),
        Command::Weights(args) => cmd::weights::run(args, &progress),
        Command::Dataset(args) => cmd::dataset::run(args, &config, &progress),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            let env_threads = std::env::var(oacrawl_core::THREADS_ENV).ok();
            table.add_row(vec![
                "Workers",
                &format!(
                    "{} (config: {}, {}: {})",
                    config.workers.resolve(None),
                    config
                        .workers
                        .default
                        .map_or_else(|| "unset".to_string(), |n| n.to_string()),
                    oacrawl_core::THREADS_ENV,
                    env_threads.as_deref().unwrap_or("unset")
                ),
            ]);
            table.add_row(vec![
                "Work dir",
                &config.paths.resolve_work_dir(None).display().to_string(),
            ]);
            table.add_row(vec!["Index load", &config.papers.index_load.to_string()]);
            table.add_row(vec![
                "Topic case-sensitive",
                &config.papers.topic_case_sensitive.to_string(),
            ]);
            table.add_row(vec!["Topic scope", &config.papers.topic_scope.to_string()]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
