//! `oacrawl papers` - filter works by author affiliation and topic

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use oacrawl_core::SharedProgress;
use oacrawl_openalex::{IndexLoad, PapersConfig, TopicScope, TopicSpec, run_papers};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct PapersArgs {
    /// OpenAlex snapshot root (contains data/works)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file; matching lines are appended
    #[arg(short, long, default_value = "papers.jsonl")]
    pub output: PathBuf,

    /// Keep papers with an author affiliated with this country (e.g. US)
    #[arg(short = 'c', long, value_parser = super::parse_country, requires = "index")]
    pub country: Option<String>,

    /// Compressed authors file from `oacrawl authors`
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// OpenAlex field id (e.g. 17) or field URL
    #[arg(short = 't', long, conflicts_with = "topic_text")]
    pub topic: Option<String>,

    /// Free-text topic, matched anywhere in the record
    #[arg(long)]
    pub topic_text: Option<String>,

    /// Match --topic-text case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// What the topic is matched against
    #[arg(long, value_enum)]
    pub topic_scope: Option<CliTopicScope>,

    /// File with one eligible author id per line
    #[arg(short = 'a', long)]
    pub author_file: Option<PathBuf>,

    /// How to read the index file
    #[arg(long, value_enum)]
    pub index_load: Option<CliIndexLoad>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory for partial files
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum CliTopicScope {
    Record,
    AuthorIds,
}

impl From<CliTopicScope> for TopicScope {
    fn from(s: CliTopicScope) -> Self {
        match s {
            CliTopicScope::Record => TopicScope::Record,
            CliTopicScope::AuthorIds => TopicScope::AuthorIds,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum CliIndexLoad {
    Mmap,
    Stream,
}

impl From<CliIndexLoad> for IndexLoad {
    fn from(m: CliIndexLoad) -> Self {
        match m {
            CliIndexLoad::Mmap => IndexLoad::Mmap,
            CliIndexLoad::Stream => IndexLoad::Stream,
        }
    }
}

fn papers_config(args: PapersArgs, config: &Config) -> PapersConfig {
    let topic = match (args.topic, args.topic_text) {
        (Some(field), _) => Some(TopicSpec::Field(field)),
        (None, Some(text)) => Some(TopicSpec::Text(text)),
        (None, None) => None,
    };
    PapersConfig {
        snapshot_dir: args.input,
        output: args.output,
        country_code: args.country,
        index: args.index,
        index_load: args.index_load.map_or(config.papers.index_load, Into::into),
        topic,
        topic_case_sensitive: args.case_sensitive || config.papers.topic_case_sensitive,
        topic_scope: args.topic_scope.map_or(config.papers.topic_scope, Into::into),
        author_allowlist: args.author_file,
        workers: config.workers.resolve(args.workers),
        work_dir: config.paths.resolve_work_dir(args.work_dir),
    }
}

pub fn run(args: PapersArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let papers_config = papers_config(args, config);

    log::info!("Filtering papers");
    log::info!("  Snapshot: {}", papers_config.snapshot_dir.display());
    log::info!("  Output: {}", papers_config.output.display());
    log::info!(
        "  Country: {}",
        papers_config.country().unwrap_or("(none)")
    );
    if let Some(topic) = &papers_config.topic {
        log::info!("  Topic: {topic:?} ({})", papers_config.topic_scope);
    }

    let summary = run_papers(&papers_config, progress)?;
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
        args: PapersArgs,
    }

    fn parse(argv: &[&str]) -> Result<PapersArgs, clap::Error> {
        TestCli::try_parse_from(std::iter::once("papers").chain(argv.iter().copied()))
            .map(|c| c.args)
    }

    #[test]
    fn cli_flags_override_config() {
        let args = parse(&[
            "-i", "snap", "-c", "us", "--index", "a.jsonl", "--index-load", "stream",
            "--topic-scope", "author-ids", "-w", "3",
        ])
        .unwrap();
        let cfg = papers_config(args, &Config::default());
        assert_eq!(cfg.country_code.as_deref(), Some("US"));
        assert_eq!(cfg.index_load, IndexLoad::Stream);
        assert_eq!(cfg.topic_scope, TopicScope::AuthorIds);
        assert_eq!(cfg.workers, 3);
    }

    #[test]
    fn config_defaults_apply() {
        let args = parse(&["-i", "snap", "--topic-text", "Physics"]).unwrap();
        let mut config = Config::default();
        config.papers.topic_case_sensitive = true;
        config.papers.index_load = IndexLoad::Stream;
        let cfg = papers_config(args, &config);
        assert_eq!(cfg.topic, Some(TopicSpec::Text("Physics".into())));
        assert!(cfg.topic_case_sensitive);
        assert_eq!(cfg.index_load, IndexLoad::Stream);
    }

    #[test]
    fn field_and_text_topics_conflict() {
        assert!(parse(&["-i", "s", "-t", "17", "--topic-text", "x"]).is_err());
    }

    #[test]
    fn country_requires_index() {
        let err = parse(&["-i", "s", "-c", "US"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
