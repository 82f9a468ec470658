//! Pipeline orchestration: discover → workers → merge → (aggregate, split)

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use oacrawl_core::{
    Corpus, LineSource, PipelineError, PoolPlan, ProgressContext, ShardError, find_gz_files,
    merge_partials, open_range, plan_sources, remove_partials, run_workers, split_ranges,
};
use rustc_hash::FxHashMap;

use crate::aggregate::AuthorAggregator;
use crate::config::{
    AuthorsConfig, DatasetConfig, GraphConfig, PapersConfig, TopicSpec, WeightsConfig,
};
use crate::dataset::DatasetCounts;
use crate::filter::{AuthorAllowlist, FilterCriteria, PaperFilter, TopicFilter};
use crate::graph::split_tagged;
use crate::index::AffiliationIndex;
use crate::record::RecordParser;
use crate::stats::{Pipeline, RunSummary};
use crate::worker::{
    FileStats, process_author_file, process_dataset_source, process_graph_source,
    process_work_file,
};

/// Shards of one snapshot corpus. A missing corpus directory is a config error.
fn discover(snapshot: &Path, corpus: Corpus) -> Result<Vec<PathBuf>, PipelineError> {
    let dir = corpus.dir(snapshot);
    find_gz_files(&dir).map_err(|e| match e {
        ShardError::NotFound(p) => PipelineError::config(format!(
            "{corpus} directory {} does not exist",
            p.display()
        )),
        other => PipelineError::infra(
            format!("cannot list {}", dir.display()),
            io::Error::other(other.to_string()),
        ),
    })
}

/// Reading `input` failed; a missing input is a config error
fn input_error(input: &Path, e: ShardError) -> PipelineError {
    match e {
        ShardError::NotFound(p) => {
            PipelineError::config(format!("input {} does not exist", p.display()))
        }
        other => PipelineError::infra(
            format!("cannot read {}", input.display()),
            io::Error::other(other.to_string()),
        ),
    }
}

/// Work items for a papers file, `.gz` file or shard directory
fn plan_input(input: &Path, workers: usize) -> Result<Vec<LineSource>, PipelineError> {
    plan_sources(input, workers).map_err(|e| input_error(input, e))
}

fn remove_stale(path: &Path) -> Result<(), PipelineError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::infra(
            format!("cannot remove stale {}", path.display()),
            e,
        )),
    }
}

/// Build the compressed affiliation index from `data/authors`.
pub fn run_authors(
    config: &AuthorsConfig,
    progress: &ProgressContext,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();

    let files = discover(&config.snapshot_dir, Corpus::Authors)?;
    if files.is_empty() {
        log::warn!("No author shards to process");
        return Ok(RunSummary::empty(Pipeline::Authors));
    }

    let extract = config.extract_path();
    remove_stale(&extract)?;

    // Phase 1: extract compressed lines per shard
    let plan = PoolPlan {
        label: "authors",
        work_dir: &config.work_dir,
        parallelism: config.workers,
    };
    let outcome = run_workers(
        &files,
        &plan,
        progress,
        RecordParser::new,
        |path, parser, out, pb| process_author_file(path, parser, out, pb),
    )?;
    let merged = merge_partials(&outcome.partials, &extract)?;

    // Phase 2: fold repeated authors into one timeline each
    let stage = progress.stage_line("aggregate");
    stage.set_message(format!("reading {}", extract.display()));
    let mut agg = AuthorAggregator::new(config.country_code.as_deref(), None);
    agg.merge_file(&extract)
        .map_err(|e| PipelineError::infra(format!("cannot read {}", extract.display()), e))?;
    let (index, agg_stats) = agg.finish();
    log::info!(
        "Aggregated {} authors from {} lines ({} filtered)",
        index.len(),
        agg_stats.lines,
        agg_stats.filtered
    );

    // Phase 3: write the index
    stage.set_message(format!("writing {}", config.output.display()));
    let out = File::create(&config.output).map_err(|e| {
        PipelineError::infra(format!("cannot create {}", config.output.display()), e)
    })?;
    let written = index
        .write_compressed(&mut BufWriter::new(out))
        .map_err(|e| PipelineError::infra(format!("cannot write {}", config.output.display()), e))?;
    stage.finish_and_clear();

    if config.keep_intermediate {
        log::info!("Kept intermediate {}", extract.display());
    } else if let Err(e) = fs::remove_file(&extract) {
        log::warn!("Failed to remove {}: {e}", extract.display());
    }

    let mut summary = RunSummary::from_files(
        Pipeline::Authors,
        &outcome.file_stats,
        files.len(),
        outcome.failed_files,
    );
    summary.workers = outcome.workers;
    summary.authors_indexed = index.len();
    summary.authors_serialized = written;
    summary.bytes_merged = merged.bytes;
    summary.elapsed = start.elapsed();
    log::info!(
        "Wrote {} authors to {}",
        summary.authors_serialized,
        config.output.display()
    );
    Ok(summary)
}

/// Filter `data/works` into raw matching lines.
pub fn run_papers(
    config: &PapersConfig,
    progress: &ProgressContext,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    config.validate()?;

    let author_allowlist = config
        .author_allowlist
        .as_deref()
        .map(AuthorAllowlist::load)
        .transpose()?;
    let topic = config.topic.as_ref().map(|t| match t {
        TopicSpec::Field(id) => TopicFilter::field(id),
        TopicSpec::Text(text) => TopicFilter::text(text, config.topic_case_sensitive),
    });
    let criteria = FilterCriteria {
        country_code: config.country().map(String::from),
        topic,
        topic_scope: config.topic_scope,
        author_allowlist,
    };

    let index = match (criteria.country(), config.index.as_deref()) {
        (Some(country), Some(path)) => {
            let stage = progress.stage_line("index");
            stage.set_message(format!("loading {}", path.display()));
            let (index, _) = AffiliationIndex::load(
                path,
                config.index_load,
                Some(country),
                criteria.author_allowlist.as_ref(),
            )?;
            stage.finish_and_clear();
            Some(index)
        }
        (None, Some(path)) => {
            log::info!("No country filter; not loading {}", path.display());
            None
        }
        _ => None,
    };
    let filter = PaperFilter::new(&criteria, index.as_ref())?;

    let files = discover(&config.snapshot_dir, Corpus::Works)?;
    if files.is_empty() {
        log::warn!("No work shards to process");
        return Ok(RunSummary::empty(Pipeline::Papers));
    }

    if fs::metadata(&config.output).is_ok_and(|m| m.len() > 0) {
        log::warn!(
            "{} already has data; new papers will be appended",
            config.output.display()
        );
    }

    let plan = PoolPlan {
        label: "papers",
        work_dir: &config.work_dir,
        parallelism: config.workers,
    };
    let outcome = run_workers(
        &files,
        &plan,
        progress,
        RecordParser::new,
        |path, parser, out, pb| process_work_file(path, &filter, parser, out, pb),
    )?;
    let merged = merge_partials(&outcome.partials, &config.output)?;

    let mut summary = RunSummary::from_files(
        Pipeline::Papers,
        &outcome.file_stats,
        files.len(),
        outcome.failed_files,
    );
    summary.workers = outcome.workers;
    summary.authors_indexed = index.as_ref().map_or(0, AffiliationIndex::len);
    summary.bytes_merged = merged.bytes;
    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Turn papers into co-authorship edge files plus topic metadata.
pub fn run_graph(
    config: &GraphConfig,
    progress: &ProgressContext,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();

    let sources = plan_input(&config.input, config.workers)?;
    if sources.is_empty() {
        log::warn!("No papers to process in {}", config.input.display());
        return Ok(RunSummary::empty(Pipeline::Graph));
    }

    let tagged = config.tagged_path();
    remove_stale(&tagged)?;

    // Phase 1: tagged edge and metadata lines per source
    let plan = PoolPlan {
        label: "graph",
        work_dir: &config.work_dir,
        parallelism: config.workers,
    };
    let outcome = run_workers(
        &sources,
        &plan,
        progress,
        RecordParser::new,
        |source, parser, out, pb| process_graph_source(source, config.metadata, parser, out, pb),
    )?;
    let merged = merge_partials(&outcome.partials, &tagged)?;

    // Phase 2: route into the edge files
    let metadata = config.metadata_path();
    let split = split_tagged(
        &tagged,
        &config.split,
        &config.output,
        metadata.as_deref(),
        progress,
    )?;
    if split.malformed > 0 {
        log::warn!("{} malformed lines in {}", split.malformed, tagged.display());
    }
    if split.unrouted > 0 {
        log::warn!("{} edges fall outside every interval", split.unrouted);
    }

    if config.keep_intermediate {
        log::info!("Kept intermediate {}", tagged.display());
    } else if let Err(e) = fs::remove_file(&tagged) {
        log::warn!("Failed to remove {}: {e}", tagged.display());
    }

    let mut summary = RunSummary::from_files(
        Pipeline::Graph,
        &outcome.file_stats,
        sources.len(),
        outcome.failed_files,
    );
    summary.workers = outcome.workers;
    summary.edges_unrouted = split.unrouted;
    summary.bytes_merged = merged.bytes;
    summary.outputs = split.outputs;
    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Count how often each unordered author pair occurs in an edge file and
/// write `a,b,count` lines sorted by pair.
pub fn run_weights(
    config: &WeightsConfig,
    progress: &ProgressContext,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    let input = &config.input;
    let output = config.output_path();

    let ranges = split_ranges(input, 1).map_err(|e| input_error(input, e))?;
    let mut lines = open_range(&ranges[0]).map_err(|e| input_error(input, e))?;
    let pb = progress.bytes_bar("weights", lines.total_bytes());

    let mut summary = RunSummary::empty(Pipeline::Weights);
    let mut weights: FxHashMap<String, u64> = FxHashMap::default();
    let mut key = String::new();
    let mut line = String::new();
    while lines.next_line(&mut line).map_err(|e| input_error(input, e))? {
        if line.is_empty() {
            continue;
        }
        summary.lines_scanned += 1;
        if summary.lines_scanned % 4096 == 0 {
            pb.set_position(lines.bytes_read());
        }
        let mut fields = line.split(',');
        let (Some(_), Some(_), Some(a), Some(b)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            summary.skipped += 1;
            continue;
        };
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        key.clear();
        key.push_str(a);
        key.push(',');
        key.push_str(b);
        match weights.get_mut(key.as_str()) {
            Some(n) => *n += 1,
            None => {
                weights.insert(key.clone(), 1);
            }
        }
    }
    pb.finish_and_clear();
    summary.invalid_utf8 = lines.invalid_utf8();
    log::info!(
        "Loaded {} weighted pairs from {}",
        weights.len(),
        input.display()
    );

    let mut pairs: Vec<_> = weights.into_iter().collect();
    pairs.sort_unstable();
    let write_err = |e| PipelineError::infra(format!("cannot write {}", output.display()), e);
    let file = File::create(&output).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    for (pair, n) in &pairs {
        writeln!(out, "{pair},{n}").map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;

    summary.total_files = 1;
    summary.completed_files = 1;
    summary.workers = 1;
    summary.records_written = pairs.len();
    summary.outputs = vec![output];
    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Write per-year, per-author, per-paper and per-topic distributions.
pub fn run_dataset(
    config: &DatasetConfig,
    progress: &ProgressContext,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();

    let sources = plan_input(&config.input, config.workers)?;
    if sources.is_empty() {
        log::warn!("No papers to process in {}", config.input.display());
        return Ok(RunSummary::empty(Pipeline::Dataset));
    }

    let plan = PoolPlan {
        label: "dataset",
        work_dir: &config.work_dir,
        parallelism: config.workers,
    };
    let outcome = run_workers(
        &sources,
        &plan,
        progress,
        RecordParser::new,
        |source, parser, _out, pb| process_dataset_source(source, parser, pb),
    )?;
    // Workers only count; their partials stay empty
    remove_partials(&outcome.partials);

    let stage = progress.stage_line("dataset");
    stage.set_message("merging worker counts");
    let mut counts = DatasetCounts::default();
    let mut files: Vec<FileStats> = Vec::with_capacity(outcome.file_stats.len());
    for (stats, batch) in outcome.file_stats {
        counts.merge(batch);
        files.push(stats);
    }

    stage.set_message(format!("writing {}", config.output_dir.display()));
    let outputs = counts.write_csvs(&config.output_dir).map_err(|e| {
        PipelineError::infra(format!("cannot write {}", config.output_dir.display()), e)
    })?;
    stage.finish_and_clear();

    let mut summary = RunSummary::from_files(
        Pipeline::Dataset,
        &files,
        sources.len(),
        outcome.failed_files,
    );
    summary.workers = outcome.workers;
    summary.outputs = outputs;
    summary.elapsed = start.elapsed();
    Ok(summary)
}
