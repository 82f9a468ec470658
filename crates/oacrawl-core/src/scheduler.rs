//! Fixed-size worker pool over a list of local work items (shards or
//! byte ranges of one file).
//!
//! Each worker owns one partial output file for its whole lifetime and
//! claims shards greedily from a shared [`WorkQueue`]. Per-shard failures
//! are logged and skipped; failures writing the partial are fatal.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::error::{PipelineError, ShardError};
use crate::progress::ProgressContext;
use crate::source::LineSource;
use crate::work_queue::{WorkQueue, worker_count};

/// Buffer size for partial output writers
const PARTIAL_BUF_SIZE: usize = 1024 * 1024;

/// Partial output writer handed to the per-shard closure
pub type PartialWriter = BufWriter<File>;

/// Failure while processing one shard
#[derive(Debug)]
pub enum FileError {
    /// Bad input shard: logged, counted, skipped
    Shard(ShardError),
    /// Could not write the worker's partial: aborts the run
    Write(io::Error),
}

impl From<ShardError> for FileError {
    fn from(e: ShardError) -> Self {
        Self::Shard(e)
    }
}

impl From<io::Error> for FileError {
    fn from(e: io::Error) -> Self {
        Self::Write(e)
    }
}

/// Something a worker can claim; `name` labels its progress bar
pub trait WorkItem: Sync {
    fn name(&self) -> String;
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl WorkItem for PathBuf {
    fn name(&self) -> String {
        file_name(self)
    }
}

impl WorkItem for LineSource {
    fn name(&self) -> String {
        match self {
            Self::Gzip(path) => file_name(path),
            Self::Plain(range) => format!("{}@{}", file_name(&range.path), range.start),
        }
    }
}

/// How to run one worker pool stage
#[derive(Debug, Clone)]
pub struct PoolPlan<'a> {
    /// Stage label, also the partial file prefix (`<label>.part.<t>`)
    pub label: &'a str,
    /// Directory for partial files
    pub work_dir: &'a Path,
    /// Available parallelism; capped by the number of files
    pub parallelism: usize,
}

impl PoolPlan<'_> {
    pub fn partial_path(&self, worker: usize) -> PathBuf {
        self.work_dir.join(format!("{}.part.{worker}", self.label))
    }
}

/// Result of a completed pool run
#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// Partial files in worker completion order
    pub partials: Vec<PathBuf>,
    /// Per-shard results, in completion order
    pub file_stats: Vec<T>,
    pub failed_files: usize,
    pub workers: usize,
    pub elapsed: Duration,
}

/// Run `process` over every item with `min(parallelism, items.len())` workers.
///
/// `make_state` is called once per worker (reusable parser buffers and the
/// like); the state never crosses workers. Blocks until every worker has
/// finished.
pub fn run_workers<I, T, S, M, F>(
    files: &[I],
    plan: &PoolPlan<'_>,
    progress: &ProgressContext,
    make_state: M,
    process: F,
) -> Result<PoolOutcome<T>, PipelineError>
where
    I: WorkItem,
    T: Send,
    M: Fn() -> S + Sync,
    F: Fn(&I, &mut S, &mut PartialWriter, &ProgressBar) -> Result<T, FileError> + Sync,
{
    let start = Instant::now();
    let workers = worker_count(plan.parallelism, files.len());

    fs::create_dir_all(plan.work_dir).map_err(|e| {
        PipelineError::infra(
            format!("cannot create work dir {}", plan.work_dir.display()),
            e,
        )
    })?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("worker-{i}"))
        .build()
        .map_err(|e| PipelineError::infra("cannot start worker pool", io::Error::other(e)))?;

    log::info!(
        "{}: processing {} files with {} workers",
        plan.label,
        files.len(),
        workers
    );

    let queue = WorkQueue::new(files.iter().collect::<Vec<_>>());
    let overall = progress.files_bar(plan.label, files.len());
    let partials: Mutex<Vec<PathBuf>> = Mutex::new(Vec::with_capacity(workers));
    let results: Mutex<Vec<T>> = Mutex::new(Vec::new());
    let failed = Mutex::new(0usize);
    let create_error: Mutex<Option<io::Error>> = Mutex::new(None);
    let fatal: Mutex<Option<PipelineError>> = Mutex::new(None);

    pool.scope(|s| {
        for t in 0..workers {
            let (queue, overall, partials, results, failed, create_error, fatal) = (
                &queue,
                &overall,
                &partials,
                &results,
                &failed,
                &create_error,
                &fatal,
            );
            let (make_state, process) = (&make_state, &process);
            s.spawn(move |_| {
                let part_path = plan.partial_path(t);
                let mut out = match File::create(&part_path) {
                    Ok(f) => BufWriter::with_capacity(PARTIAL_BUF_SIZE, f),
                    Err(e) => {
                        log::error!("Cannot create {}: {e}", part_path.display());
                        create_error
                            .lock()
                            .expect("worker thread panicked")
                            .get_or_insert(e);
                        return;
                    }
                };
                let mut state = make_state();

                while let Some((_, item)) = queue.next() {
                    let pb = progress.shard_bar(&item.name(), 0);

                    let outcome = process(item, &mut state, &mut out, &pb);
                    pb.finish_and_clear();
                    overall.inc(1);
                    let done = queue.complete();

                    match outcome {
                        Ok(r) => {
                            results.lock().expect("worker thread panicked").push(r);
                        }
                        Err(FileError::Shard(e)) => {
                            log::warn!("Skipping shard: {e}");
                            *failed.lock().expect("worker thread panicked") += 1;
                        }
                        Err(FileError::Write(e)) => {
                            log::error!("Cannot write {}: {e}", part_path.display());
                            fatal
                                .lock()
                                .expect("worker thread panicked")
                                .get_or_insert(PipelineError::infra(
                                    format!("cannot write {}", part_path.display()),
                                    e,
                                ));
                            break;
                        }
                    }
                    if !progress.is_tty() && done % 100 == 0 {
                        log::info!("{}: {}/{} files", plan.label, done, queue.total());
                    }
                }

                if let Err(e) = out.flush() {
                    fatal
                        .lock()
                        .expect("worker thread panicked")
                        .get_or_insert(PipelineError::infra(
                            format!("cannot flush {}", part_path.display()),
                            e,
                        ));
                }
                partials
                    .lock()
                    .expect("worker thread panicked")
                    .push(part_path);
            });
        }
    });

    overall.finish_and_clear();

    let partials = partials.into_inner().expect("worker thread panicked");

    if let Some(err) = fatal.into_inner().expect("worker thread panicked") {
        remove_partials(&partials);
        return Err(err);
    }
    if partials.is_empty() && !files.is_empty() {
        let source = create_error
            .into_inner()
            .expect("worker thread panicked")
            .unwrap_or_else(|| io::Error::other("no partial output was created"));
        return Err(PipelineError::infra(
            format!(
                "no worker could create its partial file in {}",
                plan.work_dir.display()
            ),
            source,
        ));
    }
    if partials.len() < workers {
        log::warn!(
            "{}: only {}/{} workers ran (partial file creation failed)",
            plan.label,
            partials.len(),
            workers
        );
    }

    Ok(PoolOutcome {
        partials,
        file_stats: results.into_inner().expect("worker thread panicked"),
        failed_files: failed.into_inner().expect("worker thread panicked"),
        workers,
        elapsed: start.elapsed(),
    })
}

/// Best-effort removal of partial files (used when a run aborts)
pub fn remove_partials(partials: &[PathBuf]) {
    for p in partials {
        if let Err(e) = fs::remove_file(p) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove partial {}: {e}", p.display());
            }
        }
    }
}
