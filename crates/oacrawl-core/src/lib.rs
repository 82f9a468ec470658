//! oacrawl core: shared infrastructure for the OpenAlex snapshot pipelines
//!
//! Local shard discovery, streaming gzip decoding, byte-range splitting of
//! plain files, the worker pool with per-worker partial files, the final
//! merge, errors, logging, progress.

pub mod discovery;
pub mod error;
pub mod logging;
pub mod merge;
pub mod progress;
pub mod scheduler;
pub mod source;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use discovery::{Corpus, find_gz_files};
pub use error::{EXIT_CONFIG, EXIT_INFRASTRUCTURE, PipelineError, ShardError};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use merge::{MergeStats, merge_partials};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use scheduler::{
    FileError, PartialWriter, PoolOutcome, PoolPlan, WorkItem, remove_partials, run_workers,
};
pub use source::{
    ByteRange, LineSource, RangeLines, SourceLines, open_range, plan_sources, split_ranges,
};
pub use stream::{ByteCounter, CountingReader, GzipLines, GzipReader, open_gzip_file};
pub use work_queue::{THREADS_ENV, WorkQueue, available_workers, worker_count};
