//! oacrawl OpenAlex - affiliation index and paper filter over a local snapshot
//!
//! Pipelines sharing the worker pool from `oacrawl-core`:
//!
//! - **authors**: `data/authors` shards → one compressed line per author with
//!   the countries of their institutions for every year
//! - **papers**: `data/works` shards → raw lines of works with at least one
//!   author affiliated with a country in the publication year (falling back
//!   to the nearest earlier year with data), optionally topic-filtered
//! - **graph**: papers → co-authorship edge lists, whole or split by year
//! - **dataset**: papers → per-year, per-author and per-topic distributions
//!
//! **weights** is a single sequential pass that counts repeated author pairs
//! in an edge list.
//!
//! # Example
//!
//! ```no_run
//! use oacrawl_core::ProgressContext;
//! use oacrawl_openalex::{PapersConfig, run_papers};
//!
//! let config = PapersConfig {
//!     country_code: Some("US".into()),
//!     index: Some("authors_compressed.jsonl".into()),
//!     ..Default::default()
//! };
//! let summary = run_papers(&config, &ProgressContext::new()).expect("papers run failed");
//! println!("Kept {} papers", summary.records_written);
//! ```

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod filter;
pub mod graph;
pub mod index;
pub mod record;
pub mod runner;
pub mod stats;
pub mod worker;

// Re-exports for convenience
pub use aggregate::{AggregateStats, AuthorAggregator};
pub use config::{
    AuthorsConfig, DatasetConfig, GraphConfig, PapersConfig, TopicSpec, WeightsConfig,
};
pub use dataset::DatasetCounts;
pub use filter::{AuthorAllowlist, FilterCriteria, PaperFilter, TopicFilter, TopicScope, Verdict};
pub use graph::{EdgeSplit, SplitStats, YearInterval, parse_intervals, short_id};
pub use index::{AffiliationIndex, AuthorTimeline, IndexLoad};
pub use record::{
    AuthorAffiliationRecord, CompressedAuthor, PaperRecord, RecordParser, WorkDetail,
    parse_compressed_author_line,
};
pub use runner::{run_authors, run_dataset, run_graph, run_papers, run_weights};
pub use stats::{Pipeline, RunSummary};
pub use worker::FileStats;
