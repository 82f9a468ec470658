//! Runtime configuration for every pipeline

use std::path::PathBuf;

use oacrawl_core::PipelineError;

use crate::filter::TopicScope;
use crate::graph::{EdgeSplit, prefixed_path};
use crate::index::IndexLoad;

/// Topic constraint as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSpec {
    /// OpenAlex field id (`17`) or field URL
    Field(String),
    /// Free-text substring
    Text(String),
}

/// Authors pipeline: snapshot authors → compressed affiliation index
#[derive(Debug, Clone)]
pub struct AuthorsConfig {
    /// Snapshot root containing `data/authors`
    pub snapshot_dir: PathBuf,
    pub output: PathBuf,
    /// Keep only authors with this country somewhere in their history
    pub country_code: Option<String>,
    /// Worker parallelism before capping by file count
    pub workers: usize,
    /// Partial and intermediate files go here
    pub work_dir: PathBuf,
    /// Keep the merged extraction file after aggregation
    pub keep_intermediate: bool,
}

impl Default for AuthorsConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("openalex-snapshot"),
            output: PathBuf::from("authors_compressed.jsonl"),
            country_code: None,
            workers: oacrawl_core::available_workers(),
            work_dir: std::env::temp_dir(),
            keep_intermediate: false,
        }
    }
}

impl AuthorsConfig {
    /// Merged output of the extraction workers
    pub fn extract_path(&self) -> PathBuf {
        self.work_dir.join("authors.extract.jsonl")
    }
}

/// Papers pipeline: snapshot works → filtered raw lines
#[derive(Debug, Clone)]
pub struct PapersConfig {
    /// Snapshot root containing `data/works`
    pub snapshot_dir: PathBuf,
    pub output: PathBuf,
    pub country_code: Option<String>,
    /// Compressed authors file; required with a country
    pub index: Option<PathBuf>,
    pub index_load: IndexLoad,
    pub topic: Option<TopicSpec>,
    pub topic_case_sensitive: bool,
    pub topic_scope: TopicScope,
    /// File with one author id per line
    pub author_allowlist: Option<PathBuf>,
    pub workers: usize,
    pub work_dir: PathBuf,
}

impl Default for PapersConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("openalex-snapshot"),
            output: PathBuf::from("papers.jsonl"),
            country_code: None,
            index: None,
            index_load: IndexLoad::default(),
            topic: None,
            topic_case_sensitive: false,
            topic_scope: TopicScope::default(),
            author_allowlist: None,
            workers: oacrawl_core::available_workers(),
            work_dir: std::env::temp_dir(),
        }
    }
}

impl PapersConfig {
    pub fn country(&self) -> Option<&str> {
        self.country_code.as_deref().filter(|c| !c.is_empty())
    }

    /// Reject contradictory settings before any work starts
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.topic.is_some() && self.author_allowlist.is_some() {
            return Err(PipelineError::config(
                "a topic filter and an author allowlist cannot be combined",
            ));
        }
        if self.country().is_some() && self.index.is_none() {
            return Err(PipelineError::config(
                "a country filter requires --index (compressed authors file)",
            ));
        }
        if self.author_allowlist.is_some() && self.country().is_none() {
            log::warn!("Author allowlist has no effect without a country filter");
        }
        if let Some(TopicSpec::Text(t) | TopicSpec::Field(t)) = &self.topic {
            if t.trim().is_empty() {
                return Err(PipelineError::config("topic filter is empty"));
            }
        }
        Ok(())
    }
}

/// Graph pipeline: papers → co-authorship edge lists
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Papers as JSONL, a `.gz` file, or a directory of `.gz` shards
    pub input: PathBuf,
    /// Edge file, or the base name for interval files
    pub output: PathBuf,
    pub split: EdgeSplit,
    /// Write `metadata_<output name>` with the topics of every paper
    pub metadata: bool,
    pub workers: usize,
    pub work_dir: PathBuf,
    /// Keep the merged tagged file after splitting
    pub keep_intermediate: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("papers.jsonl"),
            output: PathBuf::from("dataset.csv"),
            split: EdgeSplit::All,
            metadata: true,
            workers: oacrawl_core::available_workers(),
            work_dir: std::env::temp_dir(),
            keep_intermediate: false,
        }
    }
}

impl GraphConfig {
    pub fn metadata_path(&self) -> Option<PathBuf> {
        self.metadata
            .then(|| prefixed_path(&self.output, "metadata_"))
    }

    /// Merged worker output before splitting
    pub fn tagged_path(&self) -> PathBuf {
        self.work_dir.join("graph.extract.csv")
    }
}

/// Weights pipeline: edge list → `a,b,count`
#[derive(Debug, Clone, Default)]
pub struct WeightsConfig {
    /// Edge CSV (`year,paper,a,b`)
    pub input: PathBuf,
    /// Defaults to `weighted_<input name>` next to the input
    pub output: Option<PathBuf>,
}

impl WeightsConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| prefixed_path(&self.input, "weighted_"))
    }
}

/// Dataset pipeline: papers → distribution CSVs
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Same input forms as [`GraphConfig::input`]
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub workers: usize,
    pub work_dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("papers.jsonl"),
            output_dir: PathBuf::from("stats"),
            workers: oacrawl_core::available_workers(),
            work_dir: std::env::temp_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_authors_config() {
        let config = AuthorsConfig::default();
        assert_eq!(config.output, PathBuf::from("authors_compressed.jsonl"));
        assert!(config.country_code.is_none());
        assert!(config.workers >= 1);
        assert!(!config.keep_intermediate);
        assert!(config.extract_path().ends_with("authors.extract.jsonl"));
    }

    #[test]
    fn default_papers_config_is_valid() {
        let config = PapersConfig::default();
        assert_eq!(config.index_load, IndexLoad::Mmap);
        assert_eq!(config.topic_scope, TopicScope::Record);
        config.validate().unwrap();
    }

    #[test]
    fn topic_and_allowlist_conflict() {
        let config = PapersConfig {
            topic: Some(TopicSpec::Field("17".into())),
            author_allowlist: Some(PathBuf::from("allow.txt")),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn country_needs_index() {
        let mut config = PapersConfig {
            country_code: Some("US".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.index = Some(PathBuf::from("authors_compressed.jsonl"));
        config.validate().unwrap();
    }

    #[test]
    fn empty_country_is_no_country() {
        let config = PapersConfig {
            country_code: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.country(), None);
        config.validate().unwrap();
    }

    #[test]
    fn blank_topic_rejected() {
        let config = PapersConfig {
            topic: Some(TopicSpec::Text("  ".into())),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn graph_paths_follow_output() {
        let config = GraphConfig {
            output: PathBuf::from("out/edges.csv"),
            work_dir: PathBuf::from("/scratch"),
            ..Default::default()
        };
        assert_eq!(
            config.metadata_path(),
            Some(PathBuf::from("out/metadata_edges.csv"))
        );
        assert_eq!(config.tagged_path(), PathBuf::from("/scratch/graph.extract.csv"));
        let quiet = GraphConfig {
            metadata: false,
            ..config
        };
        assert!(quiet.metadata_path().is_none());
    }

    #[test]
    fn weights_output_defaults_next_to_input() {
        let config = WeightsConfig {
            input: PathBuf::from("graphs/2000_2010_dataset.csv"),
            output: None,
        };
        assert_eq!(
            config.output_path(),
            PathBuf::from("graphs/weighted_2000_2010_dataset.csv")
        );
    }
}
