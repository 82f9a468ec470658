//! Configuration loading from TOML files

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use oacrawl_openalex::{IndexLoad, TopicScope};
use serde::{Deserialize, Deserializer};

/// Global configuration for oacrawl
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub workers: WorkersConfig,
    pub paths: PathsConfig,
    pub papers: PapersDefaults,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct WorkersConfig {
    /// Fixed worker parallelism; unset means `OACRAWL_THREADS` or all cores
    pub default: Option<usize>,
}

impl WorkersConfig {
    /// CLI value, else config file, else env/hardware
    pub fn resolve(&self, cli: Option<usize>) -> usize {
        cli.or(self.default)
            .filter(|&n| n > 0)
            .unwrap_or_else(oacrawl_core::available_workers)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for partial and intermediate files (default: system temp)
    #[serde(deserialize_with = "deserialize_env_path")]
    pub work_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub fn resolve_work_dir(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.work_dir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PapersDefaults {
    #[serde(deserialize_with = "deserialize_from_str")]
    pub index_load: IndexLoad,
    pub topic_case_sensitive: bool,
    #[serde(deserialize_with = "deserialize_from_str")]
    pub topic_scope: TopicScope,
}

/// Deserialize any `FromStr` type from a TOML string
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Deserialize a path that may be an environment variable reference like ${VAR}
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)).map(PathBuf::from))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./oacrawl.toml (current directory)
    /// 2. ~/.config/oacrawl/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("oacrawl.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "oacrawl") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.workers.default.is_none());
        assert!(config.paths.work_dir.is_none());
        assert_eq!(config.papers.index_load, IndexLoad::Mmap);
        assert_eq!(config.papers.topic_scope, TopicScope::Record);
        assert!(!config.papers.topic_case_sensitive);
    }

    #[test]
    fn workers_precedence() {
        let cfg = WorkersConfig { default: Some(4) };
        assert_eq!(cfg.resolve(Some(2)), 2);
        assert_eq!(cfg.resolve(None), 4);
        assert!(WorkersConfig::default().resolve(None) >= 1);
        // Zero is not a usable worker count
        assert!(WorkersConfig { default: Some(0) }.resolve(None) >= 1);
    }

    #[test]
    fn work_dir_precedence() {
        let cfg = PathsConfig {
            work_dir: Some(PathBuf::from("/scratch")),
        };
        assert_eq!(
            cfg.resolve_work_dir(Some(PathBuf::from("/cli"))),
            PathBuf::from("/cli")
        );
        assert_eq!(cfg.resolve_work_dir(None), PathBuf::from("/scratch"));
        assert_eq!(
            PathsConfig::default().resolve_work_dir(None),
            std::env::temp_dir()
        );
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[workers]
default = 6

[paths]
work_dir = "/tmp/oacrawl"

[papers]
index_load = "stream"
topic_case_sensitive = true
topic_scope = "author-ids"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.workers.default, Some(6));
        assert_eq!(config.paths.work_dir, Some(PathBuf::from("/tmp/oacrawl")));
        assert_eq!(config.papers.index_load, IndexLoad::Stream);
        assert!(config.papers.topic_case_sensitive);
        assert_eq!(config.papers.topic_scope, TopicScope::AuthorIds);
    }

    #[test]
    fn bad_enum_value_rejected() {
        let err = toml::from_str::<Config>("[papers]\nindex_load = \"floppy\"\n").unwrap_err();
        assert!(err.to_string().contains("floppy"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("oacrawl.toml");
        std::fs::write(&path, "[workers]\ndefault = 3\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.workers.default, Some(3));
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
