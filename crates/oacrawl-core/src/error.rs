//! Error types for shard processing and pipeline orchestration

use std::path::{Path, PathBuf};

/// Error from processing a single input shard (open + decompress).
///
/// Always recoverable: the scheduler logs it, counts the shard as failed,
/// and moves on to the next claimed file.
#[derive(Debug)]
pub enum ShardError {
    /// Input path does not exist
    NotFound(PathBuf),
    /// File exists but could not be opened or stat'ed
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Stream unreadable (corrupt gzip, I/O failure) after `lines_read` lines
    Decode {
        path: PathBuf,
        lines_read: usize,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ShardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "not found: {}", path.display()),
            Self::Open { path, source } => write!(f, "cannot open {}: {source}", path.display()),
            Self::Decode {
                path,
                lines_read,
                source,
            } => write!(
                f,
                "decode error in {} after {lines_read} lines: {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ShardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Open { source, .. } | Self::Decode { source, .. } => Some(source),
        }
    }
}

impl ShardError {
    /// Classify an `open()` failure
    pub fn open(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Open {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }

    /// Path of the shard that failed
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::Open { path, .. } | Self::Decode { path, .. } => path,
        }
    }
}

/// Fatal pipeline error. Terminates the run with a category-specific exit code.
#[derive(Debug)]
pub enum PipelineError {
    /// Bad or contradictory configuration, detected before processing starts
    Config(String),
    /// Environment problem: cannot create/open/read output or partial files
    Infrastructure {
        context: String,
        source: std::io::Error,
    },
}

/// Exit code for configuration / usage errors (same as clap)
pub const EXIT_CONFIG: i32 = 2;

/// Exit code for infrastructure errors
pub const EXIT_INFRASTRUCTURE: i32 = 3;

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Infrastructure { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(_) => None,
            Self::Infrastructure { source, .. } => Some(source),
        }
    }
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn infra(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Infrastructure {
            context: context.into(),
            source,
        }
    }

    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Infrastructure { .. } => EXIT_INFRASTRUCTURE,
        }
    }
}
