//! Shard discovery under an OpenAlex snapshot directory

use std::path::{Path, PathBuf};

use crate::error::ShardError;

/// Snapshot sub-corpus, located by convention under `<root>/data/<name>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corpus {
    Authors,
    Works,
}

impl Corpus {
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Authors => "authors",
            Self::Works => "works",
        }
    }

    /// `<snapshot_root>/data/<corpus>`
    pub fn dir(self, snapshot_root: &Path) -> PathBuf {
        snapshot_root.join("data").join(self.dir_name())
    }
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Recursively find all regular `.gz` files below `root`.
///
/// Returns them sorted and deduplicated. An empty result is not an error;
/// a missing root is.
pub fn find_gz_files(root: &Path) -> Result<Vec<PathBuf>, ShardError> {
    if !root.is_dir() {
        return Err(ShardError::NotFound(root.to_path_buf()));
    }

    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = format!("{escaped}/**/*.gz");
    log::debug!("Searching shards with pattern: {pattern}");

    let entries = glob::glob(&pattern).map_err(|e| ShardError::Open {
        path: root.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.msg),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Error reading glob entry: {e}"),
        }
    }

    files.sort();
    files.dedup();
    log::info!("Found {} shards under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_nested_gz_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("updated_date=2024-01-01")).unwrap();
        std::fs::create_dir_all(root.join("updated_date=2024-02-01/deep")).unwrap();
        std::fs::write(root.join("updated_date=2024-01-01/part_000.gz"), b"").unwrap();
        std::fs::write(root.join("updated_date=2024-02-01/deep/part_001.gz"), b"").unwrap();
        std::fs::write(root.join("manifest"), b"{}").unwrap();
        std::fs::write(root.join("updated_date=2024-01-01/notes.txt"), b"").unwrap();

        let files = find_gz_files(root).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().is_some_and(|e| e == "gz")));
    }

    #[test]
    fn directory_named_gz_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("weird.gz")).unwrap();
        std::fs::write(dir.path().join("weird.gz/part_000.gz"), b"").unwrap();

        let files = find_gz_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("weird.gz/part_000.gz")]);
    }

    #[test]
    fn empty_dir_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(find_gz_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = find_gz_files(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ShardError::NotFound(_)));
    }

    #[test]
    fn corpus_dirs() {
        let root = Path::new("/snap");
        assert_eq!(Corpus::Authors.dir(root), PathBuf::from("/snap/data/authors"));
        assert_eq!(Corpus::Works.dir(root), PathBuf::from("/snap/data/works"));
        assert_eq!(Corpus::Works.to_string(), "works");
    }
}
