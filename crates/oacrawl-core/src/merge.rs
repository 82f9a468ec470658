//! Fan-in of per-worker partial files into the final artifact

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Statistics from one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub files: usize,
    pub bytes: u64,
}

/// Append every partial, in list order, to `dest`, then delete the partials.
///
/// `dest` is opened in append mode, so repeated merges into the same file
/// accumulate. A partial that cannot be read is fatal: it means a worker
/// died mid-write or the environment is broken.
pub fn merge_partials(parts: &[PathBuf], dest: &Path) -> Result<MergeStats, PipelineError> {
    let out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .map_err(|e| PipelineError::infra(format!("cannot open {}", dest.display()), e))?;
    let mut out = BufWriter::new(out);

    let mut stats = MergeStats::default();
    for part in parts {
        let mut input = File::open(part).map_err(|e| {
            PipelineError::infra(format!("cannot open partial {}", part.display()), e)
        })?;
        let n = io::copy(&mut input, &mut out).map_err(|e| {
            PipelineError::infra(
                format!("cannot copy {} into {}", part.display(), dest.display()),
                e,
            )
        })?;
        log::debug!("Merged {} ({n} bytes)", part.display());
        stats.files += 1;
        stats.bytes += n;
    }
    out.flush()
        .map_err(|e| PipelineError::infra(format!("cannot flush {}", dest.display()), e))?;

    for part in parts {
        if let Err(e) = fs::remove_file(part) {
            log::warn!("Failed to remove partial {}: {e}", part.display());
        }
    }

    log::info!(
        "Merged {} partials ({} bytes) into {}",
        stats.files,
        stats.bytes,
        dest.display()
    );
    Ok(stats)
}
