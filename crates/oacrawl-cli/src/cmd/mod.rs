pub mod authors;
pub mod dataset;
pub mod graph;
pub mod papers;
pub mod weights;

use oacrawl_core::ProgressContext;
use oacrawl_openalex::RunSummary;

/// Table on a TTY, log lines otherwise
pub fn report(summary: &RunSummary, progress: &ProgressContext) {
    if progress.is_tty() {
        progress.println(summary.format_table());
    } else {
        summary.log();
    }
    if summary.failed_files > 0 {
        log::warn!(
            "{} of {} files failed and were skipped",
            summary.failed_files,
            summary.total_files
        );
    }
}

/// Country codes are matched as written in the snapshot (upper case)
pub fn parse_country(s: &str) -> Result<String, String> {
    let code = s.trim();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("invalid country code '{s}'"));
    }
    Ok(code.to_ascii_uppercase())
}
