//! Pipeline defaults shared by both tools.

use std::time::Duration;

/// Image roots of the site, relative to the repository root.
pub const DEFAULT_ROOTS: &[&str] = &["public/images", "src/assets/images"];

/// Responsive widths, small mobile up to small desktop.
pub const DEFAULT_WIDTHS: &[u32] = &[480, 768, 1024, 1440];

/// Emit a progress line every N completed conversions.
pub const PROGRESS_EVERY: usize = 20;

/// Failure records kept for the end-of-run listing.
pub const FAILURE_DISPLAY_LIMIT: usize = 50;

/// Upper bound on simultaneously decoded images.
pub const DEFAULT_MAX_THREADS: usize = 8;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

pub const ENV_THREADS: &str = "IMGPREP_THREADS";
pub const ENV_TIMEOUT_SECS: &str = "IMGPREP_TIMEOUT_SECS";

/// Exit code used when the run was interrupted with Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

pub fn default_roots() -> Vec<std::path::PathBuf> {
    DEFAULT_ROOTS.iter().map(std::path::PathBuf::from).collect()
}

/// `--timeout-secs` value to a deadline; 0 disables it.
pub fn task_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_timeout_zero_disables() {
        assert_eq!(task_timeout(0), None);
        assert_eq!(task_timeout(120), Some(DEFAULT_TASK_TIMEOUT));
    }

    #[test]
    fn test_default_roots() {
        let roots = default_roots();
        assert_eq!(roots.len(), 2);
        assert!(roots[0].ends_with("public/images"));
    }
}
