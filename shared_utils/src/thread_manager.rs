//! Worker pool sizing
//!
//! Every in-flight task holds a fully decoded image, so the pool is capped
//! well below what a large machine would offer.

use crate::config::DEFAULT_MAX_THREADS;
use crate::error::{PipelineError, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Explicit worker count; `None` means one per available core.
    pub threads: Option<usize>,
    pub max_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: None,
            max_threads: DEFAULT_MAX_THREADS,
        }
    }
}

impl PoolConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: Some(threads),
            ..Self::default()
        }
    }

    /// Resolved worker count, always within `1..=max_threads`.
    pub fn pool_size(&self) -> usize {
        let wanted = self.threads.unwrap_or_else(num_cpus::get);
        wanted.clamp(1, self.max_threads.max(1))
    }
}

pub fn build_pool(config: &PoolConfig) -> Result<rayon::ThreadPool> {
    let size = config.pool_size();
    debug!(threads = size, cpus = num_cpus::get(), "Building worker pool");
    rayon::ThreadPoolBuilder::new()
        .num_threads(size)
        .thread_name(|i| format!("imgprep-worker-{}", i))
        .build()
        .map_err(|e| PipelineError::Pool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_clamped() {
        let size = PoolConfig::default().pool_size();
        assert!(size >= 1);
        assert!(size <= DEFAULT_MAX_THREADS);
    }

    #[test]
    fn test_explicit_threads_respected_within_bounds() {
        assert_eq!(PoolConfig::with_threads(3).pool_size(), 3);
        assert_eq!(PoolConfig::with_threads(0).pool_size(), 1);
        assert_eq!(PoolConfig::with_threads(500).pool_size(), DEFAULT_MAX_THREADS);
    }

    #[test]
    fn test_custom_maximum() {
        let config = PoolConfig {
            threads: Some(12),
            max_threads: 16,
        };
        assert_eq!(config.pool_size(), 12);

        let degenerate = PoolConfig {
            threads: None,
            max_threads: 0,
        };
        assert_eq!(degenerate.pool_size(), 1);
    }

    #[test]
    fn test_build_pool() {
        let pool = build_pool(&PoolConfig::with_threads(2)).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
