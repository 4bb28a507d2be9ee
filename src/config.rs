//! Engine configuration

use std::env;

/// Tunables for the submission pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of matcher worker threads
    pub num_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
        }
    }
}

impl EngineConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
        }
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(workers) = env::var("MATCHBOOK_WORKERS") {
            if let Ok(n) = workers.parse::<usize>() {
                if n > 0 {
                    config.num_workers = n;
                }
            }
        }
        config
    }
}
