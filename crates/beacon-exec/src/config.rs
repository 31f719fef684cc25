//! Thread pool configuration.
//!
//! Defaults come from the host (available parallelism). Environment variables
//! override the defaults when read through [`PoolConfig::from_env`]:
//!
//! - `BEACON_POOL_THREADS`: worker count (positive integer)
//! - `BEACON_POOL_NAME`: worker thread name prefix
//!
//! Unparseable or zero values are ignored.

use std::env;
use std::thread;

/// Environment variable overriding the worker count.
pub const THREADS_ENV: &str = "BEACON_POOL_THREADS";
/// Environment variable overriding the worker name prefix.
pub const NAME_ENV: &str = "BEACON_POOL_NAME";

const DEFAULT_NAME: &str = "beacon-pool";
const FALLBACK_THREADS: usize = 4;

/// Configuration for a [`ThreadPool`](crate::ThreadPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Prefix for worker thread names; workers are named `{name}-{index}`.
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_THREADS);
        Self {
            threads,
            name: DEFAULT_NAME.to_string(),
        }
    }
}

impl PoolConfig {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Set the worker count.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the worker name prefix.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup(THREADS_ENV)
            && let Ok(n) = val.trim().parse::<usize>()
            && n > 0
        {
            self.threads = n;
        }
        if let Some(val) = lookup(NAME_ENV)
            && !val.trim().is_empty()
        {
            self.name = val.trim().to_string();
        }
        self
    }
}
