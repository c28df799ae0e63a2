//! Per-job run policies: start jitter and run timeout.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Random delay applied before each run.
///
/// Spreads load when several daemons share a cron schedule against the
/// same imagery provider.
///
/// ```
/// use disaster_scheduler::JitterConfig;
///
/// let jitter = JitterConfig::new(30);
/// assert!(jitter.generate_jitter() < std::time::Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JitterConfig {
    /// Upper bound in seconds; 0 disables jitter
    pub max_jitter_secs: u64,
}

impl JitterConfig {
    pub fn new(max_jitter_secs: u64) -> Self {
        Self { max_jitter_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_jitter_secs > 0
    }

    /// Delay in `[0, max_jitter_secs)` with millisecond resolution.
    pub fn generate_jitter(&self) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }
        let ms = rand::rng().random_range(0..self.max_jitter_secs * 1000);
        Duration::from_millis(ms)
    }
}

/// Upper bound on a single run.
///
/// A run that exceeds it is dropped and recorded as failed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// 0 means no limit
    pub timeout_secs: u64,
}

impl TimeoutConfig {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
