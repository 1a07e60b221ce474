use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants::{DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_MAX_IDLE_SECS};

/// Schedule of the idle-eviction sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Seconds between two sweeps.
    pub interval_secs: u64,
    /// Entries untouched for longer than this are evicted.
    pub max_idle_secs: u64,
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            max_idle_secs: DEFAULT_MAX_IDLE_SECS,
        }
    }
}
