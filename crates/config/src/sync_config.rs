//! Sync engine timing section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing windows used by the list sync engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last toggle before queued writes are flushed
    pub mutation_debounce_ms: u64,

    /// Window over which remote upserts are coalesced into one update
    pub remote_batch_window_ms: u64,

    /// Upper bound on the final flush performed at shutdown
    pub dispose_flush_timeout_ms: u64,
}

impl SyncConfig {
    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn remote_batch_window(&self) -> Duration {
        Duration::from_millis(self.remote_batch_window_ms)
    }

    pub fn dispose_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_flush_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mutation_debounce_ms: 1000,
            remote_batch_window_ms: 50,
            dispose_flush_timeout_ms: 2000,
        }
    }
}

impl ConfigSection for SyncConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(
                self.mutation_debounce_ms,
                50,
                10_000,
                "sync.mutation_debounce_ms",
            ),
            Validator::in_range(
                self.remote_batch_window_ms,
                1,
                1_000,
                "sync.remote_batch_window_ms",
            ),
            Validator::in_range(
                self.dispose_flush_timeout_ms,
                100,
                30_000,
                "sync.dispose_flush_timeout_ms",
            ),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.mutation_debounce_ms = other.mutation_debounce_ms;
        self.remote_batch_window_ms = other.remote_batch_window_ms;
        self.dispose_flush_timeout_ms = other.dispose_flush_timeout_ms;
    }

    fn section_name(&self) -> &'static str {
        "sync"
    }
}
