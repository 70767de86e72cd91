//! Session summary reporting
//!
//! A [`SessionResult`] is built from the shared worker counters once the
//! pool has drained the queue.

use std::time::Duration;

use serde::Serialize;

use crate::app::fetcher::format_bytes;
use crate::app::worker::{FailedTask, StatsSnapshot};

/// Final result of a download session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionResult {
    /// Links queued for this run
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// Tasks that failed permanently, with the last error seen
    pub failed: Vec<FailedTask>,
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
}

impl SessionResult {
    /// Builds the result from final counters
    pub fn from_snapshot(total: usize, snapshot: StatsSnapshot, elapsed: Duration) -> Self {
        Self {
            total,
            downloaded: snapshot.downloaded,
            skipped: snapshot.skipped,
            failed: snapshot.failed,
            bytes_downloaded: snapshot.bytes_downloaded,
            elapsed,
        }
    }

    /// Whether every task downloaded or was skipped
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get a one-line summary of the session
    pub fn summary(&self) -> String {
        let base = format!(
            "{} zones: {} downloaded ({}), {} skipped, {} failed in {}",
            self.total,
            self.downloaded,
            format_bytes(self.bytes_downloaded),
            self.skipped,
            self.failed.len(),
            format_duration(self.elapsed)
        );
        if self.is_success() {
            base
        } else {
            format!("Completed with failures: {}", base)
        }
    }
}

/// Format a duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}
