//! Progress lines for large transfers
//!
//! Small files stay silent. Above the size threshold a line is logged every
//! ten percent; when the server declared no size, one is logged every 25MB
//! once the threshold has been passed.

use tracing::info;

use crate::constants::progress::{MIN_REPORT_SIZE, PERCENT_STEP, UNKNOWN_SIZE_STEP};

/// Tracks bytes written for one file and logs at fixed steps
#[derive(Debug)]
pub struct ProgressReporter {
    name: String,
    total: u64,
    written: u64,
    last_report: u64,
    enabled: bool,
}

impl ProgressReporter {
    /// `total` of zero means the size is unknown
    pub fn new(name: impl Into<String>, total: u64, enabled: bool) -> Self {
        Self {
            name: name.into(),
            total,
            written: 0,
            last_report: 0,
            enabled,
        }
    }

    /// Records the running byte count; returns true when a line was logged
    pub fn update(&mut self, written: u64) -> bool {
        self.written = written;
        if !self.enabled {
            return false;
        }

        if self.total > MIN_REPORT_SIZE {
            let percent = written.saturating_mul(100) / self.total;
            if percent >= self.last_report + PERCENT_STEP {
                info!(
                    "[{}] Progress: {}% ({}/{})",
                    self.name,
                    percent,
                    format_bytes(written),
                    format_bytes(self.total)
                );
                self.last_report = percent;
                return true;
            }
        } else if self.total == 0 && written > MIN_REPORT_SIZE {
            let step = written / UNKNOWN_SIZE_STEP;
            if step > self.last_report {
                info!("[{}] Downloaded: {}...", self.name, format_bytes(written));
                self.last_report = step;
                return true;
            }
        }
        false
    }

    /// Bytes seen so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
