//! Progress display for CLI operations
//!
//! A download run is shown as one `indicatif` bar fed by the coordinator's
//! [`TaskEvent`] channel. When stderr is not a terminal the same events are
//! summarised as a periodic text line instead. The report download gets a
//! byte counter spinner.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::fetcher::progress::format_bytes;
use crate::app::TaskEvent;

/// Interval between text-mode reports
const TEXT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Counts gathered from task events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl ProgressCounts {
    /// Fold one event into the counts
    pub fn record(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Downloaded { bytes, .. } => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            TaskEvent::Skipped { .. } => self.skipped += 1,
            TaskEvent::Failed(_) => self.failed += 1,
            TaskEvent::Started { .. } | TaskEvent::Retrying { .. } => {}
        }
    }

    /// Tasks that reached a terminal state
    pub fn finished(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }

    fn message(&self) -> String {
        format!(
            "{} downloaded ({}), {} skipped, {} failed",
            self.downloaded,
            format_bytes(self.bytes),
            self.skipped,
            self.failed
        )
    }
}

/// Batch progress for a download run
pub struct ProgressDisplay {
    total: usize,
    bar: Option<ProgressBar>,
    text_mode: bool,
}

impl ProgressDisplay {
    /// Create a display for `total` zones
    ///
    /// The bar is only drawn when `enabled` and stderr is a terminal; otherwise
    /// `enabled` selects periodic text reports.
    pub fn new(total: usize, enabled: bool) -> Self {
        let is_terminal = atty::is(atty::Stream::Stderr);
        let bar = (enabled && is_terminal).then(|| batch_bar(total as u64));

        Self {
            total,
            bar,
            text_mode: enabled && !is_terminal,
        }
    }

    /// Consume events until the sender side is dropped
    ///
    /// Returns the final counts.
    pub fn spawn(self, mut events: mpsc::UnboundedReceiver<TaskEvent>) -> JoinHandle<ProgressCounts> {
        tokio::spawn(async move {
            let mut counts = ProgressCounts::default();
            let mut last_report = Instant::now();

            while let Some(event) = events.recv().await {
                counts.record(&event);
                self.show(&event, &counts);

                if self.text_mode && event.is_terminal() && last_report.elapsed() >= TEXT_REPORT_INTERVAL
                {
                    eprintln!(
                        "Progress: {}/{} zones ({})",
                        counts.finished(),
                        self.total,
                        counts.message()
                    );
                    last_report = Instant::now();
                }
            }

            if let Some(bar) = &self.bar {
                bar.finish_and_clear();
            }
            debug!("Progress display finished: {}", counts.message());
            counts
        })
    }

    fn show(&self, event: &TaskEvent, counts: &ProgressCounts) {
        let Some(bar) = &self.bar else {
            return;
        };

        match event {
            TaskEvent::Started { name, .. } => bar.set_message(format!("{} ({})", counts.message(), name)),
            TaskEvent::Retrying { name, attempt, error } => {
                bar.println(format!("{}: attempt {} failed: {}", name, attempt, error));
            }
            TaskEvent::Failed(failed) => {
                bar.println(format!("{}: failed: {}", failed.name, failed.error));
                bar.inc(1);
                bar.set_message(counts.message());
            }
            TaskEvent::Downloaded { .. } | TaskEvent::Skipped { .. } => {
                bar.inc(1);
                bar.set_message(counts.message());
            }
        }
    }
}

fn batch_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        Ok(style) => bar.set_style(style.progress_chars("##-")),
        Err(e) => debug!("Progress bar template error: {}", e),
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Spinner counting bytes of a transfer with no known size
///
/// Hidden unless `enabled` and stderr is a terminal.
pub fn byte_spinner(enabled: bool, label: &str) -> ProgressBar {
    if !enabled || !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})") {
        Ok(style) => spinner.set_style(style),
        Err(e) => debug!("Spinner template error: {}", e),
    }
    spinner.set_message(label.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
