//! Shared download counters
//!
//! One [`DownloadStats`] is shared by every worker of a run. Counters are
//! atomics; the failure list sits behind a mutex because it is only touched
//! once per failed task.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::FailedTask;

#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    bytes_downloaded: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    failed: Mutex<Vec<FailedTask>>,
}

/// Point-in-time copy of [`DownloadStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub downloaded: usize,
    pub skipped: usize,
    pub bytes_downloaded: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub failed: Vec<FailedTask>,
}

impl StatsSnapshot {
    /// Tasks that reached a final state
    pub fn finished(&self) -> usize {
        self.downloaded + self.skipped + self.failed.len()
    }
}

impl DownloadStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a task as being worked on
    pub fn task_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    /// Marks a task as no longer being worked on
    pub fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, failed: FailedTask) {
        match self.failed.lock() {
            Ok(mut list) => list.push(failed),
            Err(poisoned) => poisoned.into_inner().push(failed),
        }
    }

    /// Most tasks ever worked on at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let failed = match self.failed.lock() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        StatsSnapshot {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            failed,
        }
    }
}
