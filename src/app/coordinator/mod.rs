//! Download orchestration
//!
//! The coordinator turns a list of zone URLs into a finished download run:
//! it prepares the output directory, shuffles the links to spread load on
//! CZDS, feeds them through the bounded queue from a producer task and runs
//! the worker pool until the queue is drained or the run is cancelled.
//!
//! # Architecture
//!
//! - [`config`] - Fetch options and worker policy for one run
//! - [`stats`] - The session summary returned to the CLI
//! - [`signals`] - Ctrl-C and SIGTERM wired to the run's cancellation token
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use czds_fetcher::app::client::{ClientConfig, Credentials, CzdsClient};
//! use czds_fetcher::app::coordinator::{select_links, Coordinator, CoordinatorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(CzdsClient::new(
//!     ClientConfig::default(),
//!     Credentials::new("user", "secret"),
//! )?);
//! let cancel = CancellationToken::new();
//!
//! let links = client.download_links(&cancel).await?;
//! let links = select_links(links, &["com".to_string()], &[])?;
//!
//! let coordinator = Coordinator::new(client, CoordinatorConfig::default().with_out_dir("zones"));
//! let result = coordinator.run(&cancel, links).await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod signals;
pub mod stats;


use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::client::CzdsClient;
use crate::app::fetcher::ZoneFetcher;
use crate::app::queue::{task_queue, url_basename, DownloadTask};
use crate::app::worker::{DownloadStats, EventSink, TaskEvent, WorkerPool};
use crate::constants::czds::ZONE_FILE_SUFFIX;
use crate::errors::{DownloadError, DownloadResult};

pub use config::CoordinatorConfig;
pub use signals::SignalHandler;
pub use stats::{format_duration, SessionResult};

/// Main coordinator for a download run
pub struct Coordinator {
    client: Arc<CzdsClient>,
    config: CoordinatorConfig,
    events: EventSink,
}

impl Coordinator {
    pub fn new(client: Arc<CzdsClient>, config: CoordinatorConfig) -> Self {
        Self {
            client,
            config,
            events: EventSink::disabled(),
        }
    }

    /// Forwards per-task events to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Downloads every link into the output directory
    ///
    /// Task failures are reported in the returned [`SessionResult`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::ConfigurationError` for an invalid
    /// configuration, an I/O error if the output directory cannot be created,
    /// `DownloadError::Auth` if authentication failed mid-run (all workers
    /// are stopped), `DownloadError::Cancelled` if the run was cancelled, or
    /// the first error raised by the producer or a worker
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        links: Vec<String>,
    ) -> DownloadResult<SessionResult> {
        self.config.validate()?;
        let started = Instant::now();

        ensure_out_dir(&self.config.fetch.out_dir).await?;

        let mut links = links;
        if self.config.shuffle {
            links.shuffle(&mut rand::thread_rng());
        }

        let total = links.len();
        if total == 0 {
            info!("No zones to download");
            return Ok(SessionResult {
                elapsed: started.elapsed(),
                ..Default::default()
            });
        }

        let tasks: Vec<DownloadTask> = links.into_iter().map(DownloadTask::new).collect();
        let (producer, queue) = task_queue(self.config.worker.queue_capacity());
        let stats = Arc::new(DownloadStats::new());
        let fetcher = ZoneFetcher::new(self.client.clone(), self.config.fetch.clone());
        let pool = WorkerPool::new(
            self.config.worker.clone(),
            queue,
            fetcher,
            stats.clone(),
            self.events.clone(),
        );

        info!(
            "Downloading {} zones with {} parallel workers into {}",
            total,
            self.config.worker.parallel,
            self.config.fetch.out_dir.display()
        );

        // Workers cancel this on an authentication failure without touching
        // the caller's token
        let run_cancel = cancel.child_token();
        let producer_cancel = run_cancel.clone();
        let producer_handle =
            tokio::spawn(async move { producer.fill(tasks, &producer_cancel).await });

        let pool_result = pool.run(run_cancel).await;
        let producer_result = match producer_handle.await {
            Ok(result) => result.map(|queued| debug!("Producer queued {} tasks", queued)),
            Err(e) => Err(DownloadError::Other(format!("task producer panicked: {}", e))),
        };

        let pool_result = match pool_result {
            Err(e) if e.is_systemic() => {
                error!("Download run aborted: {}", e);
                return Err(e);
            }
            other => other,
        };

        if cancel.is_cancelled() {
            info!("Download run cancelled");
            return Err(DownloadError::Cancelled);
        }
        pool_result?;
        producer_result?;

        let result = SessionResult::from_snapshot(total, stats.snapshot(), started.elapsed());
        info!("{}", result.summary());
        Ok(result)
    }
}

/// Creates the output directory when it does not exist yet
async fn ensure_out_dir(out_dir: &Path) -> DownloadResult<()> {
    match tokio::fs::metadata(out_dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DownloadError::ConfigurationError(format!(
            "Output path {} is not a directory",
            out_dir.display()
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("'{}' does not exist, creating", out_dir.display());
            tokio::fs::create_dir_all(out_dir).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Zone label of a download link, lowercased
fn link_zone(link: &str) -> String {
    let name = url_basename(link);
    name.strip_suffix(ZONE_FILE_SUFFIX)
        .unwrap_or(&name)
        .to_lowercase()
}

fn normalized(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Narrows the link list to the requested zones and drops excluded ones
///
/// An empty `zones` selects every link. Zone names match the link's
/// `<zone>.zone` file name case-insensitively.
///
/// # Errors
///
/// Returns `DownloadError::ZonesNotAvailable` naming every requested zone
/// that has no link, in the order requested
pub fn select_links(
    links: Vec<String>,
    zones: &[String],
    exclude: &[String],
) -> DownloadResult<Vec<String>> {
    let wanted = normalized(zones);
    let mut links = links;

    if !wanted.is_empty() {
        let wanted_set: HashSet<&str> = wanted.iter().map(String::as_str).collect();
        links.retain(|link| wanted_set.contains(link_zone(link).as_str()));

        let found: HashSet<String> = links.iter().map(|link| link_zone(link)).collect();
        let missing: Vec<&str> = zones
            .iter()
            .map(|z| z.trim())
            .filter(|z| !z.is_empty() && !found.contains(&z.to_lowercase()))
            .collect();
        if !missing.is_empty() {
            return Err(DownloadError::ZonesNotAvailable {
                zones: missing.join(", "),
            });
        }
    }

    let excluded: HashSet<String> = normalized(exclude).into_iter().collect();
    if !excluded.is_empty() {
        let before = links.len();
        links.retain(|link| !excluded.contains(&link_zone(link)));
        debug!("Excluded {} links", before - links.len());
    }

    Ok(links)
}
