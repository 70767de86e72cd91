//! Single zone file fetcher
//!
//! One fetch attempt for one task: probe the remote file, resolve a safe
//! local name, decide whether the local copy is current, and if not stream
//! the body into `<destination>.tmp` and rename it into place. The final name
//! is never opened for writing, so it is either absent, the previous copy or
//! the complete new one.

pub mod path;
pub mod policy;
pub mod progress;

#[cfg(test)]
pub(crate) mod tests;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::client::{CzdsClient, DownloadInfo};
use crate::app::queue::{temp_path_for, DownloadTask};
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

pub use path::resolve_destination;
pub use policy::{Decision, LocalFile, SkipPolicy};
pub use progress::{format_bytes, ProgressReporter};

/// Options shared by every fetch of a run
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Directory zone files are written to
    pub out_dir: PathBuf,
    /// Download even when a local copy exists
    pub force: bool,
    /// Re-download when the local copy differs in size or is older
    pub redownload: bool,
    /// Name files after the URL instead of Content-Disposition
    pub use_url_name: bool,
    /// Log progress lines for large files
    pub progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(files::DEFAULT_OUT_DIR),
            force: false,
            redownload: false,
            use_url_name: false,
            progress: false,
        }
    }
}

impl FetchOptions {
    fn policy(&self) -> SkipPolicy {
        SkipPolicy {
            force: self.force,
            redownload: self.redownload,
        }
    }
}

/// Result of one successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64, elapsed: Duration },
    Skipped,
}

/// Fetches zone files into the output directory
#[derive(Debug, Clone)]
pub struct ZoneFetcher {
    client: Arc<CzdsClient>,
    options: FetchOptions,
}

impl ZoneFetcher {
    pub fn new(client: Arc<CzdsClient>, options: FetchOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Performs one fetch attempt for `task`
    ///
    /// Sets `task.destination` as soon as the local name is known.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Aborts the probe or the transfer; the temp file is removed
    /// * `task` - Task being worked on
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::UnsafePath` for a file name that would escape
    /// the output directory, `DownloadError::SizeMismatch` or
    /// `DownloadError::EmptyDownload` for an incomplete body, and any error
    /// from the probe, the transfer or the filesystem
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        task: &mut DownloadTask,
    ) -> DownloadResult<FetchOutcome> {
        debug!("Fetching {}", task.url);
        let info = self.client.download_info(cancel, &task.url).await?;

        let remote_name = if self.options.use_url_name {
            task.name.clone()
        } else {
            info.filename
                .clone()
                .ok_or_else(|| DownloadError::MissingHeader {
                    url: task.url.clone(),
                    header: "Content-Disposition",
                })?
        };

        let destination = resolve_destination(&self.options.out_dir, &remote_name)?;
        task.destination = Some(destination.clone());

        let local = local_file(&destination).await?;
        let decision = self.options.policy().decide(local, &info);
        if !decision.should_download() {
            debug!("Local file {} is current ({:?}), skipping", destination.display(), decision);
            return Ok(FetchOutcome::Skipped);
        }
        debug!("Downloading {} to {} ({:?})", task.name, destination.display(), decision);

        let started = Instant::now();
        let bytes = self
            .download_atomic(cancel, task, &destination, &info)
            .await?;
        let elapsed = started.elapsed();

        info!(
            "Downloaded {} ({}) in {:.1}s",
            task.name,
            format_bytes(bytes),
            elapsed.as_secs_f64()
        );
        Ok(FetchOutcome::Downloaded { bytes, elapsed })
    }

    /// Streams into the temp sibling and renames it over `destination`
    async fn download_atomic(
        &self,
        cancel: &CancellationToken,
        task: &DownloadTask,
        destination: &Path,
        info: &DownloadInfo,
    ) -> DownloadResult<u64> {
        let temp_path = temp_path_for(destination);

        let bytes = match self.write_temp(cancel, task, &temp_path, info).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_if_exists(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(source) = fs::rename(&temp_path, destination).await {
            remove_if_exists(&temp_path).await;
            return Err(DownloadError::AtomicOperationFailed {
                temp_path,
                final_path: destination.to_path_buf(),
                source,
            });
        }

        Ok(bytes)
    }

    async fn write_temp(
        &self,
        cancel: &CancellationToken,
        task: &DownloadTask,
        temp_path: &Path,
        info: &DownloadInfo,
    ) -> DownloadResult<u64> {
        let file = File::create(temp_path).await?;
        let mut writer = BufWriter::with_capacity(files::WRITE_BUFFER_SIZE, file);
        let mut progress =
            ProgressReporter::new(task.name.clone(), info.content_length, self.options.progress);

        let bytes = self
            .client
            .download_to_writer(cancel, &task.url, &mut writer, |written| {
                progress.update(written);
            })
            .await?;

        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_all().await?;
        drop(file);

        if bytes == 0 {
            return Err(DownloadError::EmptyDownload {
                name: task.name.clone(),
            });
        }
        Ok(bytes)
    }
}

/// Size and mtime of an existing regular file at `path`
async fn local_file(path: &Path) -> DownloadResult<Option<LocalFile>> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(LocalFile::from_metadata(&meta))),
        Ok(_) => Err(DownloadError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("{} exists and is not a regular file", path.display()),
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes a file, ignoring a missing one
pub async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
