//! Skip or download decision for one zone file

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::app::client::DownloadInfo;

/// How existing local files are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipPolicy {
    /// Download unconditionally
    pub force: bool,
    /// Re-download an existing file when it differs from the remote copy
    pub redownload: bool,
}

/// Why a file is or is not downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forced,
    Missing,
    SizeDiffers { local: u64, remote: u64 },
    RemoteNewer,
    UpToDate,
    Exists,
}

impl Decision {
    /// Whether the body should be fetched
    pub fn should_download(self) -> bool {
        !matches!(self, Decision::UpToDate | Decision::Exists)
    }
}

/// Size and modification time of the local copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFile {
    pub len: u64,
    pub modified: DateTime<Utc>,
}

impl LocalFile {
    /// Reads size and mtime from file metadata
    pub fn from_metadata(meta: &Metadata) -> Self {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            len: meta.len(),
            modified: DateTime::<Utc>::from(modified),
        }
    }
}

impl SkipPolicy {
    /// Decides what to do with a remote file given the local copy, if any
    pub fn decide(&self, local: Option<LocalFile>, remote: &DownloadInfo) -> Decision {
        if self.force {
            return Decision::Forced;
        }

        let Some(local) = local else {
            return Decision::Missing;
        };

        if !self.redownload {
            return Decision::Exists;
        }

        if local.len != remote.content_length {
            return Decision::SizeDiffers {
                local: local.len,
                remote: remote.content_length,
            };
        }
        if local.modified < remote.last_modified {
            return Decision::RemoteNewer;
        }
        Decision::UpToDate
    }
}
