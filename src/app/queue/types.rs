//! Core data structures for the download queue
//!
//! A [`DownloadTask`] is created for every zone URL when the link list is
//! materialised. Only the worker holding it mutates it, and it is never
//! persisted.

use std::path::PathBuf;

use crate::constants::TEMP_FILE_SUFFIX;

/// One zone file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Last segment of the URL path
    pub name: String,
    /// Absolute zone file URL
    pub url: String,
    /// Local path, known once the remote file name has been resolved
    pub destination: Option<PathBuf>,
    /// Fetch attempts made so far
    pub attempts: u32,
}

impl DownloadTask {
    /// Create a task for a zone URL
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url_basename(&url),
            url,
            destination: None,
            attempts: 0,
        }
    }

    /// Temporary sibling the body is streamed into
    pub fn temp_path(&self) -> Option<PathBuf> {
        self.destination.as_ref().map(|dest| temp_path_for(dest))
    }

    /// Zone label, i.e. the name without its `.zone` suffix
    pub fn zone(&self) -> &str {
        self.name
            .strip_suffix(crate::constants::czds::ZONE_FILE_SUFFIX)
            .unwrap_or(&self.name)
    }
}

/// `<path>.tmp`
pub fn temp_path_for(path: &std::path::Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(TEMP_FILE_SUFFIX);
    PathBuf::from(os)
}

/// Last non-empty path segment of a URL
///
/// Falls back to the text after the final `/` when the URL does not parse.
pub fn url_basename(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(last) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return urlencoding::decode(last)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| last.to_string());
        }
    }

    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}
