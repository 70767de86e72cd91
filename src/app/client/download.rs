//! Zone file metadata probes and streamed transfers
//!
//! `download_info` issues an authenticated HEAD and extracts the size, the
//! modification time and the server-suggested file name. `download_to_writer`
//! streams a GET body chunk by chunk into any async writer, racing every
//! chunk against cancellation.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Method, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CzdsClient;
use crate::constants::czds;
use crate::errors::{DownloadError, DownloadResult};

/// Remote metadata for one zone file, fetched fresh on every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    /// `filename` parameter of Content-Disposition, when present
    pub filename: Option<String>,
}

impl CzdsClient {
    /// Lists the zone file URLs the account may download
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails or the body is not a JSON array of strings
    pub async fn download_links(&self, cancel: &CancellationToken) -> DownloadResult<Vec<String>> {
        let links: Vec<String> = self
            .http()
            .get_json(cancel, &self.api_url(czds::LINKS_PATH))
            .await?;
        debug!("Download links returned {} links", links.len());
        Ok(links)
    }

    /// Probes a zone file with an authenticated HEAD request
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation token
    /// * `url` - Zone file URL from the links endpoint
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::MissingHeader` when Last-Modified or
    /// Content-Length is absent, `DownloadError::InvalidHeader` when either
    /// cannot be parsed, or the executor's error
    pub async fn download_info(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> DownloadResult<DownloadInfo> {
        debug!("Probing {}", url);
        let response = self
            .http()
            .execute(cancel, true, Method::HEAD, url, None)
            .await?;
        parse_download_info(url, response.headers())
    }

    /// Streams a zone file into `dest`, returning the number of bytes written
    ///
    /// `on_chunk` is called with the running byte count after every chunk.
    /// The writer is flushed but not synced.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::SizeMismatch` when the body length differs from
    /// a declared non-zero Content-Length, `DownloadError::Cancelled` if
    /// cancelled mid-stream, or an I/O or transport error
    pub async fn download_to_writer<W, F>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        dest: &mut W,
        on_chunk: F,
    ) -> DownloadResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
        F: FnMut(u64) + Send,
    {
        debug!("Downloading zone from {}", url);
        let started = Instant::now();
        let response = self
            .http()
            .execute(cancel, true, Method::GET, url, None)
            .await?;

        let declared = response.content_length().filter(|n| *n > 0);
        let written = stream_body(cancel, response, dest, on_chunk).await?;

        debug!(
            "Finished {} bytes from {} in {:.1}s",
            written,
            url,
            started.elapsed().as_secs_f64()
        );

        if let Some(expected) = declared {
            if written != expected {
                return Err(DownloadError::SizeMismatch {
                    expected,
                    actual: written,
                });
            }
        }

        Ok(written)
    }
}

/// Copies a response body into `dest` one chunk at a time
pub(crate) async fn stream_body<W, F>(
    cancel: &CancellationToken,
    response: Response,
    dest: &mut W,
    mut on_chunk: F,
) -> DownloadResult<u64>
where
    W: AsyncWrite + Unpin + Send,
    F: FnMut(u64) + Send,
{
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        dest.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_chunk(written);
    }

    dest.flush().await?;
    Ok(written)
}

/// Extracts `DownloadInfo` from HEAD response headers
pub fn parse_download_info(url: &str, headers: &HeaderMap) -> DownloadResult<DownloadInfo> {
    let header_str = |name: &'static str| -> DownloadResult<Option<String>> {
        match headers.get(name) {
            None => Ok(None),
            Some(value) => value
                .to_str()
                .map(|s| Some(s.trim().to_string()))
                .map_err(|_| DownloadError::InvalidHeader {
                    url: url.to_string(),
                    header: name,
                    value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                }),
        }
    };

    let last_modified_raw = header_str("Last-Modified")?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DownloadError::MissingHeader {
            url: url.to_string(),
            header: "Last-Modified",
        })?;
    let last_modified = DateTime::parse_from_rfc2822(&last_modified_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DownloadError::InvalidHeader {
            url: url.to_string(),
            header: "Last-Modified",
            value: last_modified_raw.clone(),
        })?;

    let content_length_raw = header_str("Content-Length")?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DownloadError::MissingHeader {
            url: url.to_string(),
            header: "Content-Length",
        })?;
    let content_length =
        content_length_raw
            .parse::<u64>()
            .map_err(|_| DownloadError::InvalidHeader {
                url: url.to_string(),
                header: "Content-Length",
                value: content_length_raw.clone(),
            })?;

    let filename = header_str("Content-Disposition")?
        .as_deref()
        .and_then(parse_content_disposition_filename);

    Ok(DownloadInfo {
        content_length,
        last_modified,
        filename,
    })
}

/// Returns the file name carried by a Content-Disposition value
///
/// Handles `filename="a.zone"`, bare `filename=a.zone` and the RFC 5987
/// `filename*=UTF-8''a.zone` form; the extended form wins when both appear.
pub fn parse_content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';') {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        if key == "filename" {
            let name = raw.trim_matches('"');
            if !name.is_empty() {
                plain = Some(name.to_string());
            }
        } else if key == "filename*" {
            // charset'lang'percent-encoded
            let encoded = raw.rsplit('\'').next().unwrap_or(raw).trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if !decoded.is_empty() {
                    extended = Some(decoded.into_owned());
                }
            }
        }
    }

    extended.or(plain)
}
