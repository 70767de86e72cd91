//! Zone request management
//!
//! Serde models of the CZDS request documents and thin wrappers over the
//! request endpoints, plus the bulk helpers built on them: requesting every
//! available TLD, extending approved requests and exporting the CSV report.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::download::stream_body;
use super::CzdsClient;
use crate::app::lister::Lister;
use crate::constants::{czds, listing};
use crate::errors::{DownloadError, DownloadResult};

/// Values for `RequestsFilter::status` and `Request::status`
pub mod request_status {
    pub const ALL: &str = "";
    pub const SUBMITTED: &str = "Submitted";
    pub const PENDING: &str = "Pending";
    pub const APPROVED: &str = "Approved";
    pub const DENIED: &str = "Denied";
    pub const REVOKED: &str = "Revoked";
    pub const EXPIRED: &str = "Expired";
    pub const CANCELED: &str = "Canceled";
}

/// Values for `TldStatus::current_status` and `RequestsInfo::status`
pub mod tld_status {
    pub const AVAILABLE: &str = "available";
    pub const SUBMITTED: &str = "submitted";
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const DENIED: &str = "denied";
    pub const EXPIRED: &str = "expired";
    pub const CANCELED: &str = "canceled";
    pub const REVOKED: &str = "revoked";

    /// Statuses from which a new request may be submitted
    pub const REQUESTABLE: [&str; 5] = [AVAILABLE, CANCELED, DENIED, EXPIRED, REVOKED];
}

/// Sort fields and directions for `RequestsSort`
pub mod sort {
    pub const ASC: &str = "asc";
    pub const DESC: &str = "desc";

    pub const BY_TLD: &str = "tld";
    pub const BY_STATUS: &str = "status";
    pub const BY_LAST_UPDATED: &str = "last_updated";
    pub const BY_EXPIRATION: &str = "expired";
    pub const BY_CREATED: &str = "created";
    pub const BY_AUTO_RENEW: &str = "auto_renew";
}

/// Approved requests expiring further out than this are not checked for extension
pub const EXTENSION_THRESHOLD_DAYS: i64 = 120;

/// Search filter for `POST /czds/requests/all`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestsFilter {
    pub status: String,
    pub filter: String,
    pub pagination: RequestsPagination,
    pub sort: RequestsSort,
}

impl RequestsFilter {
    /// Filter on a status, newest first, first page
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            filter: String::new(),
            pagination: RequestsPagination {
                size: listing::PAGE_SIZE,
                page: 0,
            },
            sort: RequestsSort {
                field: sort::BY_CREATED.to_string(),
                direction: sort::DESC.to_string(),
            },
        }
    }

    /// Restrict to zone names matching `text`
    pub fn matching(mut self, text: &str) -> Self {
        self.filter = text.to_string();
        self
    }

    /// Order results by `field` in `direction`
    pub fn sorted_by(mut self, field: &str, direction: &str) -> Self {
        self.sort = RequestsSort {
            field: field.to_string(),
            direction: direction.to_string(),
        };
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestsPagination {
    pub size: u32,
    pub page: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestsSort {
    pub field: String,
    pub direction: String,
}

/// One row of the requests listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    pub request_id: String,
    pub tld: String,
    /// Unicode form of the TLD; the API spells the field `ulable`
    #[serde(rename = "ulable")]
    pub ulabel: String,
    pub status: String,
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "last_updated")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Epoch zero or absent when no expiry is set
    pub expired: Option<DateTime<Utc>>,
    pub sftp: bool,
    #[serde(rename = "auto_renew")]
    pub auto_renew: bool,
}

/// One page of the requests listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestsResponse {
    pub requests: Vec<Request>,
    pub total_requests: i64,
}

/// Availability of one TLD for the account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TldStatus {
    pub tld: String,
    #[serde(rename = "ulable")]
    pub ulabel: String,
    pub current_status: String,
    pub sftp: bool,
}

/// An event in a request's history
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub action: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FtpDetails {
    pub private_data_error: bool,
}

/// Full detail of one zone request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestsInfo {
    pub request_id: String,
    pub tld: Option<TldStatus>,
    #[serde(rename = "ftpips")]
    pub ftp_ips: Vec<String>,
    pub status: String,
    pub tc_version: String,
    pub created: Option<DateTime<Utc>>,
    pub request_ip: String,
    pub reason: String,
    #[serde(rename = "last_updated")]
    pub last_updated: Option<DateTime<Utc>>,
    pub cancellable: bool,
    pub extensible: bool,
    pub extension_in_process: bool,
    #[serde(rename = "auto_renew")]
    pub auto_renew: bool,
    pub expired: Option<DateTime<Utc>>,
    pub history: Vec<HistoryEntry>,
    pub ftp_details: Option<FtpDetails>,
    pub private_data_error: bool,
}

/// Body of `POST /czds/requests/create`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSubmission {
    pub all_tlds: bool,
    pub tld_names: Vec<String>,
    pub reason: String,
    /// Version of the terms being accepted
    pub tc_version: String,
    // The API spells this field "additionalFtfIps"
    #[serde(rename = "additionalFtfIps", skip_serializing_if = "Vec::is_empty", default)]
    pub additional_ftp_ips: Vec<String>,
}

/// Current terms and conditions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Terms {
    pub version: String,
    pub content: String,
    pub content_url: String,
    pub created: Option<DateTime<Utc>>,
}

/// Body of `POST /czds/requests/cancel`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelRequestSubmission {
    #[serde(rename = "integrationId")]
    pub request_id: String,
    #[serde(rename = "tldName")]
    pub tld_name: String,
}

impl CzdsClient {
    /// Fetches one page of zone requests
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn requests(
        &self,
        cancel: &CancellationToken,
        filter: &RequestsFilter,
    ) -> DownloadResult<RequestsResponse> {
        self.http()
            .post_json(cancel, &self.api_url(czds::REQUESTS_PATH), filter)
            .await
    }

    /// Lists every request with the given status
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if any page fails
    pub async fn all_requests(
        &self,
        cancel: &CancellationToken,
        status: &str,
    ) -> DownloadResult<Vec<Request>> {
        Ok(Lister::new(self, status).collect_all(cancel).await?.items)
    }

    /// Fetches the detail of one request
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn request_info(
        &self,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> DownloadResult<RequestsInfo> {
        let url = self.api_url(&format!("{}{}", czds::REQUEST_INFO_PATH, request_id));
        self.http().get_json(cancel, &url).await
    }

    /// Fetches the availability of every TLD
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn tld_status(&self, cancel: &CancellationToken) -> DownloadResult<Vec<TldStatus>> {
        self.http()
            .get_json(cancel, &self.api_url(czds::TLDS_PATH))
            .await
    }

    /// Fetches the current terms and conditions
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn terms(&self, cancel: &CancellationToken) -> DownloadResult<Terms> {
        self.http()
            .get_json(cancel, &self.api_url(czds::TERMS_PATH))
            .await
    }

    /// Submits a new zone request
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn submit_request(
        &self,
        cancel: &CancellationToken,
        request: &RequestSubmission,
    ) -> DownloadResult<()> {
        self.http()
            .post_json_no_content(cancel, &self.api_url(czds::CREATE_REQUEST_PATH), request)
            .await
    }

    /// Cancels a pending request
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn cancel_request(
        &self,
        cancel: &CancellationToken,
        submission: &CancelRequestSubmission,
    ) -> DownloadResult<RequestsInfo> {
        self.http()
            .post_json(cancel, &self.api_url(czds::CANCEL_REQUEST_PATH), submission)
            .await
    }

    /// Asks for an extension of an approved request
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn request_extension(
        &self,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> DownloadResult<RequestsInfo> {
        let url = self.api_url(&format!("{}{}", czds::EXTEND_REQUEST_PATH, request_id));
        self.http()
            .post_json(cancel, &url, &serde_json::json!({}))
            .await
    }

    /// Streams the CSV report of all requests into `dest`
    ///
    /// The bytes are copied unmodified. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::EmptyDownload` if the report has no content
    pub async fn download_report<W>(
        &self,
        cancel: &CancellationToken,
        dest: &mut W,
        on_chunk: impl FnMut(u64) + Send,
    ) -> DownloadResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let url = self.api_url(czds::REPORT_PATH);
        let response = self
            .http()
            .execute(cancel, true, Method::GET, &url, None)
            .await?;

        let written = stream_body(cancel, response, dest, on_chunk).await?;
        if written == 0 {
            return Err(DownloadError::EmptyDownload { name: url });
        }
        Ok(written)
    }

    /// Returns the ID of the most recently updated request for `zone`
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Other` if no request matches the zone
    pub async fn zone_request_id(
        &self,
        cancel: &CancellationToken,
        zone: &str,
    ) -> DownloadResult<String> {
        let zone = zone.to_lowercase();
        let filter = RequestsFilter::new(request_status::ALL)
            .matching(&zone)
            .sorted_by(sort::BY_LAST_UPDATED, sort::DESC);

        let mut lister = Lister::with_filter(self, filter);
        while let Some(page) = lister.next_page(cancel).await? {
            if let Some(found) = page.iter().find(|r| r.tld.to_lowercase() == zone) {
                return Ok(found.request_id.clone());
            }
        }

        Err(DownloadError::Other(format!(
            "no request found for zone {}",
            zone
        )))
    }

    /// Requests the given TLDs under the current terms
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the terms cannot be read or the submission fails
    pub async fn request_tlds(
        &self,
        cancel: &CancellationToken,
        tlds: &[String],
        reason: &str,
    ) -> DownloadResult<()> {
        debug!("Requesting TLDs {:?}", tlds);
        let terms = self.terms(cancel).await?;
        let request = RequestSubmission {
            all_tlds: false,
            tld_names: tlds.to_vec(),
            reason: reason.to_string(),
            tc_version: terms.version,
            additional_ftp_ips: Vec::new(),
        };
        self.submit_request(cancel, &request).await
    }

    /// Requests every TLD currently open to a new request, minus `except`
    ///
    /// Returns the TLDs requested; an empty list means nothing was submitted.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if any underlying call fails
    pub async fn request_all_tlds_except(
        &self,
        cancel: &CancellationToken,
        reason: &str,
        except: &[String],
    ) -> DownloadResult<Vec<String>> {
        let except = lowercase_set(except);
        let status = self.tld_status(cancel).await?;

        let to_request: Vec<String> = status
            .into_iter()
            .filter(|t| !except.contains(&t.tld.to_lowercase()))
            .filter(|t| tld_status::REQUESTABLE.contains(&t.current_status.as_str()))
            .map(|t| t.tld)
            .collect();

        if to_request.is_empty() {
            debug!("No TLDs to request");
            return Ok(to_request);
        }
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let terms = self.terms(cancel).await?;
        let request = RequestSubmission {
            all_tlds: true,
            tld_names: to_request.clone(),
            reason: reason.to_string(),
            tc_version: terms.version,
            additional_ftp_ips: Vec::new(),
        };
        info!("Requesting {} TLDs", to_request.len());
        self.submit_request(cancel, &request).await?;
        Ok(to_request)
    }

    /// Requests an extension of the latest request for `tld`
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Other` if the server reports no extension in progress afterwards
    pub async fn extend_tld(&self, cancel: &CancellationToken, tld: &str) -> DownloadResult<()> {
        let request_id = self.zone_request_id(cancel, tld).await?;
        debug!("Extending {} (request {})", tld, request_id);

        let info = self.request_extension(cancel, &request_id).await?;
        if !info.extension_in_process {
            return Err(DownloadError::Other(format!(
                "zone request {} ({}) has no extension in progress",
                tld, request_id
            )));
        }
        Ok(())
    }

    /// Extends every approved request that the server marks extensible, minus `except`
    ///
    /// Requests are walked by ascending expiry; the walk stops at the first
    /// one expiring beyond [`EXTENSION_THRESHOLD_DAYS`]. Returns the TLDs extended.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if any underlying call fails
    pub async fn extend_all_tlds_except(
        &self,
        cancel: &CancellationToken,
        except: &[String],
    ) -> DownloadResult<Vec<String>> {
        let except = lowercase_set(except);
        let horizon = Utc::now() + chrono::Duration::days(EXTENSION_THRESHOLD_DAYS);
        let filter = RequestsFilter::new(request_status::APPROVED)
            .sorted_by(sort::BY_EXPIRATION, sort::ASC);

        let mut to_extend = Vec::new();
        let mut lister = Lister::with_filter(self, filter);
        'pages: while let Some(page) = lister.next_page(cancel).await? {
            for request in page {
                if request.expired.is_some_and(|exp| exp > horizon) {
                    debug!(
                        "Request {} for {} expires beyond {} days, looking no further",
                        request.request_id, request.tld, EXTENSION_THRESHOLD_DAYS
                    );
                    break 'pages;
                }
                if except.contains(&request.tld.to_lowercase()) {
                    continue;
                }
                let info = self.request_info(cancel, &request.request_id).await?;
                if info.extensible {
                    to_extend.push(request);
                }
            }
        }

        info!("Requesting extensions for {} TLDs", to_extend.len());
        let mut extended = Vec::with_capacity(to_extend.len());
        for request in to_extend {
            self.request_extension(cancel, &request.request_id).await?;
            extended.push(request.tld);
        }
        Ok(extended)
    }
}

fn lowercase_set(items: &[String]) -> std::collections::HashSet<String> {
    items.iter().map(|s| s.trim().to_lowercase()).collect()
}
