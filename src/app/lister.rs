//! Paginated walk over the zone requests collection
//!
//! [`Lister`] pages through `POST /czds/requests/all` with a fixed page size,
//! preserving server order, and stops at the first empty page. The page source
//! is a trait so the walk can be exercised without a server.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::app::client::requests::{RequestsFilter, RequestsResponse, Request};
use crate::app::client::CzdsClient;
use crate::constants::listing;
use crate::errors::{DownloadError, DownloadResult};

/// Anything that can return one page of zone requests
pub trait PageSource {
    /// Fetches the page described by `filter`
    fn fetch_page(
        &self,
        cancel: &CancellationToken,
        filter: &RequestsFilter,
    ) -> impl Future<Output = DownloadResult<RequestsResponse>> + Send;
}

impl PageSource for CzdsClient {
    fn fetch_page(
        &self,
        cancel: &CancellationToken,
        filter: &RequestsFilter,
    ) -> impl Future<Output = DownloadResult<RequestsResponse>> + Send {
        self.requests(cancel, filter)
    }
}

/// All items of a listing plus the total the server declared
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub items: Vec<Request>,
    /// `totalRequests` from the first page
    pub total: i64,
}

/// Page-by-page iterator over zone requests
#[derive(Debug)]
pub struct Lister<'a, S: PageSource> {
    source: &'a S,
    filter: RequestsFilter,
    exhausted: bool,
    total: Option<i64>,
}

impl<'a, S: PageSource> Lister<'a, S> {
    /// Lists every request with the given status, newest first
    pub fn new(source: &'a S, status: &str) -> Self {
        Self::with_filter(source, RequestsFilter::new(status))
    }

    /// Lists with a caller-supplied filter
    ///
    /// Status, free-text filter and sort pass through unchanged; the page
    /// size is fixed and the cursor starts at the first page.
    pub fn with_filter(source: &'a S, mut filter: RequestsFilter) -> Self {
        filter.pagination.size = listing::PAGE_SIZE;
        filter.pagination.page = 0;
        Self {
            source,
            filter,
            exhausted: false,
            total: None,
        }
    }

    /// Total declared by the first page, once it has been fetched
    pub fn total(&self) -> Option<i64> {
        self.total
    }

    /// Index of the next page to fetch
    pub fn page(&self) -> u32 {
        self.filter.pagination.page
    }

    /// Fetches the next page, or `None` once an empty page has been seen
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Cancelled` if cancelled, or the page source's error
    pub async fn next_page(
        &mut self,
        cancel: &CancellationToken,
    ) -> DownloadResult<Option<Vec<Request>>> {
        if self.exhausted {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        debug!(
            "Requesting {} requests on page {}",
            self.filter.pagination.size, self.filter.pagination.page
        );
        let response = self.source.fetch_page(cancel, &self.filter).await?;
        self.filter.pagination.page += 1;

        if self.total.is_none() {
            self.total = Some(response.total_requests);
        }

        if response.requests.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        Ok(Some(response.requests))
    }

    /// Drains every page in order
    ///
    /// # Errors
    ///
    /// Returns the first error from `next_page`
    pub async fn collect_all(mut self, cancel: &CancellationToken) -> DownloadResult<ListResult> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page(cancel).await? {
            items.extend(page);
        }

        let total = self.total.unwrap_or(0);
        debug!("Listed {} requests, server reported {}", items.len(), total);
        Ok(ListResult { items, total })
    }
}
