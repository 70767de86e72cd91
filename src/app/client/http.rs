//! Authenticated request execution with fixed-delay retry
//!
//! This module provides the single place every CZDS request passes through.
//! Transport failures (connect, DNS, timeout) are retried a bounded number of
//! times with a fixed, cancellable delay. A response with a non-2xx status is
//! never retried here: its `{message, httpStatus}` body is decoded and returned
//! as `DownloadError::Api` so that callers can decide what to do with it.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ClientConfig;
use super::session::Session;
use crate::errors::{DownloadError, DownloadResult};

const JSON: &str = "application/json";

/// Error document returned by the CZDS API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    http_status: Option<u16>,
}

/// Executes HTTP requests against CZDS on behalf of one session
#[derive(Debug)]
pub struct HttpExecutor {
    client: Client,
    session: Session,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpExecutor {
    /// Creates a new executor
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client to use for requests
    /// * `session` - Token state consulted by authenticated requests
    /// * `config` - Source of the retry policy
    pub fn new(client: Client, session: Session, config: &ClientConfig) -> Self {
        Self {
            client,
            session,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
        }
    }

    /// The session backing authenticated requests
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Performs one logical request
    ///
    /// When `auth` is set a valid bearer token is obtained from the session
    /// first, renewing it if needed.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Aborts the request, any retry sleep and authentication
    /// * `auth` - Whether to attach a bearer token
    /// * `method` - HTTP method
    /// * `url` - Absolute request URL
    /// * `body` - Optional JSON body, resent unchanged on every attempt
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on authentication failure, a non-2xx status,
    /// transport exhaustion or cancellation
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        auth: bool,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
    ) -> DownloadResult<Response> {
        let token = if auth {
            Some(self.session.ensure_valid_token(self, cancel).await?)
        } else {
            None
        };

        self.send_with_retry(cancel, method, url, body, token.as_deref())
            .await
    }

    /// Sends a request with an explicit bearer token, retrying transport errors
    ///
    /// This is the unauthenticated path the session itself uses to log in.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Api` for a non-2xx status,
    /// `DownloadError::RequestFailed` when every attempt hit a transport error
    /// and `DownloadError::Cancelled` if cancelled
    pub async fn send_with_retry(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        bearer: Option<&str>,
    ) -> DownloadResult<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let mut request = self
                .client
                .request(method.clone(), url)
                .header(ACCEPT, JSON);
            if let Some(body) = body {
                request = request.header(CONTENT_TYPE, JSON).body(body.to_vec());
            }
            if let Some(token) = bearer {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }

            debug!("{} {} (attempt {}/{})", method, url, attempt, self.max_attempts);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                result = request.send() => result,
            };

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => return Err(api_error(cancel, url, response).await),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "Request {} {} failed (attempt {}/{}): {}. Retrying in {}s",
                        method,
                        url,
                        attempt,
                        self.max_attempts,
                        e,
                        self.retry_delay.as_secs()
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        "Request {} {} failed after {} attempts: {}",
                        method, url, attempt, e
                    );
                    return Err(DownloadError::RequestFailed {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Authenticated GET decoding a JSON response
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails or the body is not valid JSON for `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> DownloadResult<T> {
        let response = self.execute(cancel, true, Method::GET, url, None).await?;
        read_json(cancel, response).await
    }

    /// Authenticated POST of a JSON body decoding a JSON response
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails or the body is not valid JSON for `T`
    pub async fn post_json<B, T>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &B,
    ) -> DownloadResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .execute(cancel, true, Method::POST, url, Some(&payload))
            .await?;
        read_json(cancel, response).await
    }

    /// Authenticated POST of a JSON body whose response content is ignored
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails
    pub async fn post_json_no_content<B>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &B,
    ) -> DownloadResult<()>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(body)?;
        self.execute(cancel, true, Method::POST, url, Some(&payload))
            .await?;
        Ok(())
    }
}

/// Reads a whole response body as JSON, racing the read against cancellation
///
/// # Errors
///
/// Returns `DownloadError::Json` if the body does not decode into `T`
pub async fn read_json<T: DeserializeOwned>(
    cancel: &CancellationToken,
    response: Response,
) -> DownloadResult<T> {
    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        bytes = response.bytes() => bytes?,
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// Converts a non-2xx response into a structured API error
///
/// Reading the body races `cancel` like every other read.
async fn api_error(cancel: &CancellationToken, url: &str, response: Response) -> DownloadError {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown status")
        .to_string();

    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return DownloadError::Cancelled,
        body = response.text() => body.unwrap_or_default(),
    };
    let message = if body.trim().is_empty() {
        fallback
    } else {
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) if !err.message.is_empty() => {
                if let Some(reported) = err.http_status.filter(|s| *s != status.as_u16()) {
                    debug!("{} reported status {} in body", url, reported);
                }
                err.message
            }
            _ => body.trim().to_string(),
        }
    };

    DownloadError::Api {
        url: url.to_string(),
        status: status.as_u16(),
        message,
    }
}
