//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the HTTP client
//! and the retry parameters used by the request executor.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{czds, http, limits};
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for the CZDS HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Authentication endpoint
    pub auth_url: String,
    /// API base URL (no trailing slash)
    pub base_url: String,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout, including the response body
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Attempts per request before a transport error is surfaced
    pub max_attempts: u32,
    /// Fixed delay between transport retries
    pub retry_delay: Duration,
    /// Renew the token when it expires within this margin
    pub token_margin: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auth_url: czds::AUTH_URL.to_string(),
            base_url: czds::BASE_URL.to_string(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            max_attempts: limits::MAX_ATTEMPTS,
            retry_delay: limits::RETRY_DELAY,
            token_margin: limits::TOKEN_SAFETY_MARGIN,
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at the CZDS test environment
    pub fn test_environment() -> Self {
        Self {
            auth_url: czds::TEST_AUTH_URL.to_string(),
            base_url: czds::TEST_BASE_URL.to_string(),
            ..Default::default()
        }
    }

    /// Override both endpoints
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the transport retry policy
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> DownloadResult<()> {
        for (field, value) in [("auth_url", &self.auth_url), ("base_url", &self.base_url)] {
            url::Url::parse(value).map_err(|e| DownloadError::InvalidUrl {
                url: format!("{} = {}", field, value),
                error: e.to_string(),
            })?;
        }

        if self.max_attempts == 0 {
            return Err(DownloadError::ConfigurationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(DownloadError::ConfigurationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> DownloadResult<Client> {
        let mut client_builder = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(DownloadError::Http)
    }
}
