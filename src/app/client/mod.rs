//! HTTP client implementation for the CZDS API
//!
//! This module provides an authenticated client for ICANN's Centralized Zone
//! Data Service with token lifecycle management and fixed-delay retries.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `session`: credentials and single-flight token renewal
//! - `jwt`: access token payload decoding
//! - `http`: request execution with transport retries and API error decoding
//! - `requests`: zone request management endpoints
//! - `download`: zone metadata probes and streamed transfers

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::errors::{AuthResult, DownloadResult};

// Module declarations
pub mod config;
pub mod download;
pub mod http;
pub mod jwt;
pub mod requests;
pub mod session;


pub use config::ClientConfig;
pub use download::DownloadInfo;
pub use http::HttpExecutor;
pub use session::{Credentials, Session};

/// Client for the CZDS REST API
///
/// One client owns one session; clones of an `Arc<CzdsClient>` share the
/// token and the connection pool.
#[derive(Debug)]
pub struct CzdsClient {
    http: HttpExecutor,
    base_url: String,
}

impl CzdsClient {
    /// Creates a client without contacting the server
    ///
    /// The first authenticated request (or an explicit [`CzdsClient::authenticate`])
    /// obtains the token.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoints, timeouts and retry policy
    /// * `credentials` - CZDS account credentials
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the configuration is invalid or the HTTP client cannot be built
    pub fn new(config: ClientConfig, credentials: Credentials) -> DownloadResult<Self> {
        config.validate()?;
        let client = config.build_http_client()?;
        let session = Session::new(config.auth_url.clone(), credentials, config.token_margin);
        let http = HttpExecutor::new(client, session, &config);

        tracing::debug!(
            "Created CZDS client for {} (auth {})",
            config.base_url,
            config.auth_url
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Authenticates now so bad credentials fail fast
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the credentials are rejected or the token is unusable
    pub async fn authenticate(&self, cancel: &CancellationToken) -> AuthResult<DateTime<Utc>> {
        let expires_at = self.http.session().authenticate(&self.http, cancel).await?;
        tracing::info!("Authenticated, token valid until {}", expires_at.to_rfc3339());
        Ok(expires_at)
    }

    /// The request executor
    pub fn http(&self) -> &HttpExecutor {
        &self.http
    }

    /// The authentication session
    pub fn session(&self) -> &Session {
        self.http.session()
    }

    /// API base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins an endpoint path onto the base URL
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
