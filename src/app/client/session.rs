//! CZDS session and access token lifecycle
//!
//! The session owns the credentials and the current bearer token. Every
//! authenticated request goes through [`Session::ensure_valid_token`], which
//! holds an async mutex across the whole check-and-refresh so that concurrent
//! callers trigger at most one authentication round trip.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::http::HttpExecutor;
use super::jwt;
use crate::errors::{AuthError, AuthResult, DownloadError};

/// CZDS account credentials
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create credentials from a username and password
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body returned by the authentication endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<TokenState>,
    /// Status and message of the response that refused the credentials
    rejected: Option<(u16, String)>,
}

impl SessionState {
    /// Stores the result of an authentication round trip
    fn record(&mut self, result: AuthResult<TokenState>) -> AuthResult<TokenState> {
        match result {
            Ok(fresh) => {
                self.token = Some(fresh.clone());
                Ok(fresh)
            }
            Err(AuthError::Rejected { status, message }) => {
                self.token = None;
                self.rejected = Some((status, message.clone()));
                Err(AuthError::Rejected { status, message })
            }
            Err(e) => Err(e),
        }
    }
}

/// Authentication state shared by every request of one client
pub struct Session {
    auth_url: String,
    credentials: Credentials,
    token_margin: chrono::Duration,
    state: Mutex<SessionState>,
    auth_calls: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("auth_url", &self.auth_url)
            .field("credentials", &self.credentials)
            .field("auth_calls", &self.auth_calls.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session with no token yet
    ///
    /// # Arguments
    ///
    /// * `auth_url` - Authentication endpoint the credentials are posted to
    /// * `credentials` - Account username and password
    /// * `token_margin` - Tokens expiring within this margin are renewed early
    pub fn new(auth_url: impl Into<String>, credentials: Credentials, token_margin: Duration) -> Self {
        Self {
            auth_url: auth_url.into(),
            credentials,
            token_margin: chrono::Duration::from_std(token_margin)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            state: Mutex::new(SessionState::default()),
            auth_calls: AtomicU64::new(0),
        }
    }

    /// Authentication endpoint for this session
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Account name the session authenticates as
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Number of authentication round trips performed so far
    pub fn auth_calls(&self) -> u64 {
        self.auth_calls.load(Ordering::Relaxed)
    }

    /// Expiry of the currently held token, if any
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.token.as_ref().map(|s| s.expires_at)
    }

    /// Returns a token that stays valid for at least the safety margin
    ///
    /// The lock is held across the check and the refresh, so concurrent
    /// callers are serialised and all but the first observe the fresh token.
    /// Once the endpoint has refused the credentials, later callers get the
    /// same rejection without another round trip.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if authentication is needed and fails, or
    /// `AuthError::Cancelled` if cancelled while waiting
    pub async fn ensure_valid_token(
        &self,
        http: &HttpExecutor,
        cancel: &CancellationToken,
    ) -> AuthResult<String> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            guard = self.state.lock() => guard,
        };

        if let Some((status, message)) = &state.rejected {
            return Err(AuthError::Rejected {
                status: *status,
                message: message.clone(),
            });
        }

        if let Some(current) = state.token.as_ref() {
            if Utc::now() + self.token_margin < current.expires_at {
                return Ok(current.access_token.clone());
            }
            debug!(
                "Access token expires at {}, renewing",
                current.expires_at.to_rfc3339()
            );
        }

        let fresh = state.record(self.fetch_token(http, cancel).await)?;
        Ok(fresh.access_token)
    }

    /// Authenticates unconditionally, replacing any held token
    ///
    /// A successful round trip also clears an earlier rejection.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the credentials are rejected or the token is unusable
    pub async fn authenticate(
        &self,
        http: &HttpExecutor,
        cancel: &CancellationToken,
    ) -> AuthResult<DateTime<Utc>> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            guard = self.state.lock() => guard,
        };

        let fresh = state.record(self.fetch_token(http, cancel).await)?;
        state.rejected = None;
        Ok(fresh.expires_at)
    }

    /// Performs the authentication round trip; the caller holds the lock
    async fn fetch_token(
        &self,
        http: &HttpExecutor,
        cancel: &CancellationToken,
    ) -> AuthResult<TokenState> {
        info!("Authenticating to {} as {}", self.auth_url, self.credentials.username);
        self.auth_calls.fetch_add(1, Ordering::Relaxed);

        let body = serde_json::to_vec(&self.credentials).map_err(|e| AuthError::Transport {
            reason: format!("could not encode credentials: {}", e),
        })?;

        let response = http
            .send_with_retry(cancel, Method::POST, &self.auth_url, Some(&body), None)
            .await
            .map_err(into_auth_error)?;

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            bytes = response.bytes() => bytes?,
        };

        let auth: AuthResponse =
            serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidToken {
                reason: format!("could not decode authentication response: {}", e),
            })?;

        let access_token = match auth.access_token {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(AuthError::InvalidToken {
                    reason: auth
                        .message
                        .unwrap_or_else(|| "no access token in response".to_string()),
                })
            }
        };

        let expires_at = jwt::expiry(&access_token)?;
        if expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        debug!("Access token valid until {}", expires_at.to_rfc3339());

        Ok(TokenState {
            access_token,
            expires_at,
        })
    }
}

/// Maps an executor failure on the authentication endpoint to an `AuthError`
fn into_auth_error(err: DownloadError) -> AuthError {
    match err {
        DownloadError::Api {
            status, message, ..
        } => AuthError::Rejected { status, message },
        DownloadError::Cancelled => AuthError::Cancelled,
        DownloadError::Auth(e) => e,
        DownloadError::Http(e) => AuthError::Http(e),
        DownloadError::RequestFailed { source, .. } => AuthError::Http(source),
        other => AuthError::Transport {
            reason: other.to_string(),
        },
    }
}
