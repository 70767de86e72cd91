//! Error types for CZDS Fetcher
//!
//! This module defines the error types for all components of the application.
//! Errors are split by domain so callers can tell a fatal authentication failure
//! from a per-zone download failure that the worker pool may retry.

use std::path::PathBuf;
use thiserror::Error;

/// Authentication-related errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// No username or password could be obtained
    #[error(
        "Missing CZDS credentials. Set CZDS_USERNAME and CZDS_PASSWORD, pass --username, or use --passin"
    )]
    MissingCredentials,

    /// The authentication endpoint refused the credentials
    #[error("CZDS authentication rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The access token could not be decoded
    #[error("Invalid access token: {reason}")]
    InvalidToken { reason: String },

    /// The server handed out a token that is already expired
    #[error("Access token is already expired")]
    TokenExpired,

    /// HTTP request failed during authentication
    #[error("HTTP request failed during authentication")]
    Http(#[from] reqwest::Error),

    /// Transport failures exhausted the authentication attempts
    #[error("Authentication request failed: {reason}")]
    Transport { reason: String },

    /// A --passin source could not be read
    #[error("Could not read password from {source_name}: {reason}")]
    PasswordSource { source_name: String, reason: String },

    /// Terminal or file I/O while acquiring credentials
    #[error("I/O error while reading credentials")]
    Io(#[from] std::io::Error),

    /// Cancelled while authenticating
    #[error("Authentication cancelled")]
    Cancelled,
}

/// Download and HTTP client errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Authentication failed before the request could be sent
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// HTTP error outside the retry loop (reading a body, building a client)
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Transport errors on every attempt
    #[error("Request to {url} failed after {attempts} attempts")]
    RequestFailed {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Server returned a non-2xx status
    #[error("Request to {url} failed with HTTP {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    /// Required response header is absent
    #[error("Response from {url} is missing the '{header}' header")]
    MissingHeader { url: String, header: &'static str },

    /// Response header could not be parsed
    #[error("Invalid '{header}' header from {url}: {value}")]
    InvalidHeader {
        url: String,
        header: &'static str,
        value: String,
    },

    /// Resolved filename would escape the output directory
    #[error("Refusing unsafe filename {name:?}: {reason}")]
    UnsafePath { name: String, reason: String },

    /// Body length does not match Content-Length
    #[error("File size mismatch. Expected: {expected} bytes, got: {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Successful response with no content
    #[error("Download of {name} was empty")]
    EmptyDownload { name: String },

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Requested zones are not among the download links
    #[error("Zones not available for download: {zones}")]
    ZonesNotAvailable { zones: String },

    /// JSON body could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error for other issues
    #[error("{0}")]
    Other(String),
}

impl DownloadError {
    /// Whether the worker pool may retry a fetch that failed with this error
    ///
    /// Transport exhaustion, HTTP statuses and integrity failures are retried
    /// from scratch. Authentication, local filesystem, path-safety and
    /// cancellation errors end the task immediately.
    pub fn is_task_retryable(&self) -> bool {
        match self {
            DownloadError::Http(_)
            | DownloadError::RequestFailed { .. }
            | DownloadError::Api { .. }
            | DownloadError::MissingHeader { .. }
            | DownloadError::InvalidHeader { .. }
            | DownloadError::SizeMismatch { .. }
            | DownloadError::EmptyDownload { .. }
            | DownloadError::Json(_) => true,

            DownloadError::Auth(_)
            | DownloadError::UnsafePath { .. }
            | DownloadError::Io(_)
            | DownloadError::AtomicOperationFailed { .. }
            | DownloadError::InvalidUrl { .. }
            | DownloadError::ZonesNotAvailable { .. }
            | DownloadError::Cancelled
            | DownloadError::ConfigurationError(_)
            | DownloadError::Other(_) => false,
        }
    }

    /// Whether this error must abort the whole download run
    ///
    /// Every remaining task would fail the same way, so authentication
    /// failures stop all workers instead of being recorded per zone.
    pub fn is_systemic(&self) -> bool {
        matches!(self, DownloadError::Auth(e) if !matches!(e, AuthError::Cancelled))
    }

    /// Whether this error is (or wraps) a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DownloadError::Cancelled | DownloadError::Auth(AuthError::Cancelled)
        )
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading the configuration
    #[error("I/O error reading configuration")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("{message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_task_retryable(),
            AppError::Auth(AuthError::Http(_)) | AppError::Auth(AuthError::Transport { .. }) => {
                true
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) | AppError::Download(DownloadError::Auth(_)) => "authentication",
            AppError::Download(_) => "download",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
