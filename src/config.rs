//! Configuration management for CZDS Fetcher
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! CLI flags. The file is `--config FILE` when given, otherwise
//! `<config dir>/czds_fetcher/config.toml` if it exists.
//!
//! ```toml
//! [client]
//! retry_delay = "10s"
//! token_margin = "30s"
//!
//! [download]
//! out_dir = "/srv/zones"
//! parallel = 10
//! redownload = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{ClientConfig, FetchOptions, WorkerConfig};
use crate::constants::{config as config_consts, czds, files, http, limits, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP client settings
    pub client: ClientSection,
    /// Download run settings
    pub download: DownloadSection,
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Authentication endpoint
    pub auth_url: String,
    /// API base URL
    pub base_url: String,
    /// Whole-request timeout, including a zone body
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Attempts per request on transport errors
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Renew the token this long before it expires
    #[serde(with = "humantime_serde")]
    pub token_margin: Duration,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            auth_url: czds::AUTH_URL.to_string(),
            base_url: czds::BASE_URL.to_string(),
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            max_attempts: limits::MAX_ATTEMPTS,
            retry_delay: limits::RETRY_DELAY,
            token_margin: limits::TOKEN_SAFETY_MARGIN,
        }
    }
}

/// TOML-friendly download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    /// Directory zone files are saved to
    pub out_dir: PathBuf,
    /// Zones downloaded in parallel
    pub parallel: usize,
    /// Attempts per zone file
    pub retries: u32,
    /// Delay between attempts of the same zone file
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Download even when a local copy exists
    pub force: bool,
    /// Re-download when the remote copy is newer or a different size
    pub redownload: bool,
    /// Name files after the URL instead of the Content-Disposition header
    pub urlname: bool,
    /// Log progress for large files
    pub progress: bool,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(files::DEFAULT_OUT_DIR),
            parallel: workers::DEFAULT_PARALLEL,
            retries: workers::DEFAULT_RETRIES,
            retry_delay: workers::RETRY_DELAY,
            force: false,
            redownload: false,
            urlname: false,
            progress: false,
        }
    }
}

impl AppConfig {
    /// Loads the configuration file, or defaults when there is none
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when an explicit file is missing,
    /// `ConfigError::InvalidFormat` for malformed TOML, or `ConfigError::Io`
    pub async fn load(config_file_override: Option<&Path>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                Some(path.to_path_buf())
            }
            None => Self::default_config_path().filter(|path| path.exists()),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `<config dir>/czds_fetcher/config.toml` for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(config_consts::APP_DIR)
                .join(config_consts::FILE_NAME)
        })
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Checks value ranges
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("client.auth_url", &self.client.auth_url),
            ("client.base_url", &self.client.base_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(invalid(field, value, format!("Not a valid URL: {}", e)));
            }
        }

        if self.client.max_attempts == 0 {
            return Err(invalid("client.max_attempts", 0, "Must be at least 1"));
        }
        if self.client.request_timeout.is_zero() {
            return Err(invalid("client.request_timeout", "0s", "Must be positive"));
        }
        if self.client.connect_timeout.is_zero() {
            return Err(invalid("client.connect_timeout", "0s", "Must be positive"));
        }

        let download = &self.download;
        if download.parallel == 0 || download.parallel > workers::MAX_PARALLEL {
            return Err(invalid(
                "download.parallel",
                download.parallel,
                format!("Must be between 1 and {}", workers::MAX_PARALLEL),
            ));
        }
        if download.retries == 0 {
            return Err(invalid("download.retries", 0, "Must be at least 1"));
        }
        if download.out_dir.as_os_str().is_empty() {
            return Err(invalid("download.out_dir", "\"\"", "Must not be empty"));
        }

        Ok(())
    }

    /// Points the client at the CZDS test environment
    pub fn use_test_environment(&mut self) {
        self.client.auth_url = czds::TEST_AUTH_URL.to_string();
        self.client.base_url = czds::TEST_BASE_URL.to_string();
    }

    /// Runtime HTTP client configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.client.request_timeout,
            connect_timeout: self.client.connect_timeout,
            token_margin: self.client.token_margin,
            ..ClientConfig::default()
        }
        .with_endpoints(self.client.auth_url.clone(), self.client.base_url.clone())
        .with_retry(self.client.max_attempts, self.client.retry_delay)
    }

    /// Runtime worker pool configuration
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_parallel(self.download.parallel)
            .with_retries(self.download.retries, self.download.retry_delay)
    }

    /// Runtime fetcher options
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            out_dir: self.download.out_dir.clone(),
            force: self.download.force,
            redownload: self.download.redownload,
            use_url_name: self.download.urlname,
            progress: self.download.progress,
        }
    }
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}
