//! Application constants for CZDS Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for authentication
pub mod env {
    /// Environment variable name for the CZDS username
    pub const USERNAME: &str = "CZDS_USERNAME";

    /// Environment variable name for the CZDS password
    pub const PASSWORD: &str = "CZDS_PASSWORD";
}

/// CZDS service URLs and endpoint paths
pub mod czds {
    /// Production authentication endpoint
    pub const AUTH_URL: &str = "https://account-api.icann.org/api/authenticate";

    /// Production API base URL
    pub const BASE_URL: &str = "https://czds-api.icann.org";

    /// Test environment authentication endpoint
    pub const TEST_AUTH_URL: &str = "https://account-api-test.icann.org/api/authenticate";

    /// Test environment API base URL
    pub const TEST_BASE_URL: &str = "https://czds-api-test.icann.org";

    /// Zone download links
    pub const LINKS_PATH: &str = "/czds/downloads/links";

    /// Paginated request search
    pub const REQUESTS_PATH: &str = "/czds/requests/all";

    /// Single request detail (request ID appended)
    pub const REQUEST_INFO_PATH: &str = "/czds/requests/";

    /// TLD availability
    pub const TLDS_PATH: &str = "/czds/tlds";

    /// Current terms and conditions
    pub const TERMS_PATH: &str = "/czds/terms/condition";

    /// New request submission
    pub const CREATE_REQUEST_PATH: &str = "/czds/requests/create";

    /// Request cancellation
    pub const CANCEL_REQUEST_PATH: &str = "/czds/requests/cancel";

    /// Request extension (request ID appended)
    pub const EXTEND_REQUEST_PATH: &str = "/czds/requests/extension/";

    /// CSV report of all requests
    pub const REPORT_PATH: &str = "/czds/requests/report";

    /// File suffix the links endpoint uses for zone files
    pub const ZONE_FILE_SUFFIX: &str = ".zone";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("czds_fetcher/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout (covers the whole body of a zone transfer)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 25;
}

/// Request executor retry configuration
pub mod limits {
    use super::Duration;

    /// Attempts per logical request before a transport error is surfaced
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Fixed delay between transport-level retries
    pub const RETRY_DELAY: Duration = Duration::from_secs(10);

    /// A token is renewed when it expires within this margin
    pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(30);
}

/// Paginated listing constants
pub mod listing {
    /// Items requested per page
    pub const PAGE_SIZE: u32 = 100;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Write buffer used while streaming a zone to disk (64KB)
    pub const WRITE_BUFFER_SIZE: usize = 64 * 1024;

    /// Default output directory for downloaded zones
    pub const DEFAULT_OUT_DIR: &str = "zones";
}

/// Worker and concurrency configuration
pub mod workers {
    use super::Duration;

    /// Default number of parallel downloads
    pub const DEFAULT_PARALLEL: usize = 5;

    /// Upper bound on parallel downloads
    pub const MAX_PARALLEL: usize = 100;

    /// Queue slots per worker
    pub const QUEUE_SLOTS_PER_WORKER: usize = 2;

    /// Maximum attempts per zone file
    pub const DEFAULT_RETRIES: u32 = 3;

    /// Delay between attempts of the same zone file
    pub const RETRY_DELAY: Duration = Duration::from_secs(15);
}

/// Per-download progress reporting
pub mod progress {
    /// Files smaller than this never report progress (50MB)
    pub const MIN_REPORT_SIZE: u64 = 50 * 1024 * 1024;

    /// Percentage step between reports when the size is known
    pub const PERCENT_STEP: u64 = 10;

    /// Byte step between reports when the size is unknown (25MB)
    pub const UNKNOWN_SIZE_STEP: u64 = 25 * 1024 * 1024;
}

/// Configuration file location
pub mod config {
    /// Directory under the platform config dir
    pub const APP_DIR: &str = "czds_fetcher";

    /// Configuration file name
    pub const FILE_NAME: &str = "config.toml";
}

// Re-export commonly used constants for convenience
pub use env::{PASSWORD as ENV_PASSWORD, USERNAME as ENV_USERNAME};
pub use files::TEMP_FILE_SUFFIX;
pub use http::USER_AGENT;
pub use workers::DEFAULT_PARALLEL;
