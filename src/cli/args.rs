//! Command-line argument parsing for CZDS Fetcher
//!
//! This module defines the CLI structure using clap derive macros: global
//! authentication and logging options plus the `download`, `request` and
//! `status` subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::constants::env;

/// CZDS Fetcher - Download zone files from ICANN's Centralized Zone Data Service
#[derive(Parser, Debug)]
#[command(
    name = "czds_fetcher",
    version,
    about = "Download zone files from ICANN's Centralized Zone Data Service",
    long_about = "A client for the ICANN CZDS API.
Downloads approved zone files concurrently with retries and skip-if-current checks,
manages zone access requests and reports on their status."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - only errors and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Username to authenticate with
    #[arg(long, global = true, env = env::USERNAME)]
    pub username: Option<String>,

    /// Password to authenticate with
    #[arg(long, global = true, env = env::PASSWORD, hide_env_values = true)]
    pub password: Option<String>,

    /// Password source: tty[:prompt], env:VAR, file:PATH, cmd:COMMAND, keychain:NAME, lpass:NAME, op:NAME or pass:PASSWORD
    #[arg(long, global = true, value_name = "SOURCE")]
    pub passin: Option<String>,

    /// Use the CZDS test environment
    #[arg(long, global = true)]
    pub test_env: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download zone files
    #[command(visible_alias = "dl")]
    Download(DownloadArgs),

    /// Request access to zones, extensions and cancellations
    #[command(visible_alias = "req")]
    Request(RequestArgs),

    /// Show the status of zone requests or save the CSV report
    #[command(visible_alias = "st")]
    Status(StatusArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Zones to download, defaults to every approved zone
    #[arg(value_name = "ZONE")]
    pub zones: Vec<String>,

    /// Comma separated list of zones to download
    #[arg(long = "zones", value_name = "ZONES", value_delimiter = ',')]
    pub zone_list: Vec<String>,

    /// Comma separated list of zones not to download
    #[arg(long, value_name = "ZONES", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Directory to save zone files to
    #[arg(short, long = "out", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Number of zones to download in parallel
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Maximum attempts per zone file
    #[arg(long)]
    pub retries: Option<u32>,

    /// Download even when the zone already exists locally
    #[arg(short, long)]
    pub force: bool,

    /// Re-download zones that are newer or a different size on the server
    #[arg(long)]
    pub redownload: bool,

    /// Name files after the download URL instead of the Content-Disposition header
    #[arg(long)]
    pub urlname: bool,

    /// Log progress for large files
    #[arg(long)]
    pub progress: bool,
}

/// Arguments for the request command
#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Reason for requesting zone access
    #[arg(long)]
    pub reason: Option<String>,

    /// Print the CZDS terms and conditions
    #[arg(long)]
    pub terms: bool,

    /// Print the request status of every TLD
    #[arg(long)]
    pub status: bool,

    /// Comma separated list of zones to request
    #[arg(long, value_name = "ZONES", value_delimiter = ',')]
    pub request: Vec<String>,

    /// Request every zone that can be requested
    #[arg(long)]
    pub request_all: bool,

    /// Comma separated list of zones to extend
    #[arg(long, value_name = "ZONES", value_delimiter = ',')]
    pub extend: Vec<String>,

    /// Extend every request the server marks extensible
    #[arg(long)]
    pub extend_all: bool,

    /// Comma separated list of zones left out of --request-all and --extend-all
    #[arg(long, value_name = "ZONES", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Comma separated list of zones whose requests are cancelled
    #[arg(long, value_name = "ZONES", value_delimiter = ',')]
    pub cancel: Vec<String>,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Request ID to show, defaults to listing every request
    #[arg(long)]
    pub id: Option<String>,

    /// Show the latest request for this zone
    #[arg(long)]
    pub zone: Option<String>,

    /// Save the CSV report of all requests, '-' for stdout
    #[arg(long, value_name = "FILE")]
    pub report: Option<String>,

    /// Show progress while saving the report
    #[arg(long)]
    pub progress: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl DownloadArgs {
    /// Positional zones followed by `--zones`, blanks removed
    pub fn requested_zones(&self) -> Vec<String> {
        self.zones
            .iter()
            .chain(self.zone_list.iter())
            .map(|z| z.trim().to_string())
            .filter(|z| !z.is_empty())
            .collect()
    }

    /// Overrides the `[download]` section with the flags given
    pub fn apply_to(&self, config: &mut AppConfig) {
        let download = &mut config.download;
        if let Some(out_dir) = &self.out_dir {
            download.out_dir = out_dir.clone();
        }
        if let Some(parallel) = self.parallel {
            download.parallel = parallel;
        }
        if let Some(retries) = self.retries {
            download.retries = retries;
        }
        download.force |= self.force;
        download.redownload |= self.redownload;
        download.urlname |= self.urlname;
        download.progress |= self.progress;
    }
}

impl RequestArgs {
    /// Check that at least one action was asked for
    pub fn validate(&self) -> Result<(), String> {
        let any_action = self.terms
            || self.status
            || self.request_all
            || !self.request.is_empty()
            || self.extend_all
            || !self.extend.is_empty()
            || !self.cancel.is_empty();

        if !any_action {
            return Err("Nothing to do. Specify one of --terms, --status, --request/--request-all, --extend/--extend-all or --cancel".to_string());
        }

        let requesting = self.request_all || !self.request.is_empty();
        if requesting && self.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
            return Err("A --reason is required to request zones".to_string());
        }

        Ok(())
    }
}

impl StatusArgs {
    /// Check that the report is not combined with a single request
    pub fn validate(&self) -> Result<(), String> {
        if self.report.is_some() && (self.id.is_some() || self.zone.is_some()) {
            return Err("Cannot use --report with --id or --zone".to_string());
        }
        Ok(())
    }
}
