//! Command-line interface components
//!
//! This module contains CLI-specific code for the CZDS Fetcher application:
//! argument parsing, the command handlers and the progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, DownloadArgs, GlobalArgs, RequestArgs, StatusArgs};
pub use commands::{handle_download, handle_request, handle_status};
pub use progress::{ProgressCounts, ProgressDisplay};
