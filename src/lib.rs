//! CZDS Fetcher Library
//!
//! A Rust client for ICANN's Centralized Zone Data Service. Authenticates
//! with single-flight token renewal, manages zone access requests and
//! downloads zone files concurrently with bounded retries, atomic writes and
//! skip-if-current checks.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
