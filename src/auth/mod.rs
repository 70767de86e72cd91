//! Credential acquisition for CZDS
//!
//! The CZDS client only ever sees a finished [`Credentials`] value. This
//! module turns the global CLI options into one, reading the password from a
//! `--passin` source or the terminal when it was not given directly.
//!
//! # Examples
//!
//! ```rust,no_run
//! use czds_fetcher::auth::{resolve_credentials, PasswordSource};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source: PasswordSource = "env:CZDS_PASSWORD".parse()?;
//! let password = source.read()?;
//!
//! let credentials = resolve_credentials(Some("me@example.com"), Some(&password), None)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Credentials`]: crate::app::client::Credentials

pub mod credentials;

// Re-export main public API
pub use credentials::{resolve_credentials, PasswordSource};
