//! Credential acquisition for CZDS authentication
//!
//! The username comes from `--username` or `CZDS_USERNAME`. The password is
//! taken, in order of preference, from a `--passin` source, from `--password`
//! or `CZDS_PASSWORD`, or from an interactive prompt.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;

use tracing::debug;

use crate::app::client::Credentials;
use crate::errors::{AuthError, AuthResult};

const DEFAULT_PROMPT: &str = "Password: ";

/// Where a password is read from, as given to `--passin`
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordSource {
    /// `tty` or `tty:prompt`
    Tty { prompt: String },
    /// `env:VAR`
    Env(String),
    /// `file:PATH`, first line
    File(PathBuf),
    /// `cmd:COMMAND`, run through `/bin/sh -c`
    Command(String),
    /// `keychain:NAME` via macOS `security`
    Keychain(String),
    /// `lpass:NAME` via the LastPass CLI
    LastPass(String),
    /// `op:NAME` via the 1Password CLI
    OnePassword(String),
    /// `pass:PASSWORD`
    Literal(String),
}

impl fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl FromStr for PasswordSource {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "tty" {
            return Ok(PasswordSource::Tty {
                prompt: DEFAULT_PROMPT.to_string(),
            });
        }

        let invalid = || AuthError::PasswordSource {
            source_name: s.split(':').next().unwrap_or(s).to_string(),
            reason: "invalid password source, expected one of tty, env:VAR, file:PATH, cmd:COMMAND, keychain:NAME, lpass:NAME, op:NAME, pass:PASSWORD".to_string(),
        };

        let (kind, value) = s.split_once(':').ok_or_else(invalid)?;
        let value = value.to_string();
        let source = match kind {
            "tty" => PasswordSource::Tty { prompt: value },
            "env" => PasswordSource::Env(value),
            "file" => PasswordSource::File(expand_home(&value)),
            "cmd" => PasswordSource::Command(value),
            "keychain" => PasswordSource::Keychain(value),
            "lpass" | "lastpass" => PasswordSource::LastPass(value),
            "op" | "onepass" => PasswordSource::OnePassword(value),
            "pass" => PasswordSource::Literal(value),
            _ => return Err(invalid()),
        };
        Ok(source)
    }
}

impl PasswordSource {
    /// Short description safe to log (never includes a literal password)
    pub fn describe(&self) -> String {
        match self {
            PasswordSource::Tty { .. } => "tty".to_string(),
            PasswordSource::Env(var) => format!("env:{}", var),
            PasswordSource::File(path) => format!("file:{}", path.display()),
            PasswordSource::Command(_) => "cmd".to_string(),
            PasswordSource::Keychain(name) => format!("keychain:{}", name),
            PasswordSource::LastPass(name) => format!("lpass:{}", name),
            PasswordSource::OnePassword(name) => format!("op:{}", name),
            PasswordSource::Literal(_) => "pass".to_string(),
        }
    }

    /// Reads the password
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordSource` if the source is unset, unreadable
    /// or yields an empty password
    pub fn read(&self) -> AuthResult<String> {
        debug!("Reading password from {}", self.describe());
        let password = match self {
            PasswordSource::Tty { prompt } => {
                rpassword::prompt_password(prompt.as_str()).map_err(|e| self.error(e))?
            }
            PasswordSource::Env(var) => std::env::var(var)
                .map_err(|_| self.error(format!("environment variable '{}' not set", var)))?,
            PasswordSource::File(path) => {
                let file = File::open(path)
                    .map_err(|e| self.error(format!("unable to open: {}", e)))?;
                let mut line = String::new();
                BufReader::new(file)
                    .read_line(&mut line)
                    .map_err(|e| self.error(e))?;
                line.trim_end_matches(['\r', '\n']).to_string()
            }
            PasswordSource::Command(command) => self.run(Command::new("/bin/sh").args(["-c", command.as_str()]))?,
            PasswordSource::Keychain(name) => self.run(
                Command::new("security").args(["find-generic-password", "-s", name.as_str(), "-w"]),
            )?,
            PasswordSource::LastPass(name) => {
                self.run(Command::new("lpass").args(["show", name.as_str(), "--password"]))?
            }
            PasswordSource::OnePassword(name) => self.run(
                Command::new("op").args(["item", "get", name.as_str(), "--fields", "password"]),
            )?,
            PasswordSource::Literal(password) => password.clone(),
        };

        if password.is_empty() {
            return Err(self.error("password is empty"));
        }
        Ok(password)
    }

    /// Runs a helper program and returns its trimmed stdout
    fn run(&self, command: &mut Command) -> AuthResult<String> {
        let output = command
            .stdin(Stdio::inherit())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .output()
            .map_err(|e| self.error(format!("unable to run: {}", e)))?;

        if !output.status.success() {
            return Err(self.error(format!(
                "command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn error(&self, reason: impl fmt::Display) -> AuthError {
        AuthError::PasswordSource {
            source_name: self.describe(),
            reason: reason.to_string(),
        }
    }
}

/// Replaces a leading `~/` with the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Builds credentials from the global options
///
/// # Arguments
///
/// * `username` - `--username` or `CZDS_USERNAME`
/// * `password` - `--password` or `CZDS_PASSWORD`
/// * `passin` - `--passin` source, preferred over `password`
///
/// # Errors
///
/// Returns `AuthError::MissingCredentials` without a username, or the
/// password source's error
pub fn resolve_credentials(
    username: Option<&str>,
    password: Option<&str>,
    passin: Option<&str>,
) -> AuthResult<Credentials> {
    let username = username
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(AuthError::MissingCredentials)?;

    let password = match (passin.filter(|p| !p.is_empty()), password) {
        (Some(source), _) => source.parse::<PasswordSource>()?.read()?,
        (None, Some(password)) if !password.is_empty() => password.to_string(),
        (None, _) => {
            if !atty::is(atty::Stream::Stdin) {
                return Err(AuthError::MissingCredentials);
            }
            PasswordSource::Tty {
                prompt: format!("CZDS password for {}: ", username),
            }
            .read()?
        }
    };

    Ok(Credentials::new(username, password))
}
