//! Safe local file name resolution
//!
//! The server (or the URL) decides the file name, so it is untrusted input.
//! A name carrying a parent-directory component is refused outright. Any other
//! directory prefix is dropped, keeping only the final component, and the
//! joined path must be a direct child of the output directory.

use std::path::{Component, Path, PathBuf};

use crate::errors::{DownloadError, DownloadResult};

/// Reduces `remote_name` to a bare file name and joins it onto `out_dir`
///
/// # Errors
///
/// Returns `DownloadError::UnsafePath` when the name contains a `..`
/// component, nothing usable remains after stripping directories, or the
/// result would land outside `out_dir`
pub fn resolve_destination(out_dir: &Path, remote_name: &str) -> DownloadResult<PathBuf> {
    if remote_name.split(['/', '\\']).any(|part| part.trim() == "..") {
        return Err(DownloadError::UnsafePath {
            name: remote_name.to_string(),
            reason: "parent directory component".to_string(),
        });
    }

    let file_name = base_name(remote_name);

    if file_name.is_empty() || file_name == "." || file_name == ".." {
        return Err(DownloadError::UnsafePath {
            name: remote_name.to_string(),
            reason: "no usable file name".to_string(),
        });
    }

    let abs_dir = absolute(out_dir)?;
    let candidate = abs_dir.join(file_name);

    let is_direct_child = candidate.parent() == Some(abs_dir.as_path())
        && matches!(
            candidate.components().next_back(),
            Some(Component::Normal(_))
        );
    if !is_direct_child {
        return Err(DownloadError::UnsafePath {
            name: remote_name.to_string(),
            reason: format!("resolves outside {}", abs_dir.display()),
        });
    }

    Ok(out_dir.join(file_name))
}

/// Last component of a name, treating both `/` and `\` as separators
fn base_name(name: &str) -> &str {
    name.trim()
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}

/// Absolute form of `dir` without touching the filesystem
fn absolute(dir: &Path) -> DownloadResult<PathBuf> {
    let joined = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    // Lexically drop "." and resolve ".." so the parent comparison is exact
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
