//! File mode hardening.
//!
//! SSH refuses private keys (and, for some fields, configs) that are readable
//! by anyone but the owner. Everything sshprof writes goes through
//! [`harden`] before the command returns.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Owner read/write only.
pub const PRIVATE_FILE_MODE: u32 = 0o600;
/// Owner-only directory.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("Cannot read permissions of {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to chmod {} to {mode:o}: {source}", .path.display())]
    ChmodFailed {
        path: PathBuf,
        mode: u32,
        #[source]
        source: std::io::Error,
    },
}

/// What [`ensure_mode`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Mode already matched; no chmod was issued.
    Unchanged,
    /// Mode was changed from `from`.
    Repaired { from: u32 },
}

/// Force the permission bits of `path` to `mode`.
pub fn ensure_mode(path: &Path, mode: u32) -> Result<PermissionOutcome, PermissionError> {
    let metadata = fs::metadata(path).map_err(|source| PermissionError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let current = metadata.permissions().mode() & 0o7777;
    if current == mode {
        return Ok(PermissionOutcome::Unchanged);
    }

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        PermissionError::ChmodFailed {
            path: path.to_path_buf(),
            mode,
            source,
        }
    })?;

    tracing::debug!(path = %path.display(), from = format!("{current:o}"), to = format!("{mode:o}"), "repaired permissions");
    Ok(PermissionOutcome::Repaired { from: current })
}

/// [`ensure_mode`] with 0600.
pub fn harden(path: &Path) -> Result<PermissionOutcome, PermissionError> {
    ensure_mode(path, PRIVATE_FILE_MODE)
}

/// Read the permission bits, if the file exists.
pub fn mode_of(path: &Path) -> Option<u32> {
    fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}
