//! Error types for sshprof.
//!
//! Library modules return these typed errors; the command layer wraps them in
//! `anyhow` with extra context and `main` recovers the exit code through
//! [`exit_code_for`].

use std::path::PathBuf;
use thiserror::Error;

use crate::exit_codes;
use crate::permissions::PermissionError;
use crate::switch::SwitchError;

/// Main error type for profile store, validation and key operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Profile name does not match `[A-Za-z0-9_-]+` or breaks one of the extra rules.
    #[error("Invalid profile name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Profile '{0}' already exists")]
    AlreadyExists(String),

    #[error("Profile '{0}' does not exist")]
    NotFound(String),

    #[error("Key file not found: {}", .0.display())]
    KeyNotFound(PathBuf),

    /// `ssh -G` refused the config. `diagnostics` holds at most five lines.
    #[error("Invalid SSH config {}{}", .path.display(), format_diagnostics(.diagnostics))]
    InvalidConfig {
        path: PathBuf,
        diagnostics: Vec<String>,
    },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Failed to run {program}: {source}")]
    Tool {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Helper for wrapping an io error with a human-readable context line.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

fn format_diagnostics(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::from(":");
    for line in lines {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Walk an `anyhow` chain for a [`SwitchError`] and use its exit code.
///
/// Only a failed write to the global SSH files is fatal; every [`Error`] and
/// every untyped failure is a user error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SwitchError>())
        .map_or(exit_codes::USER_ERROR, SwitchError::exit_code)
}

/// One-line message for an error chain.
///
/// Typed errors already embed their source, so a cause is only appended when
/// its text is not part of the message so far.
pub fn render(err: &anyhow::Error) -> String {
    let mut out = err.to_string();
    for cause in err.chain().skip(1) {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
    }
    out
}
