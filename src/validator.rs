//! SSH config validation through `ssh -G`.

use std::path::Path;

use crate::error::{Error, Result};
use crate::tools::SshTools;

/// Maximum number of diagnostic lines surfaced for an invalid config.
pub const MAX_DIAGNOSTICS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    /// No config file yet. Not an error; callers warn.
    Missing,
}

/// Check `path` with the SSH client's non-connecting resolution mode.
pub fn validate_config(tools: &dyn SshTools, path: &Path) -> Result<Validation> {
    if !path.exists() {
        return Ok(Validation::Missing);
    }

    let output = tools.resolve_config(path)?;
    if output.success() {
        return Ok(Validation::Valid);
    }

    let mut diagnostics = extract_diagnostics(&output.combined());
    if diagnostics.is_empty() {
        diagnostics.push(match output.status {
            Some(code) => format!("ssh exited with status {}", code),
            None => "ssh was terminated by a signal".to_string(),
        });
    }
    tracing::debug!(path = %path.display(), lines = diagnostics.len(), "config rejected");

    Err(Error::InvalidConfig {
        path: path.to_path_buf(),
        diagnostics,
    })
}

/// First [`MAX_DIAGNOSTICS`] lines mentioning "error" in any case.
pub fn extract_diagnostics(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.to_lowercase().contains("error"))
        .map(|line| line.trim_end().to_string())
        .take(MAX_DIAGNOSTICS)
        .collect()
}
