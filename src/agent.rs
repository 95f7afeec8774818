//! Loading a profile's key into the running ssh-agent.
//!
//! Best-effort only: every failure here surfaces as a warning to the caller.

use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tools::SshTools;

/// `ssh-add -l` exit status when no agent could be contacted.
const SSH_ADD_NO_AGENT: i32 = 2;
/// `ssh-add -l` exit status when the agent holds no identities.
const SSH_ADD_NO_IDENTITIES: i32 = 1;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Key file is not readable: {}", .0.display())]
    KeyUnreadable(PathBuf),

    #[error("No ssh-agent is running")]
    NotRunning,

    #[error("Could not fingerprint {}: {reason}", .path.display())]
    Fingerprint { path: PathBuf, reason: String },

    #[error("ssh-add could not list agent keys: {0}")]
    ListFailed(String),

    #[error("ssh-add failed for {}: {reason}", .path.display())]
    AddFailed { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    AlreadyLoaded { fingerprint: String },
    Loaded { fingerprint: String },
}

/// Extract the fingerprint from `ssh-keygen -l` output
/// (`256 SHA256:abc... comment (ED25519)`).
pub fn parse_fingerprint(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.split_whitespace().nth(1))
        .filter(|fp| fp.contains(':'))
        .map(str::to_string)
}

/// Fingerprint of `key` as the agent would report it.
pub fn fingerprint_of(tools: &dyn SshTools, key: &Path) -> Result<String, AgentError> {
    let fail = |reason: String| AgentError::Fingerprint {
        path: key.to_path_buf(),
        reason,
    };

    let output = tools.fingerprint(key).map_err(|e| fail(e.to_string()))?;
    if !output.success() {
        return Err(fail(output.first_message()));
    }
    parse_fingerprint(&output.stdout).ok_or_else(|| fail("unrecognised ssh-keygen output".into()))
}

/// Add `key` to the agent unless a key with the same fingerprint is loaded.
pub fn ensure_loaded(tools: &dyn SshTools, key: &Path) -> Result<AgentOutcome, AgentError> {
    if File::open(key).is_err() {
        return Err(AgentError::KeyUnreadable(key.to_path_buf()));
    }
    if !tools.agent_available() {
        return Err(AgentError::NotRunning);
    }

    let fingerprint = fingerprint_of(tools, key)?;

    let listing = tools
        .agent_list()
        .map_err(|e| AgentError::ListFailed(e.to_string()))?;
    match listing.status {
        Some(0) => {}
        Some(SSH_ADD_NO_IDENTITIES) => {}
        Some(SSH_ADD_NO_AGENT) => return Err(AgentError::NotRunning),
        _ => return Err(AgentError::ListFailed(listing.first_message())),
    }

    if listing.stdout.lines().any(|line| line.contains(&fingerprint)) {
        tracing::debug!(key = %key.display(), "key already in agent");
        return Ok(AgentOutcome::AlreadyLoaded { fingerprint });
    }

    let added = tools
        .agent_add(key)
        .map_err(|e| AgentError::AddFailed {
            path: key.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !added.success() {
        return Err(AgentError::AddFailed {
            path: key.to_path_buf(),
            reason: added.first_message(),
        });
    }

    tracing::debug!(key = %key.display(), "key added to agent");
    Ok(AgentOutcome::Loaded { fingerprint })
}
