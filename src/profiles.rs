//! Profile store.
//!
//! Each profile is a directory under the store root holding `config`,
//! optional key files and an optional `known_hosts`. The store root also holds
//! the `current_profile` pointer (see [`crate::state`]).

use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::paths::Paths;
use crate::permissions::{PRIVATE_DIR_MODE, ensure_mode};
use crate::state;

/// List available profiles, sorted lexicographically
pub fn list_profiles(paths: &Paths) -> Result<Vec<String>> {
    let entries = match fs::read_dir(&paths.base_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::io(
                format!("Failed to read {}", paths.base_dir.display()),
                e,
            ));
        }
    };

    let mut profiles = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("Failed to read directory entry", e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        // Directories that could not have been created as profiles are not listed.
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && validate_profile_name(name).is_ok()
        {
            profiles.push(name.to_string());
        }
    }
    profiles.sort();
    Ok(profiles)
}

/// Check if a profile exists
///
/// Names outside the profile pattern never exist, so `..` or `a/b` cannot
/// reach outside the store.
pub fn profile_exists(paths: &Paths, name: &str) -> bool {
    validate_profile_name(name).is_ok() && paths.profile_dir(name).is_dir()
}

/// Validate profile name
///
/// Only `[A-Za-z0-9_-]+` is accepted, and the name may neither start with a
/// hyphen (it would read as a flag) nor be purely numeric (the interactive
/// menu selects profiles by number).
pub fn validate_profile_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name cannot be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return invalid("only letters, digits, '-' and '_' are allowed");
    }
    if name.starts_with('-') {
        return invalid("name cannot start with '-'");
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return invalid("name cannot be purely numeric");
    }

    Ok(())
}

/// Create an empty profile directory (mode 0700)
pub fn create_profile(paths: &Paths, name: &str) -> Result<PathBuf> {
    validate_profile_name(name)?;

    let profile_dir = paths.profile_dir(name);
    if profile_dir.symlink_metadata().is_ok() {
        return Err(Error::AlreadyExists(name.to_string()));
    }

    ensure_base_dir(paths)?;

    match DirBuilder::new().mode(PRIVATE_DIR_MODE).create(&profile_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        Err(e) => {
            return Err(Error::io(
                format!("Failed to create profile directory: {}", profile_dir.display()),
                e,
            ));
        }
    }
    // The umask may have stripped bits from the requested mode.
    ensure_mode(&profile_dir, PRIVATE_DIR_MODE)?;

    tracing::debug!(profile = name, "profile created");
    Ok(profile_dir)
}

/// Create the store root with owner-only permissions if it is missing.
pub fn ensure_base_dir(paths: &Paths) -> Result<()> {
    if paths.base_dir.is_dir() {
        return Ok(());
    }
    DirBuilder::new()
        .recursive(true)
        .mode(PRIVATE_DIR_MODE)
        .create(&paths.base_dir)
        .map_err(|e| {
            Error::io(
                format!("Failed to create profiles directory: {}", paths.base_dir.display()),
                e,
            )
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// The pointer named this profile and has been cleared.
    pub was_active: bool,
}

/// Remove a profile
///
/// Clears the pointer when it names this profile. The global SSH config that
/// may have been applied from it is left in place.
pub fn remove_profile(paths: &Paths, name: &str) -> Result<RemoveOutcome> {
    validate_profile_name(name)?;
    let profile_dir = paths.profile_dir(name);

    if !profile_dir.is_dir() {
        return Err(Error::NotFound(name.to_string()));
    }

    fs::remove_dir_all(&profile_dir).map_err(|e| {
        Error::io(
            format!("Failed to remove profile directory: {}", profile_dir.display()),
            e,
        )
    })?;

    let current = state::read_current(paths).ok().flatten();
    let was_active = current.as_deref() == Some(name);
    if was_active {
        state::clear_current(paths)?;
    }

    tracing::debug!(profile = name, was_active, "profile removed");
    Ok(RemoveOutcome { was_active })
}
