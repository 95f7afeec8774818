//! Profile constructors.
//!
//! The interactive and argument-driven `add` flows both end up in
//! [`build_profile`]; `backup` snapshots the live SSH files through
//! [`backup_current`]. Every file written here is hardened before returning.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::keys::{self, KeyOutcome, KeySpec};
use crate::paths::Paths;
use crate::permissions::{PermissionError, harden};
use crate::profiles::create_profile;
use crate::ssh_config::ProfileConfig;
use crate::tools::SshTools;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    None,
    /// Copy an existing private key (and `.pub`) into the profile.
    Import(PathBuf),
    Generate(KeySpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub user: Option<String>,
    pub key: KeySource,
}

#[derive(Debug)]
pub struct BuildReport {
    pub dir: PathBuf,
    pub config: PathBuf,
    pub identity_file: Option<PathBuf>,
    /// The key was already present and generation was skipped.
    pub key_reused: bool,
    /// Permission repairs that did not go through.
    pub warnings: Vec<PermissionError>,
}

/// Create `name` with config, optional key and an empty known_hosts.
///
/// If anything fails after the directory exists it is removed again so the
/// name can be retried.
pub fn build_profile(
    paths: &Paths,
    tools: &dyn SshTools,
    name: &str,
    profile: &NewProfile,
) -> Result<BuildReport> {
    let dir = create_profile(paths, name)?;

    match populate(paths, tools, name, &dir, profile) {
        Ok(report) => Ok(report),
        Err(e) => {
            discard_partial(&dir);
            Err(e)
        }
    }
}

fn populate(
    paths: &Paths,
    tools: &dyn SshTools,
    name: &str,
    dir: &Path,
    profile: &NewProfile,
) -> Result<BuildReport> {
    let mut warnings = Vec::new();
    let mut key_reused = false;

    let identity_file = match &profile.key {
        KeySource::None => None,
        KeySource::Import(source) => {
            let imported = keys::import_key(dir, source)?;
            warnings.extend(imported.warnings);
            Some(imported.path)
        }
        KeySource::Generate(spec) => {
            let file_name = spec.key_type.default_file_name();
            match keys::generate_key(tools, dir, &file_name, spec)? {
                KeyOutcome::AlreadyExists(path) => {
                    key_reused = true;
                    Some(path)
                }
                KeyOutcome::Generated { path, warnings: w } => {
                    warnings.extend(w);
                    Some(path)
                }
            }
        }
    };

    let known_hosts = paths.profile_known_hosts(name);
    write_file(&known_hosts, "", &mut warnings)?;

    let config = paths.profile_config(name);
    let body = ProfileConfig {
        user: profile.user.clone(),
        identity_file: identity_file.clone(),
        known_hosts,
    }
    .render();
    write_file(&config, &body, &mut warnings)?;

    Ok(BuildReport {
        dir: dir.to_path_buf(),
        config,
        identity_file,
        key_reused,
        warnings,
    })
}

#[derive(Debug)]
pub struct BackupReport {
    pub dir: PathBuf,
    /// The global config existed and was copied (otherwise an empty file was written).
    pub copied_config: bool,
    pub copied_known_hosts: bool,
    pub warnings: Vec<PermissionError>,
}

/// Snapshot the live `~/.ssh/config` and `~/.ssh/known_hosts` into a new profile.
pub fn backup_current(paths: &Paths, name: &str) -> Result<BackupReport> {
    let dir = create_profile(paths, name)?;

    let result = snapshot_globals(paths, name, &dir);
    if result.is_err() {
        discard_partial(&dir);
    }
    result
}

fn snapshot_globals(paths: &Paths, name: &str, dir: &Path) -> Result<BackupReport> {
    let mut warnings = Vec::new();
    let copied_config = snapshot(&paths.ssh_config, &paths.profile_config(name), &mut warnings)?;
    let copied_known_hosts = snapshot(
        &paths.known_hosts,
        &paths.profile_known_hosts(name),
        &mut warnings,
    )?;
    Ok(BackupReport {
        dir: dir.to_path_buf(),
        copied_config,
        copied_known_hosts,
        warnings,
    })
}

fn snapshot(source: &Path, target: &Path, warnings: &mut Vec<PermissionError>) -> Result<bool> {
    let copied = if source.is_file() {
        fs::copy(source, target).map_err(|e| {
            Error::io(
                format!("Failed to copy {} to {}", source.display(), target.display()),
                e,
            )
        })?;
        true
    } else {
        fs::write(target, "")
            .map_err(|e| Error::io(format!("Failed to create {}", target.display()), e))?;
        false
    };
    if let Err(e) = harden(target) {
        warnings.push(e);
    }
    Ok(copied)
}

/// Remove a half-built profile so the name can be reused. Returns whether it is gone.
fn discard_partial(dir: &Path) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "could not remove partial profile");
            false
        }
    }
}

fn write_file(path: &Path, content: &str, warnings: &mut Vec<PermissionError>) -> Result<()> {
    fs::write(path, content)
        .map_err(|e| Error::io(format!("Failed to write {}", path.display()), e))?;
    if let Err(e) = harden(path) {
        warnings.push(e);
    }
    Ok(())
}
