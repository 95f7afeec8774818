use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Overrides the profile store root (default `~/.ssh-profiles`).
pub const HOME_ENV: &str = "SSHPROF_HOME";
/// Overrides the global SSH directory (default `~/.ssh`).
pub const SSH_DIR_ENV: &str = "SSHPROF_SSH_DIR";

/// Name of the active profile pointer inside the store root.
pub const POINTER_FILE: &str = "current_profile";
const LOCK_FILE: &str = ".switch.lock";

/// All computed paths used by sshprof
#[derive(Debug, Clone)]
pub struct Paths {
    /// User home, used for `~` expansion
    pub home: PathBuf,
    /// ~/.ssh-profiles
    pub base_dir: PathBuf,
    /// ~/.ssh-profiles/current_profile
    pub pointer_file: PathBuf,
    /// ~/.ssh-profiles/.switch.lock
    pub lock_file: PathBuf,
    /// ~/.ssh
    pub ssh_dir: PathBuf,
    /// ~/.ssh/config
    pub ssh_config: PathBuf,
    /// ~/.ssh/known_hosts
    pub known_hosts: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let home = base_dirs.home_dir().to_path_buf();

        let base_dir = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".ssh-profiles"));
        let ssh_dir = std::env::var_os(SSH_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".ssh"));

        Ok(Self::from_roots(home, base_dir, ssh_dir))
    }

    /// Build every derived path from the three roots.
    pub fn from_roots(home: PathBuf, base_dir: PathBuf, ssh_dir: PathBuf) -> Self {
        Self {
            pointer_file: base_dir.join(POINTER_FILE),
            lock_file: base_dir.join(LOCK_FILE),
            ssh_config: ssh_dir.join("config"),
            known_hosts: ssh_dir.join("known_hosts"),
            home,
            base_dir,
            ssh_dir,
        }
    }

    /// Get the path to a specific profile directory
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Get the path to a specific profile's SSH config
    pub fn profile_config(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("config")
    }

    /// Get the path to a specific profile's known_hosts
    pub fn profile_known_hosts(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("known_hosts")
    }

    /// Expand a leading `~` or `~/` to the home directory.
    pub fn expand_tilde(&self, raw: &str) -> PathBuf {
        expand_tilde(raw, &self.home)
    }
}

pub fn expand_tilde(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}
