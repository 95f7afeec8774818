//! Profile switching logic.
//!
//! A switch is an explicit, strictly sequential state machine:
//!
//! | stage             | on failure                                                              |
//! |-------------------|-------------------------------------------------------------------------|
//! | `Resolve`         | abort, [`SwitchError::InvalidName`] or [`SwitchError::ProfileNotFound`] |
//! | `Harden`          | warning                                                                 |
//! | `Validate`        | abort, [`SwitchError::InvalidConfig`]                                   |
//! | `Preserve`        | warning                                                                 |
//! | `Apply`           | abort, [`SwitchError::ApplyFailed`] (fatal)                             |
//! | `ApplyKnownHosts` | warning                                                                 |
//! | `Commit`          | abort, [`SwitchError::CommitFailed`] (fatal)                            |
//! | `LoadKey`         | warning                                                                 |
//!
//! Nothing outside the target profile is touched before `Preserve`, so the
//! first three aborts leave the global SSH files and the pointer exactly as
//! they were. After `Apply` fails the pointer still names the previous
//! profile even though the global config may be half written; that window is
//! reported, not repaired.

use std::fmt;
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::agent::{self, AgentOutcome};
use crate::error::Error;
use crate::exit_codes;
use crate::paths::Paths;
use crate::permissions::{PRIVATE_DIR_MODE, harden};
use crate::profiles::{profile_exists, validate_profile_name};
use crate::ssh_config::parse_identity_file;
use crate::state::{self, LOCK_TIMEOUT, SwitchLock};
use crate::tools::SshTools;
use crate::validator::{Validation, validate_config};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchStage {
    Resolve,
    Harden,
    Validate,
    Preserve,
    Apply,
    ApplyKnownHosts,
    Commit,
    LoadKey,
}

impl SwitchStage {
    pub fn all() -> [SwitchStage; 8] {
        [
            SwitchStage::Resolve,
            SwitchStage::Harden,
            SwitchStage::Validate,
            SwitchStage::Preserve,
            SwitchStage::Apply,
            SwitchStage::ApplyKnownHosts,
            SwitchStage::Commit,
            SwitchStage::LoadKey,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SwitchStage::Resolve => "resolve",
            SwitchStage::Harden => "harden",
            SwitchStage::Validate => "validate",
            SwitchStage::Preserve => "preserve known_hosts",
            SwitchStage::Apply => "apply config",
            SwitchStage::ApplyKnownHosts => "apply known_hosts",
            SwitchStage::Commit => "commit",
            SwitchStage::LoadKey => "load key",
        }
    }
}

impl fmt::Display for SwitchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A best-effort step that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    pub stage: SwitchStage,
    pub message: String,
}

/// Everything a successful switch did.
#[derive(Debug, Clone)]
pub struct SwitchReport {
    pub profile: String,
    /// Pointer value before the switch, dangling or not.
    pub previous: Option<String>,
    pub completed: Vec<SwitchStage>,
    pub warnings: Vec<StageWarning>,
    pub agent: Option<AgentOutcome>,
}

impl SwitchReport {
    fn new(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
            previous: None,
            completed: Vec::new(),
            warnings: Vec::new(),
            agent: None,
        }
    }

    fn done(&mut self, stage: SwitchStage) {
        tracing::debug!(profile = %self.profile, stage = stage.name(), "stage complete");
        self.completed.push(stage);
    }

    fn warn(&mut self, stage: SwitchStage, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(profile = %self.profile, stage = stage.name(), %message, "switch warning");
        self.warnings.push(StageWarning { stage, message });
    }
}

/// Terminal failures of a switch. [`SwitchError::stage`] names where it stopped.
#[derive(Error, Debug)]
pub enum SwitchError {
    #[error(transparent)]
    InvalidName(Error),

    #[error("Profile '{0}' does not exist")]
    ProfileNotFound(String),

    #[error("Refusing to switch to '{profile}': {source}")]
    InvalidConfig {
        profile: String,
        #[source]
        source: Error,
    },

    #[error("Another sshprof switch is in progress ({}): {source}", .path.display())]
    Locked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Failed to write {}: {source}. The global SSH config may be partially written; the active profile pointer was not changed",
        .target.display()
    )]
    ApplyFailed {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Applied '{profile}' but could not record it as active: {source}")]
    CommitFailed {
        profile: String,
        #[source]
        source: Error,
    },
}

impl SwitchError {
    pub fn stage(&self) -> SwitchStage {
        match self {
            SwitchError::InvalidName(_) | SwitchError::ProfileNotFound(_) => SwitchStage::Resolve,
            SwitchError::InvalidConfig { .. } => SwitchStage::Validate,
            // The lock is taken right before the first global mutation.
            SwitchError::Locked { .. } => SwitchStage::Preserve,
            SwitchError::ApplyFailed { .. } => SwitchStage::Apply,
            SwitchError::CommitFailed { .. } => SwitchStage::Commit,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            SwitchError::ApplyFailed { .. } | SwitchError::CommitFailed { .. } => {
                exit_codes::APPLY_FAILURE
            }
            _ => exit_codes::USER_ERROR,
        }
    }
}

/// Switch to a specific profile
pub fn switch_to_profile(
    paths: &Paths,
    tools: &dyn SshTools,
    name: &str,
) -> Result<SwitchReport, SwitchError> {
    let mut report = SwitchReport::new(name);

    // 1. Resolve
    validate_profile_name(name).map_err(SwitchError::InvalidName)?;
    if !profile_exists(paths, name) {
        return Err(SwitchError::ProfileNotFound(name.to_string()));
    }
    let profile_config = paths.profile_config(name);
    let profile_known_hosts = paths.profile_known_hosts(name);
    report.done(SwitchStage::Resolve);

    // 2. Harden
    for file in [&profile_config, &profile_known_hosts] {
        if file.exists()
            && let Err(e) = harden(file)
        {
            report.warn(SwitchStage::Harden, e.to_string());
        }
    }
    report.done(SwitchStage::Harden);

    // 3. Validate
    match validate_config(tools, &profile_config) {
        Ok(Validation::Valid) => {}
        Ok(Validation::Missing) => report.warn(
            SwitchStage::Validate,
            format!("{} does not exist", profile_config.display()),
        ),
        Err(source) => {
            return Err(SwitchError::InvalidConfig {
                profile: name.to_string(),
                source,
            });
        }
    }
    report.done(SwitchStage::Validate);

    let lock = SwitchLock::acquire(&paths.lock_file, LOCK_TIMEOUT).map_err(|source| {
        SwitchError::Locked {
            path: paths.lock_file.clone(),
            source,
        }
    })?;

    // 4. Preserve
    report.previous = match state::read_current(paths) {
        Ok(previous) => previous,
        Err(e) => {
            report.warn(SwitchStage::Preserve, e.to_string());
            None
        }
    };
    if let Some(previous) = report.previous.clone()
        && paths.known_hosts.exists()
    {
        if let Err(e) = preserve_known_hosts(paths, &previous) {
            report.warn(
                SwitchStage::Preserve,
                format!("known_hosts not saved back to '{}': {}", previous, e),
            );
        }
    }
    report.done(SwitchStage::Preserve);

    // 5. Apply
    apply_config(paths, &profile_config)?;
    if let Err(e) = harden(&paths.ssh_config) {
        report.warn(SwitchStage::Apply, e.to_string());
    }
    report.done(SwitchStage::Apply);

    // 6. ApplyKnownHosts
    if profile_known_hosts.exists()
        && let Err(e) = fs::copy(&profile_known_hosts, &paths.known_hosts)
    {
        report.warn(
            SwitchStage::ApplyKnownHosts,
            format!("Failed to copy known_hosts: {}", e),
        );
    }
    report.done(SwitchStage::ApplyKnownHosts);

    // 7. Commit
    state::write_current(paths, name).map_err(|source| SwitchError::CommitFailed {
        profile: name.to_string(),
        source,
    })?;
    report.done(SwitchStage::Commit);
    drop(lock);

    // 8. LoadKey
    load_identity(paths, tools, &mut report);
    report.done(SwitchStage::LoadKey);

    Ok(report)
}

/// Copy the global known_hosts back into the outgoing profile.
fn preserve_known_hosts(paths: &Paths, previous: &str) -> std::io::Result<()> {
    if !profile_exists(paths, previous) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "profile directory no longer exists",
        ));
    }
    fs::copy(&paths.known_hosts, paths.profile_known_hosts(previous))?;
    Ok(())
}

fn apply_config(paths: &Paths, profile_config: &Path) -> Result<(), SwitchError> {
    let fail = |source| SwitchError::ApplyFailed {
        target: paths.ssh_config.clone(),
        source,
    };

    if !paths.ssh_dir.is_dir() {
        DirBuilder::new()
            .recursive(true)
            .mode(PRIVATE_DIR_MODE)
            .create(&paths.ssh_dir)
            .map_err(fail)?;
    }
    fs::copy(profile_config, &paths.ssh_config).map_err(fail)?;
    Ok(())
}

fn load_identity(paths: &Paths, tools: &dyn SshTools, report: &mut SwitchReport) {
    let applied = match fs::read_to_string(&paths.ssh_config) {
        Ok(text) => text,
        Err(e) => {
            report.warn(SwitchStage::LoadKey, format!("Could not re-read applied config: {}", e));
            return;
        }
    };

    let Some(identity) = parse_identity_file(&applied, &paths.home) else {
        return;
    };
    if !identity.exists() {
        report.warn(
            SwitchStage::LoadKey,
            format!("IdentityFile {} does not exist", identity.display()),
        );
        return;
    }

    match agent::ensure_loaded(tools, &identity) {
        Ok(outcome) => report.agent = Some(outcome),
        Err(e) => report.warn(SwitchStage::LoadKey, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeTools, setup_test_paths, write_profile};
    use tempfile::TempDir;

    fn snapshot(paths: &Paths) -> (Option<Vec<u8>>, Option<Vec<u8>>, Option<Vec<u8>>) {
        (
            fs::read(&paths.ssh_config).ok(),
            fs::read(&paths.known_hosts).ok(),
            fs::read(&paths.pointer_file).ok(),
        )
    }

    fn seed_globals(paths: &Paths) {
        fs::create_dir_all(&paths.ssh_dir).unwrap();
        fs::write(&paths.ssh_config, "Host *\n    User original\n").unwrap();
        fs::write(&paths.known_hosts, "host1 ssh-ed25519 AAAA\n").unwrap();
    }

    #[test]
    fn test_switch_applies_config_and_commits() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        write_profile(&paths, "work", "Host *\n    User alice\n", Some("work-host ssh-rsa BBBB\n"));

        let report = switch_to_profile(&paths, &tools, "work").unwrap();

        assert_eq!(report.completed, SwitchStage::all().to_vec());
        assert_eq!(fs::read_to_string(&paths.ssh_config).unwrap(), "Host *\n    User alice\n");
        assert_eq!(fs::read_to_string(&paths.known_hosts).unwrap(), "work-host ssh-rsa BBBB\n");
        assert_eq!(state::read_current(&paths).unwrap().as_deref(), Some("work"));
        assert_eq!(crate::permissions::mode_of(&paths.ssh_config), Some(0o600));
    }

    #[test]
    fn test_switch_missing_profile_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        seed_globals(&paths);
        state::write_current(&paths, "home").unwrap();
        let before = snapshot(&paths);

        let err = switch_to_profile(&paths, &tools, "ghost").unwrap_err();

        assert!(matches!(err, SwitchError::ProfileNotFound(_)));
        assert_eq!(err.stage(), SwitchStage::Resolve);
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert_eq!(snapshot(&paths), before);
    }

    #[test]
    fn test_switch_rejects_names_outside_store() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        seed_globals(&paths);
        write_profile(&paths, "home", "Host *\n", None);
        state::write_current(&paths, "home").unwrap();
        // A config one level above the store must never be applied.
        fs::write(temp_dir.path().join("config"), "Host *\n    User intruder\n").unwrap();
        let before = snapshot(&paths);

        for bad in ["..", ".", "a/b"] {
            let err = switch_to_profile(&paths, &tools, bad).unwrap_err();
            assert!(
                matches!(err, SwitchError::InvalidName(Error::InvalidName { .. })),
                "{bad:?}: unexpected error {err}"
            );
            assert_eq!(err.stage(), SwitchStage::Resolve);
            assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
            assert_eq!(snapshot(&paths), before);
        }
    }

    #[test]
    fn test_switch_ignores_pointer_outside_store() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        seed_globals(&paths);
        write_profile(&paths, "b", "Host *\n", None);
        fs::write(&paths.pointer_file, "..\n").unwrap();

        let report = switch_to_profile(&paths, &tools, "b").unwrap();

        assert!(report.warnings.iter().any(|w| w.stage == SwitchStage::Preserve));
        assert!(!temp_dir.path().join("known_hosts").exists());
        assert_eq!(state::read_current(&paths).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_switch_invalid_config_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new().with_invalid_config("config line 1: error: bad option\n");
        seed_globals(&paths);
        write_profile(&paths, "broken", "Hots *\n", None);
        state::write_current(&paths, "home").unwrap();
        let before = snapshot(&paths);

        let err = switch_to_profile(&paths, &tools, "broken").unwrap_err();

        assert_eq!(err.stage(), SwitchStage::Validate);
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        match &err {
            SwitchError::InvalidConfig {
                source: Error::InvalidConfig { diagnostics, .. },
                ..
            } => assert_eq!(diagnostics, &vec!["config line 1: error: bad option".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(snapshot(&paths), before);
    }

    #[test]
    fn test_switch_preserves_outgoing_known_hosts() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        write_profile(&paths, "a", "Host *\n    User a\n", Some("a-host key\n"));
        write_profile(&paths, "b", "Host *\n    User b\n", Some("b-host key\n"));

        switch_to_profile(&paths, &tools, "a").unwrap();
        // ssh learns a new host while "a" is active.
        fs::write(&paths.known_hosts, "a-host key\nnew-host key\n").unwrap();
        let global_before = fs::read(&paths.known_hosts).unwrap();

        let report = switch_to_profile(&paths, &tools, "b").unwrap();

        assert_eq!(report.previous.as_deref(), Some("a"));
        assert_eq!(fs::read(paths.profile_known_hosts("a")).unwrap(), global_before);
        assert_eq!(fs::read_to_string(&paths.known_hosts).unwrap(), "b-host key\n");
    }

    #[test]
    fn test_switch_with_dangling_pointer_warns_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        seed_globals(&paths);
        write_profile(&paths, "b", "Host *\n", None);
        state::write_current(&paths, "deleted").unwrap();

        let report = switch_to_profile(&paths, &tools, "b").unwrap();

        assert!(report.warnings.iter().any(|w| w.stage == SwitchStage::Preserve));
        assert!(!paths.profile_dir("deleted").exists());
        assert_eq!(state::read_current(&paths).unwrap().as_deref(), Some("b"));
        // No known_hosts in "b": the global one is left alone.
        assert_eq!(fs::read_to_string(&paths.known_hosts).unwrap(), "host1 ssh-ed25519 AAAA\n");
    }

    #[test]
    fn test_switch_apply_failure_keeps_pointer() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        write_profile(&paths, "work", "Host *\n", None);
        state::write_current(&paths, "home").unwrap();
        // A directory where the config file should be makes the copy fail.
        fs::create_dir_all(paths.ssh_config.join("blocker")).unwrap();

        let err = switch_to_profile(&paths, &tools, "work").unwrap_err();

        assert!(matches!(err, SwitchError::ApplyFailed { .. }));
        assert_eq!(err.stage(), SwitchStage::Apply);
        assert_eq!(err.exit_code(), exit_codes::APPLY_FAILURE);
        assert_eq!(state::read_current(&paths).unwrap().as_deref(), Some("home"));
    }

    #[test]
    fn test_switch_missing_config_is_fatal_at_apply() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        crate::profiles::create_profile(&paths, "empty").unwrap();

        let err = switch_to_profile(&paths, &tools, "empty").unwrap_err();
        assert_eq!(err.stage(), SwitchStage::Apply);
        assert_eq!(state::read_current(&paths).unwrap(), None);
    }

    #[test]
    fn test_switch_loads_identity_into_agent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new().with_agent(&[]);
        let key = paths.profile_dir("work").join("id_ed25519");
        write_profile(
            &paths,
            "work",
            &format!("Host *\n    IdentityFile {}\n", key.display()),
            None,
        );
        fs::write(&key, "PRIVATE").unwrap();

        let report = switch_to_profile(&paths, &tools, "work").unwrap();

        assert!(matches!(report.agent, Some(AgentOutcome::Loaded { .. })));
        assert_eq!(tools.added_keys(), vec![key]);
    }

    #[test]
    fn test_switch_agent_failure_is_only_a_warning() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new();
        let key = paths.profile_dir("work").join("id_rsa");
        write_profile(
            &paths,
            "work",
            &format!("Host *\n    IdentityFile {}\n", key.display()),
            None,
        );
        fs::write(&key, "PRIVATE").unwrap();

        let report = switch_to_profile(&paths, &tools, "work").unwrap();

        assert!(report.agent.is_none());
        assert!(report.warnings.iter().any(|w| w.stage == SwitchStage::LoadKey));
        assert_eq!(state::read_current(&paths).unwrap().as_deref(), Some("work"));
    }

    #[test]
    fn test_switch_expands_tilde_identity() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let tools = FakeTools::new().with_agent(&[]);
        fs::create_dir_all(paths.home.join("keys")).unwrap();
        fs::write(paths.home.join("keys/id_home"), "PRIVATE").unwrap();
        write_profile(&paths, "home", "Host *\n  identityfile ~/keys/id_home\n", None);

        switch_to_profile(&paths, &tools, "home").unwrap();
        assert_eq!(tools.added_keys(), vec![paths.home.join("keys/id_home")]);
    }
}
