//! Diagnostic tool for sshprof.
//!
//! This module implements the `sshprof doctor` command, which checks the
//! system for common issues:
//! - Existence and modes of the profile store and `~/.ssh`.
//! - A pointer naming a profile that no longer exists.
//! - Drift between `~/.ssh/config` and the active profile.
//! - Profile files and keys that other users can read.
//!
//! It reports issues to the user with a pass/fail/warn status. Nothing is
//! repaired here.

use anstyle::AnsiColor;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::{App, DEFAULT_EDITOR};
use crate::paths::Paths;
use crate::permissions::{PRIVATE_DIR_MODE, PRIVATE_FILE_MODE, mode_of};
use crate::profiles::{list_profiles, profile_exists};
use crate::ssh_config::parse_identity_file;
use crate::state;
use crate::ui::{Icon, Ui};

/// Run the doctor diagnostics
pub fn run_doctor(app: &App) {
    let ui = app.ui;
    let paths = app.paths;
    ui.section("sshprof Doctor");
    ui.newline();

    // 1. Directories
    check_step(ui, "Directories", || {
        let store = paths.base_dir.display();
        let ok = match mode_of(&paths.base_dir) {
            Some(PRIVATE_DIR_MODE) => {
                ui.item(Icon::Ok, format!("Profile store: {}", store));
                true
            }
            Some(mode) => {
                ui.item(
                    Icon::Warn,
                    format!("Profile store is mode {:o}, expected {:o}: {}", mode, PRIVATE_DIR_MODE, store),
                );
                false
            }
            None => {
                ui.item(Icon::Info, format!("Profile store not created yet: {}", store));
                true
            }
        };

        // ~/.ssh is created on first switch.
        if paths.ssh_dir.is_dir() {
            ui.item(Icon::Ok, format!("SSH directory: {}", paths.ssh_dir.display()));
        } else {
            ui.item(Icon::Warn, format!("SSH directory missing: {}", paths.ssh_dir.display()));
        }
        ok
    });

    // 2. Active profile
    check_step(ui, "Active Profile", || match state::read_current(paths) {
        Ok(None) => {
            ui.item(Icon::Info, "No active profile set");
            true
        }
        Ok(Some(name)) if !profile_exists(paths, &name) => {
            ui.item(Icon::Err, format!("Active profile '{}' no longer exists", name));
            false
        }
        Ok(Some(name)) => {
            ui.item(Icon::Ok, format!("Active profile: {}", name));
            check_global_config(ui, paths, &name)
        }
        Err(e) => {
            ui.item(Icon::Err, e.to_string());
            false
        }
    });

    // 3. Profiles
    check_step(ui, "Profiles", || {
        let profiles = match list_profiles(paths) {
            Ok(p) => p,
            Err(e) => {
                ui.item(Icon::Err, format!("Failed to list profiles: {}", e));
                return false;
            }
        };

        if profiles.is_empty() {
            ui.item(Icon::Warn, "No profiles found");
            return true;
        }

        ui.println(format!("  Found {} profiles:", profiles.len()));
        let mut all_valid = true;
        for name in profiles {
            let issues = profile_issues(paths, &name);
            if issues.is_empty() {
                ui.item(Icon::Ok, format!("  {}", name));
            } else {
                ui.item(Icon::Warn, format!("  {} ({})", name, issues.join(", ")));
                all_valid = false;
            }
        }
        all_valid
    });

    // 4. Environment
    check_step(ui, "Environment", || {
        if app.tools.agent_available() {
            ui.item(Icon::Ok, "ssh-agent reachable via SSH_AUTH_SOCK");
        } else {
            ui.item(Icon::Info, "SSH_AUTH_SOCK not set; keys will not be loaded on switch");
        }
        match env::var("VISUAL").or_else(|_| env::var("EDITOR")) {
            Ok(e) => ui.item(Icon::Ok, format!("Editor: {}", e)),
            Err(_) => ui.item(
                Icon::Info,
                format!("VISUAL and EDITOR not set (using {})", DEFAULT_EDITOR),
            ),
        }
        true
    });
}

fn check_global_config(ui: &Ui, paths: &Paths, name: &str) -> bool {
    let Ok(global) = fs::read(&paths.ssh_config) else {
        ui.item(Icon::Err, format!("{} is missing", paths.ssh_config.display()));
        return false;
    };

    if fs::read(paths.profile_config(name)).is_ok_and(|profile| profile == global) {
        ui.item(Icon::Ok, format!("~/.ssh/config matches '{}'", name));
    } else {
        ui.item(
            Icon::Warn,
            "~/.ssh/config was changed since the last switch; those edits are lost on the next one",
        );
    }

    match mode_of(&paths.ssh_config) {
        Some(mode) if mode != PRIVATE_FILE_MODE => {
            ui.item(Icon::Warn, format!("~/.ssh/config is mode {:o}", mode));
            false
        }
        _ => true,
    }
}

/// Files of a profile that must be private: config, known_hosts and the key.
fn sensitive_files(paths: &Paths, name: &str) -> Vec<PathBuf> {
    let config = paths.profile_config(name);
    let mut files = vec![config.clone(), paths.profile_known_hosts(name)];
    if let Ok(text) = fs::read_to_string(&config)
        && let Some(identity) = parse_identity_file(&text, &paths.home)
    {
        files.push(identity);
    }
    files
}

fn profile_issues(paths: &Paths, name: &str) -> Vec<String> {
    let mut issues = Vec::new();
    if !paths.profile_config(name).is_file() {
        issues.push("no config".to_string());
    }
    for file in sensitive_files(paths, name) {
        match mode_of(&file) {
            Some(mode) if mode != PRIVATE_FILE_MODE => {
                issues.push(format!("{} is mode {:o}", file_label(&file), mode));
            }
            None if !is_profile_file(paths, name, &file) => {
                issues.push(format!("key {} missing", file.display()));
            }
            _ => {}
        }
    }
    issues
}

fn is_profile_file(paths: &Paths, name: &str, file: &Path) -> bool {
    file == paths.profile_config(name) || file == paths.profile_known_hosts(name)
}

fn file_label(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F)
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    if !check_fn() {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
}
