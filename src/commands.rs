//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command (`list`,
//! `add`, `switch`, ...). It is the coordination layer between:
//! - `crate::ui` and `crate::prompt` for user interaction.
//! - `crate::profiles`, `crate::builder` and `crate::state` for the store.
//! - `crate::switch` for profile activation.
//!
//! Each function here generally corresponds to a subcommand in `main.rs`.

use anyhow::{Context, Result, bail};
use comfy_table::Color;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::agent::AgentOutcome;
use crate::builder::{self, KeySource, NewProfile};
use crate::error::Error;
use crate::keys::{KeySpec, KeyType};
use crate::paths::Paths;
use crate::profiles::{self, list_profiles, profile_exists, validate_profile_name};
use crate::prompt::Prompter;
use crate::state;
use crate::switch::{SwitchReport, switch_to_profile};
use crate::tools::SshTools;
use crate::ui::{Icon, Ui};
use crate::validator::{Validation, validate_config};

/// Editor used when neither `VISUAL` nor `EDITOR` is set.
pub const DEFAULT_EDITOR: &str = "vi";

/// Literal the user must type before the active profile is deleted.
pub const DELETE_CONFIRMATION: &str = "DELETE";

/// Everything a command handler needs.
pub struct App<'a> {
    pub paths: &'a Paths,
    pub ui: &'a Ui,
    pub tools: &'a dyn SshTools,
    pub prompter: &'a dyn Prompter,
}

/// Flags accepted by `add`.
#[derive(Debug, Clone, Default)]
pub struct AddArgs {
    pub name: String,
    pub user: Option<String>,
    pub identity: Option<String>,
    pub key_type: Option<KeyType>,
    pub bits: Option<u32>,
    pub passphrase: bool,
}

/// List all profiles, marking the active one
pub fn list(app: &App) -> Result<()> {
    let ui = app.ui;
    let profiles = list_profiles(app.paths)?;

    if profiles.is_empty() {
        ui.warn("No profiles found.");
        ui.newline();
        ui.println("Create one with:");
        ui.println(format!("  {} add <name> -u <user> -t ed25519", ui.bold("sshprof")));
        ui.println(format!("  {} backup <name>", ui.bold("sshprof")));
        return Ok(());
    }

    let pointer = state::read_current(app.paths).unwrap_or(None);
    let active = state::active_profile(app.paths);

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Status"),
    ]);
    for name in &profiles {
        let is_active = active.as_deref() == Some(name.as_str());
        table.add_row(vec![
            ui.cell(if is_active { ui.icon(Icon::Ok) } else { " " }),
            ui.cell(name),
            if is_active {
                ui.colored_cell("active", Color::Green)
            } else {
                ui.cell("-")
            },
        ]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());

    if let Some(name) = pointer
        && active.is_none()
    {
        ui.newline();
        ui.warn(format!(
            "Active profile '{}' no longer exists; ~/.ssh/config is not managed by any profile.",
            name
        ));
    }
    Ok(())
}

/// Show the active profile and whether the global config still matches it
pub fn current(app: &App) -> Result<()> {
    let ui = app.ui;
    let paths = app.paths;

    ui.section("Current Profile");
    let mut table = ui.simple_table();

    match state::read_current(paths)? {
        None => {
            table.add_row(vec![ui.cell("Active profile:"), ui.cell("(none)")]);
        }
        Some(name) if !profile_exists(paths, &name) => {
            table.add_row(vec![
                ui.cell("Active profile:"),
                ui.colored_cell(format!("{} (deleted)", name), Color::Red),
            ]);
        }
        Some(name) => {
            table.add_row(vec![ui.cell("Active profile:"), ui.header_cell(&name)]);
            let status = match (fs::read(paths.profile_config(&name)), fs::read(&paths.ssh_config)) {
                (Ok(profile), Ok(global)) if profile == global => ui.colored_cell("in sync", Color::Green),
                (_, Err(_)) => ui.colored_cell("missing", Color::Red),
                _ => ui.colored_cell("modified since switch", Color::Yellow),
            };
            table.add_row(vec![ui.cell("Global config:"), status]);
        }
    }
    table.add_row(vec![
        ui.cell("Config path:"),
        ui.cell(paths.ssh_config.display().to_string()),
    ]);

    ui.println(table.to_string());
    Ok(())
}

/// Switch to a profile
pub fn switch(app: &App, name: &str) -> Result<()> {
    let ui = app.ui;
    let spinner = ui.spinner(format!("Switching to profile '{}'...", name));

    match switch_to_profile(app.paths, app.tools, name) {
        Ok(report) => {
            ui.spinner_finish_ok(&spinner, format!("Active profile: {}", name));
            print_switch_report(ui, &report);
            Ok(())
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

fn print_switch_report(ui: &Ui, report: &SwitchReport) {
    for warning in &report.warnings {
        ui.warn(format!("{}: {}", warning.stage, warning.message));
    }
    match &report.agent {
        Some(AgentOutcome::Loaded { fingerprint }) => {
            ui.info(format!("Added key {} to ssh-agent", fingerprint));
        }
        Some(AgentOutcome::AlreadyLoaded { fingerprint }) => {
            ui.info(format!("Key {} already in ssh-agent", ui.dim(fingerprint)));
        }
        None => {}
    }
}

/// Add a new profile
///
/// Without `--user` the fully interactive flow runs and every other flag is
/// ignored.
pub fn add(app: &App, args: &AddArgs) -> Result<()> {
    validate_profile_name(&args.name)?;
    if profile_exists(app.paths, &args.name) {
        return Err(Error::AlreadyExists(args.name.clone()).into());
    }

    let new_profile = match &args.user {
        Some(user) => profile_from_args(app, user, args)?,
        None => prompt_new_profile(app)?,
    };

    let generating = matches!(new_profile.key, KeySource::Generate(_));
    let spinner = app.ui.spinner(if generating {
        "Generating key..."
    } else {
        "Creating profile..."
    });
    let report = match builder::build_profile(app.paths, app.tools, &args.name, &new_profile) {
        Ok(report) => {
            spinner.finish_and_clear();
            report
        }
        Err(e) => {
            app.ui.spinner_finish_err(&spinner, format!("Failed to create profile '{}'", args.name));
            return Err(e.into());
        }
    };

    let ui = app.ui;
    ui.warn_each(&report.warnings);
    ui.ok(format!("Created profile '{}'", args.name));
    ui.item(Icon::Info, report.config.display().to_string());
    if let Some(key) = &report.identity_file {
        let note = if report.key_reused { " (existing key kept)" } else { "" };
        ui.item(Icon::Info, format!("{}{}", key.display(), note));
    }
    ui.newline();
    ui.println("To activate it:");
    ui.println(format!("  sshprof switch {}", args.name));
    Ok(())
}

fn profile_from_args(app: &App, user: &str, args: &AddArgs) -> Result<NewProfile> {
    let key = if let Some(identity) = &args.identity {
        if args.key_type.is_some() {
            app.ui.warn("Both -i and -t given; importing the existing key.");
        }
        KeySource::Import(app.paths.expand_tilde(identity))
    } else if let Some(key_type) = args.key_type {
        let passphrase = if args.passphrase {
            read_passphrase(app.prompter)?
        } else {
            None
        };
        KeySource::Generate(KeySpec {
            key_type,
            bits: args.bits,
            passphrase,
        })
    } else {
        if args.bits.is_some() || args.passphrase {
            app.ui.warn("-s and -p only apply when generating a key with -t; ignoring.");
        }
        KeySource::None
    };

    Ok(NewProfile {
        user: non_empty(user),
        key,
    })
}

const KEY_USE_EXISTING: &str = "Use existing key";
const KEY_GENERATE: &str = "Generate new key";
const KEY_NONE: &str = "No key";

fn prompt_new_profile(app: &App) -> Result<NewProfile> {
    let prompter = app.prompter;
    let user = non_empty(&prompter.text("SSH username (leave blank for none):")?);

    let choices = [KEY_USE_EXISTING, KEY_GENERATE, KEY_NONE].map(String::from);
    let key = match choices[prompter.select("Key for this profile:", &choices)?].as_str() {
        KEY_USE_EXISTING => {
            let path = prompter.text("Path to private key:")?;
            KeySource::Import(app.paths.expand_tilde(path.trim()))
        }
        KEY_GENERATE => {
            let types: Vec<String> = KeyType::all().iter().map(|t| t.to_string()).collect();
            let key_type = KeyType::all()[prompter.select("Key type:", &types)?];
            let bits = if key_type.has_fixed_size() {
                None
            } else {
                parse_bits(&prompter.text("Key size in bits (blank for 4096):")?)?
            };
            KeySource::Generate(KeySpec {
                key_type,
                bits,
                passphrase: read_passphrase(prompter)?,
            })
        }
        _ => KeySource::None,
    };

    Ok(NewProfile { user, key })
}

fn read_passphrase(prompter: &dyn Prompter) -> Result<Option<String>> {
    let passphrase = prompter.new_password("Key passphrase (blank for none):")?;
    Ok((!passphrase.is_empty()).then_some(passphrase))
}

fn parse_bits(input: &str) -> Result<Option<u32>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let bits = input
        .parse::<u32>()
        .with_context(|| format!("Invalid key size '{}'", input))?;
    Ok(Some(bits))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Snapshot the current global SSH config and known_hosts as a profile
pub fn backup(app: &App, name: &str) -> Result<()> {
    let ui = app.ui;
    let report = builder::backup_current(app.paths, name)?;

    ui.warn_each(&report.warnings);
    if !report.copied_config {
        ui.warn(format!("{} does not exist; saved an empty config", app.paths.ssh_config.display()));
    }
    if !report.copied_known_hosts {
        ui.warn(format!(
            "{} does not exist; saved an empty known_hosts",
            app.paths.known_hosts.display()
        ));
    }
    ui.ok(format!("Backed up current SSH setup as '{}'", name));
    Ok(())
}

/// Delete a profile after confirmation
///
/// Declining either confirmation is a cancellation, not an error.
pub fn delete(app: &App, name: &str) -> Result<()> {
    let ui = app.ui;
    validate_profile_name(name)?;
    if !profile_exists(app.paths, name) {
        return Err(Error::NotFound(name.to_string()).into());
    }

    let answer = app
        .prompter
        .text(&format!("Delete profile '{}'? This cannot be undone [y/N]:", name))?;
    if !answer.trim().eq_ignore_ascii_case("y") {
        ui.warn("Deletion cancelled.");
        return Ok(());
    }

    let is_active = state::read_current(app.paths)?.as_deref() == Some(name);
    if is_active {
        ui.warn(format!("'{}' is the active profile.", name));
        let typed = app
            .prompter
            .text(&format!("Type {} to confirm:", DELETE_CONFIRMATION))?;
        if typed.trim() != DELETE_CONFIRMATION {
            ui.warn("Deletion cancelled.");
            return Ok(());
        }
    }

    let outcome = profiles::remove_profile(app.paths, name)?;
    ui.ok(format!("Deleted profile '{}'", name));
    if outcome.was_active {
        ui.warn(format!(
            "{} still contains the deleted profile's settings. Switch to another profile to replace it.",
            app.paths.ssh_config.display()
        ));
    }
    Ok(())
}

/// Open a profile's config in the editor, then validate it
pub fn edit(app: &App, name: &str) -> Result<()> {
    validate_profile_name(name)?;
    if !profile_exists(app.paths, name) {
        return Err(Error::NotFound(name.to_string()).into());
    }

    let config = app.paths.profile_config(name);
    open_in_editor(&editor_command()?, &config)?;

    match validate_config(app.tools, &config)? {
        Validation::Valid => {
            if let Err(e) = crate::permissions::harden(&config) {
                app.ui.warn(e.to_string());
            }
            app.ui.ok(format!("Config for '{}' is valid", name));
        }
        Validation::Missing => {
            app.ui.warn(format!("{} was not saved", config.display()));
        }
    }

    if state::active_profile(app.paths).as_deref() == Some(name) {
        app.ui.info(format!("Run 'sshprof switch {}' to apply the changes", name));
    }
    Ok(())
}

/// Editor argv from `VISUAL`, then `EDITOR`, defaulting to `vi`.
pub fn editor_command() -> Result<Vec<String>> {
    let raw = ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string());

    let argv = shell_words::split(&raw).with_context(|| format!("Cannot parse editor command '{}'", raw))?;
    if argv.is_empty() {
        bail!("Editor command is empty");
    }
    Ok(argv)
}

fn open_in_editor(argv: &[String], path: &Path) -> Result<()> {
    let (program, args) = argv.split_first().context("Editor command is empty")?;
    let status = Command::new(program)
        .args(args)
        .arg(path)
        .status()
        .with_context(|| format!("Failed to run editor: {}", program))?;

    if !status.success() {
        bail!("Editor exited with non-zero status");
    }
    Ok(())
}

/// Numbered menu over profiles; a number switches, `q` quits
pub fn menu(app: &App) -> Result<()> {
    let ui = app.ui;
    let profiles = list_profiles(app.paths)?;
    if profiles.is_empty() {
        return list(app);
    }

    let active = state::active_profile(app.paths);
    ui.section("SSH Profiles");
    for (i, name) in profiles.iter().enumerate() {
        let marker = if active.as_deref() == Some(name.as_str()) {
            format!(" {}", ui.colored("(active)", anstyle::AnsiColor::Green))
        } else {
            String::new()
        };
        ui.println(format!("  {}) {}{}", i + 1, name, marker));
    }
    ui.newline();

    let answer = app
        .prompter
        .text(&format!("Select a profile [1-{}, q to quit]:", profiles.len()))?;
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("q") {
        return Ok(());
    }

    match answer.parse::<usize>() {
        Ok(n) if (1..=profiles.len()).contains(&n) => switch(app, &profiles[n - 1]),
        _ => bail!("Invalid selection '{}'", answer),
    }
}

/// Run diagnostics
pub fn doctor(app: &App) -> Result<()> {
    crate::doctor::run_doctor(app);
    Ok(())
}
