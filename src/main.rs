//! sshprof: switch `~/.ssh/config` between named profiles.
//!
//! Parses arguments, sets up logging and dispatches to `commands`. Errors are
//! printed once here and mapped to the process exit code.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use sshprof::{
    commands::{self, AddArgs, App},
    error::{exit_code_for, render},
    exit_codes,
    keys::KeyType,
    paths::Paths,
    prompt::TerminalPrompter,
    tools::SystemTools,
    ui::{ColorMode, Ui},
};

/// Log filter variable, e.g. `SSHPROF_LOG=debug`.
const LOG_ENV: &str = "SSHPROF_LOG";

#[derive(Parser)]
#[command(name = "sshprof")]
#[command(about = "SSH Profile Switcher - keep several ~/.ssh/config setups and swap between them")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Without a command an interactive menu is shown
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch to a profile (activate it)
    #[command(visible_alias = "sw", alias = "use")]
    Switch {
        /// Name of the profile to activate
        name: String,
    },

    /// Add a new profile (interactive unless --user is given)
    Add {
        /// Name of the profile to create
        name: String,

        /// SSH username for the profile
        #[arg(short, long)]
        user: Option<String>,

        /// Existing private key to copy into the profile
        #[arg(short, long, value_name = "PATH")]
        identity: Option<String>,

        /// Generate a new key of this type: rsa, ed25519, ecdsa, dsa
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        key_type: Option<KeyType>,

        /// Key size in bits for generated keys (default 4096)
        #[arg(short, long, value_name = "BITS")]
        size: Option<u32>,

        /// Prompt for a passphrase for the generated key
        #[arg(short, long)]
        passphrase: bool,
    },

    /// Save the current ~/.ssh/config and known_hosts as a new profile
    #[command(visible_alias = "bak")]
    Backup {
        /// Name of the profile to create
        name: String,
    },

    /// Delete a profile
    #[command(visible_alias = "del", alias = "rm")]
    Delete {
        /// Name of the profile to delete
        name: String,
    },

    /// Open a profile's config in your editor and validate it
    Edit {
        /// Name of the profile to edit
        name: String,
    },

    /// List all available profiles
    #[command(visible_alias = "ls")]
    List,

    /// Show the active profile and whether ~/.ssh/config still matches it
    Current,

    /// Run diagnostics on the sshprof setup
    Doctor,

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    exit_codes::SUCCESS
                }
                _ => exit_codes::USER_ERROR,
            };
            let _ = e.print();
            return ExitCode::from(code as u8);
        }
    };

    init_tracing();
    let ui = Ui::new(cli.color, cli.no_color);

    match run(cli.command, &ui) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            ui.err(render(&err));
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Option<Commands>, ui: &Ui) -> Result<()> {
    if let Some(Commands::Completions { shell }) = command {
        clap_complete::generate(shell, &mut Cli::command(), "sshprof", &mut std::io::stdout());
        return Ok(());
    }

    let paths = Paths::new()?;
    let tools = SystemTools::from_env();
    let app = App {
        paths: &paths,
        ui,
        tools: &tools,
        prompter: &TerminalPrompter,
    };

    match command {
        None => commands::menu(&app),
        Some(Commands::Switch { name }) => commands::switch(&app, &name),
        Some(Commands::Add {
            name,
            user,
            identity,
            key_type,
            size,
            passphrase,
        }) => commands::add(
            &app,
            &AddArgs {
                name,
                user,
                identity,
                key_type,
                bits: size,
                passphrase,
            },
        ),
        Some(Commands::Backup { name }) => commands::backup(&app, &name),
        Some(Commands::Delete { name }) => commands::delete(&app, &name),
        Some(Commands::Edit { name }) => commands::edit(&app, &name),
        Some(Commands::List) => commands::list(&app),
        Some(Commands::Current) => commands::current(&app),
        Some(Commands::Doctor) => commands::doctor(&app),
        Some(Commands::Completions { .. }) => Ok(()),
    }
}
