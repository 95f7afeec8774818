//! External SSH tool runner.
//!
//! Every process sshprof spawns (`ssh`, `ssh-keygen`, `ssh-add`) goes through
//! the [`SshTools`] trait so the parsing code around it can be tested against
//! a scripted implementation instead of the real binaries.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::{Error, Result};
use crate::keys::KeyType;

pub const SSH_ENV: &str = "SSHPROF_SSH";
pub const SSH_KEYGEN_ENV: &str = "SSHPROF_SSH_KEYGEN";
pub const SSH_ADD_ENV: &str = "SSHPROF_SSH_ADD";

/// Hostname handed to `ssh -G`. `.invalid` is reserved and never resolves.
pub const PROBE_HOST: &str = "example.invalid";

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout followed by stderr, the way a `2>&1` redirect would see them.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !out.ends_with('\n') && !self.stderr.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }

    /// First non-empty line of stderr, or stdout if stderr is empty.
    pub fn first_message(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .to_string()
    }
}

/// Arguments for a single `ssh-keygen` run.
#[derive(Debug, Clone, Copy)]
pub struct KeygenRequest<'a> {
    pub key_type: KeyType,
    pub bits: Option<u32>,
    pub path: &'a Path,
    pub passphrase: &'a str,
}

/// The external commands sshprof depends on.
pub trait SshTools {
    /// `ssh -G -F <config> <PROBE_HOST>`: parse the config without connecting.
    fn resolve_config(&self, config: &Path) -> Result<ToolOutput>;

    /// `ssh-keygen -q -t .. [-b ..] -f .. -N ..`.
    fn generate_key(&self, request: &KeygenRequest<'_>) -> Result<ToolOutput>;

    /// `ssh-keygen -l -f <key>`.
    fn fingerprint(&self, key: &Path) -> Result<ToolOutput>;

    /// Whether an agent socket is advertised in the environment.
    fn agent_available(&self) -> bool;

    /// `ssh-add -l`.
    fn agent_list(&self) -> Result<ToolOutput>;

    /// `ssh-add <key>`.
    fn agent_add(&self, key: &Path) -> Result<ToolOutput>;
}

/// Binary names for the real tools.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ssh: String,
    pub ssh_keygen: String,
    pub ssh_add: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ssh: "ssh".into(),
            ssh_keygen: "ssh-keygen".into(),
            ssh_add: "ssh-add".into(),
        }
    }
}

impl ToolConfig {
    /// Defaults, overridden by `SSHPROF_SSH`, `SSHPROF_SSH_KEYGEN` and `SSHPROF_SSH_ADD`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let pick = |var: &str, fallback: String| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback)
        };
        Self {
            ssh: pick(SSH_ENV, defaults.ssh),
            ssh_keygen: pick(SSH_KEYGEN_ENV, defaults.ssh_keygen),
            ssh_add: pick(SSH_ADD_ENV, defaults.ssh_add),
        }
    }
}

/// [`SshTools`] backed by real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemTools {
    config: ToolConfig,
}

impl SystemTools {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ToolConfig::from_env())
    }

    fn run<I, S>(&self, program: &str, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::Tool {
                program: program.to_string(),
                source,
            })?;

        let out = ToolOutput::from_output(&output);
        tracing::debug!(program, status = ?out.status, "tool finished");
        Ok(out)
    }
}

impl SshTools for SystemTools {
    fn resolve_config(&self, config: &Path) -> Result<ToolOutput> {
        tracing::debug!(config = %config.display(), "ssh -G");
        self.run(
            &self.config.ssh,
            [
                OsStr::new("-G"),
                OsStr::new("-F"),
                config.as_os_str(),
                OsStr::new(PROBE_HOST),
            ],
        )
    }

    fn generate_key(&self, request: &KeygenRequest<'_>) -> Result<ToolOutput> {
        let bits = request.bits.map(|b| b.to_string());
        let mut args = vec![
            OsStr::new("-q"),
            OsStr::new("-t"),
            OsStr::new(request.key_type.as_str()),
        ];
        if let Some(bits) = &bits {
            args.push(OsStr::new("-b"));
            args.push(OsStr::new(bits));
        }
        args.push(OsStr::new("-f"));
        args.push(request.path.as_os_str());
        args.push(OsStr::new("-N"));
        args.push(OsStr::new(request.passphrase));

        // The passphrase is an argument; only log the shape of the request.
        tracing::debug!(
            key_type = request.key_type.as_str(),
            bits = ?request.bits,
            path = %request.path.display(),
            "ssh-keygen"
        );
        self.run(&self.config.ssh_keygen, &args)
    }

    fn fingerprint(&self, key: &Path) -> Result<ToolOutput> {
        self.run(
            &self.config.ssh_keygen,
            [OsStr::new("-l"), OsStr::new("-f"), key.as_os_str()],
        )
    }

    fn agent_available(&self) -> bool {
        std::env::var_os("SSH_AUTH_SOCK").is_some_and(|v| !v.is_empty())
    }

    fn agent_list(&self) -> Result<ToolOutput> {
        self.run(&self.config.ssh_add, ["-l"])
    }

    fn agent_add(&self, key: &Path) -> Result<ToolOutput> {
        self.run(&self.config.ssh_add, [key])
    }
}
