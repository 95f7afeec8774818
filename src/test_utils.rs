//! Test utilities shared across test modules
//!
//! Provides a sandboxed [`Paths`] layout and [`FakeTools`], a scripted
//! [`SshTools`] that never spawns a process.

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::Result;
use crate::keys::{KeyType, public_key_path};
use crate::paths::Paths;
use crate::profiles::create_profile;
use crate::prompt::Prompter;
use crate::tools::{KeygenRequest, SshTools, ToolOutput};

/// Create a Paths struct for testing using a temporary directory
///
/// Mimics the real `~/.ssh-profiles/` and `~/.ssh/` layout under the temp dir,
/// which also stands in for the home directory.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    let home = temp_dir.path().to_path_buf();
    Paths::from_roots(home.clone(), home.join(".ssh-profiles"), home.join(".ssh"))
}

/// Create profile `name` with the given config and optional known_hosts.
pub fn write_profile(paths: &Paths, name: &str, config: &str, known_hosts: Option<&str>) {
    create_profile(paths, name).unwrap();
    fs::write(paths.profile_config(name), config).unwrap();
    if let Some(known_hosts) = known_hosts {
        fs::write(paths.profile_known_hosts(name), known_hosts).unwrap();
    }
}

#[derive(Debug, Clone)]
pub struct RecordedKeygen {
    pub key_type: KeyType,
    pub bits: Option<u32>,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct FakeState {
    resolve_calls: usize,
    keygen_calls: Vec<RecordedKeygen>,
    added: Vec<PathBuf>,
    /// Fingerprints held by the agent; `None` means no agent.
    agent: Option<Vec<String>>,
}

/// Scripted stand-in for `ssh`, `ssh-keygen` and `ssh-add`.
#[derive(Debug, Default)]
pub struct FakeTools {
    invalid_config: Option<String>,
    keygen_failure: Option<String>,
    state: RefCell<FakeState>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `ssh -G` run fails with exit 255 and this stderr.
    pub fn with_invalid_config(mut self, stderr: &str) -> Self {
        self.invalid_config = Some(stderr.to_string());
        self
    }

    pub fn with_keygen_failure(mut self, stderr: &str) -> Self {
        self.keygen_failure = Some(stderr.to_string());
        self
    }

    /// Run with an agent already holding `fingerprints`.
    pub fn with_agent(self, fingerprints: &[&str]) -> Self {
        self.state.borrow_mut().agent = Some(fingerprints.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Fingerprint the fake `ssh-keygen -l` reports for `key`.
    pub fn fingerprint_for(key: &Path) -> String {
        let name = key.file_name().and_then(|n| n.to_str()).unwrap_or("key");
        format!("SHA256:fake-{}", name)
    }

    pub fn resolve_calls(&self) -> usize {
        self.state.borrow().resolve_calls
    }

    pub fn keygen_calls(&self) -> Vec<RecordedKeygen> {
        self.state.borrow().keygen_calls.clone()
    }

    pub fn added_keys(&self) -> Vec<PathBuf> {
        self.state.borrow().added.clone()
    }
}

fn output(status: i32, stdout: &str, stderr: &str) -> ToolOutput {
    ToolOutput {
        status: Some(status),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

impl SshTools for FakeTools {
    fn resolve_config(&self, _config: &Path) -> Result<ToolOutput> {
        self.state.borrow_mut().resolve_calls += 1;
        Ok(match &self.invalid_config {
            Some(stderr) => output(255, "", stderr),
            None => output(0, "user test\nhostname example.invalid\n", ""),
        })
    }

    fn generate_key(&self, request: &KeygenRequest<'_>) -> Result<ToolOutput> {
        self.state.borrow_mut().keygen_calls.push(RecordedKeygen {
            key_type: request.key_type,
            bits: request.bits,
            path: request.path.to_path_buf(),
        });
        if let Some(stderr) = &self.keygen_failure {
            return Ok(output(1, "", stderr));
        }

        // ssh-keygen leaves the public half world-readable.
        let public = public_key_path(request.path);
        fs::write(request.path, format!("FAKE {} PRIVATE KEY\n", request.key_type)).unwrap();
        fs::write(&public, format!("ssh-{} AAAAfake test\n", request.key_type)).unwrap();
        for file in [request.path, public.as_path()] {
            fs::set_permissions(file, fs::Permissions::from_mode(0o644)).unwrap();
        }
        Ok(output(0, "", ""))
    }

    fn fingerprint(&self, key: &Path) -> Result<ToolOutput> {
        if !key.is_file() {
            return Ok(output(1, "", &format!("{} is not a key file.\n", key.display())));
        }
        Ok(output(
            0,
            &format!("256 {} test (ED25519)\n", Self::fingerprint_for(key)),
            "",
        ))
    }

    fn agent_available(&self) -> bool {
        self.state.borrow().agent.is_some()
    }

    fn agent_list(&self) -> Result<ToolOutput> {
        let state = self.state.borrow();
        Ok(match &state.agent {
            None => output(2, "", "Could not open a connection to your authentication agent.\n"),
            Some(loaded) if loaded.is_empty() => output(1, "The agent has no identities.\n", ""),
            Some(loaded) => {
                let listing: String = loaded
                    .iter()
                    .map(|fp| format!("256 {} test (ED25519)\n", fp))
                    .collect();
                output(0, &listing, "")
            }
        })
    }

    fn agent_add(&self, key: &Path) -> Result<ToolOutput> {
        let mut state = self.state.borrow_mut();
        state.added.push(key.to_path_buf());
        if let Some(loaded) = state.agent.as_mut() {
            loaded.push(Self::fingerprint_for(key));
        }
        Ok(output(0, "", &format!("Identity added: {}\n", key.display())))
    }
}

/// [`Prompter`] answering from a fixed script, in order.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<std::collections::VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|s| s.to_string()).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Messages shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    fn next(&self, message: &str) -> anyhow::Result<String> {
        self.asked.borrow_mut().push(message.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted answer for {:?}", message))
    }
}

impl Prompter for ScriptedPrompter {
    fn text(&self, message: &str) -> anyhow::Result<String> {
        self.next(message)
    }

    fn new_password(&self, message: &str) -> anyhow::Result<String> {
        self.next(message)
    }

    /// Scripted answer is the option text to pick.
    fn select(&self, message: &str, options: &[String]) -> anyhow::Result<usize> {
        let answer = self.next(message)?;
        options
            .iter()
            .position(|o| *o == answer)
            .ok_or_else(|| anyhow::anyhow!("{:?} is not one of {:?}", answer, options))
    }
}
