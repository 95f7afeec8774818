//! End-to-end flows against stub `ssh`, `ssh-keygen` and `ssh-add` scripts.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use sshprof::builder::{KeySource, NewProfile, build_profile};
use sshprof::error::Error;
use sshprof::exit_codes;
use sshprof::keys::{KeySpec, KeyType};
use sshprof::paths::Paths;
use sshprof::permissions::mode_of;
use sshprof::profiles::remove_profile;
use sshprof::state;
use sshprof::switch::{SwitchError, SwitchStage, switch_to_profile};
use sshprof::tools::{SystemTools, ToolConfig};
use tempfile::TempDir;

/// Rejects any config that misspells `Host` as `Hots`, like the real client.
const STUB_SSH: &str = r#"#!/bin/sh
config=""
while [ $# -gt 0 ]; do
  case "$1" in
    -F) shift; config="$1" ;;
  esac
  shift
done
if grep -q '^Hots' "$config"; then
  echo "$config: line 1: Bad configuration option: hots" >&2
  echo "error: $config: terminating, 1 bad configuration options" >&2
  exit 255
fi
echo "user stub"
exit 0
"#;

const STUB_SSH_KEYGEN: &str = r#"#!/bin/sh
out=""
list=0
while [ $# -gt 0 ]; do
  case "$1" in
    -l) list=1 ;;
    -f) shift; out="$1" ;;
  esac
  shift
done
if [ "$list" = 1 ]; then
  echo "256 SHA256:stubfingerprint stub (ED25519)"
  exit 0
fi
echo "STUB PRIVATE KEY" > "$out"
echo "ssh-ed25519 AAAAstub stub" > "$out.pub"
chmod 644 "$out" "$out.pub"
"#;

const STUB_SSH_ADD: &str = r#"#!/bin/sh
if [ "$1" = "-l" ]; then
  echo "The agent has no identities."
  exit 1
fi
echo "Identity added: $1" >&2
"#;

struct Sandbox {
    _temp: TempDir,
    home: PathBuf,
    bin: PathBuf,
    paths: Paths,
}

impl Sandbox {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let bin = temp.path().join("bin");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&bin).unwrap();
        for (name, body) in [
            ("ssh", STUB_SSH),
            ("ssh-keygen", STUB_SSH_KEYGEN),
            ("ssh-add", STUB_SSH_ADD),
        ] {
            let path = bin.join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let paths = Paths::from_roots(home.clone(), home.join(".ssh-profiles"), home.join(".ssh"));
        Self {
            _temp: temp,
            home,
            bin,
            paths,
        }
    }

    fn tool(&self, name: &str) -> String {
        self.bin.join(name).display().to_string()
    }

    fn tools(&self) -> SystemTools {
        SystemTools::new(ToolConfig {
            ssh: self.tool("ssh"),
            ssh_keygen: self.tool("ssh-keygen"),
            ssh_add: self.tool("ssh-add"),
        })
    }

    /// Run the binary with every path pointed into the sandbox.
    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_sshprof"))
            .args(args)
            .env("HOME", &self.home)
            .env("SSHPROF_HOME", &self.paths.base_dir)
            .env("SSHPROF_SSH_DIR", &self.paths.ssh_dir)
            .env("SSHPROF_SSH", self.tool("ssh"))
            .env("SSHPROF_SSH_KEYGEN", self.tool("ssh-keygen"))
            .env("SSHPROF_SSH_ADD", self.tool("ssh-add"))
            .env("NO_COLOR", "1")
            .env_remove("SSH_AUTH_SOCK")
            .output()
            .unwrap()
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn create_switch_and_delete() {
    let sandbox = Sandbox::new();
    let paths = &sandbox.paths;
    let tools = sandbox.tools();

    let work = build_profile(
        paths,
        &tools,
        "work",
        &NewProfile {
            user: Some("alice".into()),
            key: KeySource::Generate(KeySpec::new(KeyType::Ed25519)),
        },
    )
    .unwrap();
    let key = paths.profile_dir("work").join("id_ed25519");
    assert_eq!(work.identity_file.as_deref(), Some(key.as_path()));
    assert_eq!(mode_of(&key), Some(0o600));
    assert_eq!(mode_of(&paths.base_dir), Some(0o700));

    build_profile(
        paths,
        &tools,
        "home",
        &NewProfile {
            user: Some("bob".into()),
            key: KeySource::None,
        },
    )
    .unwrap();

    let report = switch_to_profile(paths, &tools, "work").unwrap();
    assert_eq!(report.completed.last(), Some(&SwitchStage::LoadKey));
    assert_eq!(read(&paths.ssh_config), read(&paths.profile_config("work")));
    assert!(read(&paths.ssh_config).contains("User alice"));
    assert_eq!(state::read_current(paths).unwrap().as_deref(), Some("work"));

    // A host learned while "work" is active belongs to "work".
    fs::write(&paths.known_hosts, "git.work.example ssh-ed25519 AAAA\n").unwrap();

    let report = switch_to_profile(paths, &tools, "home").unwrap();
    assert_eq!(report.previous.as_deref(), Some("work"));
    assert!(report.agent.is_none());
    assert_eq!(
        read(&paths.profile_known_hosts("work")),
        "git.work.example ssh-ed25519 AAAA\n"
    );
    assert_eq!(read(&paths.known_hosts), "");
    assert!(read(&paths.ssh_config).contains("User bob"));

    let outcome = remove_profile(paths, "home").unwrap();
    assert!(outcome.was_active);
    assert_eq!(state::read_current(paths).unwrap(), None);
    assert!(read(&paths.ssh_config).contains("User bob"));
    assert!(paths.profile_dir("work").is_dir());
}

#[test]
fn invalid_profile_never_touches_global_state() {
    let sandbox = Sandbox::new();
    let paths = &sandbox.paths;
    let tools = sandbox.tools();

    for name in ["good", "broken"] {
        build_profile(
            paths,
            &tools,
            name,
            &NewProfile {
                user: None,
                key: KeySource::None,
            },
        )
        .unwrap();
    }
    switch_to_profile(paths, &tools, "good").unwrap();
    fs::write(paths.profile_config("broken"), "Hots *\n    User x\n").unwrap();

    let before = (read(&paths.ssh_config), read(&paths.known_hosts));
    let err = switch_to_profile(paths, &tools, "broken").unwrap_err();

    assert_eq!(err.stage(), SwitchStage::Validate);
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    match err {
        SwitchError::InvalidConfig {
            source: Error::InvalidConfig { diagnostics, .. },
            ..
        } => {
            assert_eq!(diagnostics.len(), 1);
            assert!(diagnostics[0].contains("terminating"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!((read(&paths.ssh_config), read(&paths.known_hosts)), before);
    assert_eq!(state::read_current(paths).unwrap().as_deref(), Some("good"));
}

#[test]
fn cli_exit_codes() {
    let sandbox = Sandbox::new();

    assert_eq!(sandbox.run(&["--help"]).status.code(), Some(exit_codes::SUCCESS));
    assert_eq!(sandbox.run(&["frobnicate"]).status.code(), Some(exit_codes::USER_ERROR));
    assert_eq!(sandbox.run(&["switch"]).status.code(), Some(exit_codes::USER_ERROR));
    assert_eq!(sandbox.run(&["sw", "missing"]).status.code(), Some(exit_codes::USER_ERROR));
    assert_eq!(sandbox.run(&["ls"]).status.code(), Some(exit_codes::SUCCESS));

    let add = sandbox.run(&["add", "work", "-u", "alice", "-t", "ed25519"]);
    assert_eq!(add.status.code(), Some(exit_codes::SUCCESS));
    assert!(sandbox.paths.profile_dir("work").join("id_ed25519").exists());
    assert_eq!(
        sandbox.run(&["add", "work", "-u", "alice"]).status.code(),
        Some(exit_codes::USER_ERROR)
    );
    assert_eq!(
        sandbox.run(&["add", "9", "-u", "alice"]).status.code(),
        Some(exit_codes::USER_ERROR)
    );

    let switched = sandbox.run(&["sw", "work"]);
    assert_eq!(switched.status.code(), Some(exit_codes::SUCCESS));
    assert_eq!(
        read(&sandbox.paths.pointer_file),
        "work\n"
    );

    let listed = sandbox.run(&["list"]);
    assert!(String::from_utf8_lossy(&listed.stdout).contains("work"));
}

#[test]
fn cli_apply_failure_exits_two() {
    let sandbox = Sandbox::new();
    assert_eq!(
        sandbox.run(&["add", "work", "-u", "alice"]).status.code(),
        Some(exit_codes::SUCCESS)
    );

    // ~/.ssh exists as a plain file, so the config cannot be written.
    fs::write(&sandbox.paths.ssh_dir, "not a directory").unwrap();

    let out = sandbox.run(&["switch", "work"]);
    assert_eq!(out.status.code(), Some(exit_codes::APPLY_FAILURE));
    assert!(!sandbox.paths.pointer_file.exists());
}

#[test]
fn cli_rejects_names_that_escape_the_store() {
    let sandbox = Sandbox::new();
    assert_eq!(
        sandbox.run(&["add", "work", "-u", "alice"]).status.code(),
        Some(exit_codes::SUCCESS)
    );
    fs::write(sandbox.home.join("notes.txt"), "keep").unwrap();

    for args in [
        ["delete", ".."],
        ["rm", "."],
        ["switch", ".."],
        ["sw", "a/b"],
        ["edit", ".."],
    ] {
        let out = sandbox.run(&args);
        assert_eq!(out.status.code(), Some(exit_codes::USER_ERROR), "{args:?}");
        assert!(String::from_utf8_lossy(&out.stderr).contains("Invalid profile name"));
    }

    assert_eq!(read(&sandbox.home.join("notes.txt")), "keep");
    assert!(sandbox.paths.profile_dir("work").is_dir());
    assert!(!sandbox.paths.pointer_file.exists());
    assert!(!sandbox.paths.ssh_config.exists());
}
