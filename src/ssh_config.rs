//! The small slice of ssh_config(5) sshprof reads and writes.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::paths::expand_tilde;

/// Body written for a freshly built profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub known_hosts: PathBuf,
}

impl ProfileConfig {
    pub fn render(&self) -> String {
        let mut out = String::from("Host *\n");
        if let Some(user) = &self.user {
            let _ = writeln!(out, "    User {}", user);
        }
        if let Some(identity) = &self.identity_file {
            let _ = writeln!(out, "    IdentityFile {}", quote(identity));
        }
        let _ = writeln!(out, "    UserKnownHostsFile {}", quote(&self.known_hosts));
        out
    }
}

fn quote(path: &Path) -> String {
    let s = path.display().to_string();
    if s.contains(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s
    }
}

/// First `IdentityFile` directive in `config`, with `~` expanded against `home`.
///
/// Keywords are case-insensitive and may be separated from the value by
/// whitespace or `=`. Comments and blank lines are skipped.
pub fn parse_identity_file(config: &str, home: &Path) -> Option<PathBuf> {
    config.lines().find_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (keyword, rest) = split_keyword(line)?;
        if !keyword.eq_ignore_ascii_case("IdentityFile") {
            return None;
        }
        let value = unquote(rest.trim());
        if value.is_empty() {
            return None;
        }
        Some(expand_tilde(value, home))
    })
}

fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest);
    Some((keyword, rest))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
