//! Key pair provisioning for profiles.
//!
//! Generation is delegated to `ssh-keygen`; this module decides the file
//! names, skips work when the key is already there and hardens the result.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::permissions::{PermissionError, harden};
use crate::tools::{KeygenRequest, SshTools};

/// Bits used for every algorithm with a variable key size when none is given.
pub const DEFAULT_KEY_BITS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Rsa,
    Ed25519,
    Ecdsa,
    Dsa,
}

impl KeyType {
    pub fn all() -> [KeyType; 4] {
        [KeyType::Ed25519, KeyType::Rsa, KeyType::Ecdsa, KeyType::Dsa]
    }

    /// Name as `ssh-keygen -t` expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "rsa",
            KeyType::Ed25519 => "ed25519",
            KeyType::Ecdsa => "ecdsa",
            KeyType::Dsa => "dsa",
        }
    }

    /// `id_<type>`, the OpenSSH default file name.
    pub fn default_file_name(&self) -> String {
        format!("id_{}", self.as_str())
    }

    /// Ed25519 keys have a fixed size; `-b` would be ignored.
    pub fn has_fixed_size(&self) -> bool {
        matches!(self, KeyType::Ed25519)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rsa" => Ok(KeyType::Rsa),
            "ed25519" => Ok(KeyType::Ed25519),
            "ecdsa" => Ok(KeyType::Ecdsa),
            "dsa" => Ok(KeyType::Dsa),
            _ => Err(format!(
                "unknown key type '{}' (expected rsa, ed25519, ecdsa or dsa)",
                s
            )),
        }
    }
}

/// What to generate. The passphrase is only ever handed to `ssh-keygen`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub key_type: KeyType,
    pub bits: Option<u32>,
    pub passphrase: Option<String>,
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySpec")
            .field("key_type", &self.key_type)
            .field("bits", &self.bits)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl KeySpec {
    pub fn new(key_type: KeyType) -> Self {
        Self {
            key_type,
            bits: None,
            passphrase: None,
        }
    }

    /// Size passed to `-b`, or `None` for fixed-size algorithms.
    pub fn effective_bits(&self) -> Option<u32> {
        if self.key_type.has_fixed_size() {
            None
        } else {
            Some(self.bits.unwrap_or(DEFAULT_KEY_BITS))
        }
    }
}

#[derive(Debug)]
pub enum KeyOutcome {
    /// A key was already present at the target; nothing was run.
    AlreadyExists(PathBuf),
    /// `ssh-keygen` created the pair. `warnings` holds hardening failures.
    Generated {
        path: PathBuf,
        warnings: Vec<PermissionError>,
    },
}

impl KeyOutcome {
    pub fn path(&self) -> &Path {
        match self {
            KeyOutcome::AlreadyExists(path) => path,
            KeyOutcome::Generated { path, .. } => path,
        }
    }
}

/// Path of the public half of `private`.
pub fn public_key_path(private: &Path) -> PathBuf {
    let mut name = private.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

/// Generate `<dir>/<base_name>` unless it already exists.
pub fn generate_key(
    tools: &dyn SshTools,
    dir: &Path,
    base_name: &str,
    spec: &KeySpec,
) -> Result<KeyOutcome> {
    let path = dir.join(base_name);
    if path.exists() {
        tracing::debug!(path = %path.display(), "key already present, skipping generation");
        return Ok(KeyOutcome::AlreadyExists(path));
    }

    let request = KeygenRequest {
        key_type: spec.key_type,
        bits: spec.effective_bits(),
        path: &path,
        passphrase: spec.passphrase.as_deref().unwrap_or(""),
    };
    let output = tools.generate_key(&request)?;

    if !output.success() {
        let detail = output.first_message();
        return Err(Error::KeyGeneration(if detail.is_empty() {
            format!("ssh-keygen exited with status {:?}", output.status)
        } else {
            detail
        }));
    }
    if !path.exists() {
        return Err(Error::KeyGeneration(format!(
            "ssh-keygen reported success but {} was not created",
            path.display()
        )));
    }

    let mut warnings = Vec::new();
    for file in [path.clone(), public_key_path(&path)] {
        if !file.exists() {
            continue;
        }
        if let Err(e) = harden(&file) {
            tracing::warn!(error = %e, "could not harden generated key");
            warnings.push(e);
        }
    }

    Ok(KeyOutcome::Generated { path, warnings })
}

#[derive(Debug)]
pub struct ImportedKey {
    pub path: PathBuf,
    pub public_copied: bool,
    /// Hardening failures for either half of the pair.
    pub warnings: Vec<PermissionError>,
}

/// Copy an existing private key (and its `.pub`, if any) into `profile_dir`.
pub fn import_key(profile_dir: &Path, source: &Path) -> Result<ImportedKey> {
    if !source.is_file() {
        return Err(Error::KeyNotFound(source.to_path_buf()));
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::KeyNotFound(source.to_path_buf()))?;

    let target = profile_dir.join(file_name);
    fs::copy(source, &target).map_err(|e| {
        Error::io(
            format!("Failed to copy {} to {}", source.display(), target.display()),
            e,
        )
    })?;

    let mut warnings: Vec<PermissionError> = harden(&target).err().into_iter().collect();

    let source_pub = public_key_path(source);
    let public_copied = if source_pub.is_file() {
        let target_pub = public_key_path(&target);
        fs::copy(&source_pub, &target_pub).map_err(|e| {
            Error::io(format!("Failed to copy {}", source_pub.display()), e)
        })?;
        warnings.extend(harden(&target_pub).err());
        true
    } else {
        false
    };

    Ok(ImportedKey {
        path: target,
        public_copied,
        warnings,
    })
}
