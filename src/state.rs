//! Active profile pointer and the switch lock.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::paths::Paths;

/// How long a switch waits for another sshprof process to finish.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL: Duration = Duration::from_millis(100);

/// Read the active profile pointer, `None` if unset
pub fn read_current(paths: &Paths) -> Result<Option<String>> {
    match fs::read_to_string(&paths.pointer_file) {
        Ok(content) => {
            let name = content.trim();
            Ok((!name.is_empty()).then(|| name.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(
            format!("Failed to read pointer file: {}", paths.pointer_file.display()),
            e,
        )),
    }
}

/// Pointer value, but only if that profile still exists.
///
/// A dangling pointer is shown as "no active profile" and left as is.
pub fn active_profile(paths: &Paths) -> Option<String> {
    read_current(paths)
        .ok()
        .flatten()
        .filter(|name| crate::profiles::profile_exists(paths, name))
}

/// Overwrite the pointer atomically: write to temp file, then rename.
pub fn write_current(paths: &Paths, name: &str) -> Result<()> {
    let path = &paths.pointer_file;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::io(format!("Failed to create store directory: {}", parent.display()), e)
        })?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, format!("{}\n", name)).map_err(|e| {
        Error::io(format!("Failed to write temp pointer file: {}", temp_path.display()), e)
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        Error::io(
            format!(
                "Failed to rename pointer file: {} -> {}",
                temp_path.display(),
                path.display()
            ),
            e,
        )
    })
}

/// Remove the pointer. Absent is fine.
pub fn clear_current(paths: &Paths) -> Result<()> {
    match fs::remove_file(&paths.pointer_file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(
            format!("Failed to remove pointer file: {}", paths.pointer_file.display()),
            e,
        )),
    }
}

/// Exclusive advisory lock held across the global-file part of a switch.
pub struct SwitchLock {
    file: File,
    path: PathBuf,
}

impl SwitchLock {
    /// Try to take the lock, polling until `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if Instant::now() < deadline && is_contended(&e) => thread::sleep(LOCK_POLL),
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(path = %path.display(), "switch lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for SwitchLock {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = self.file.unlock();
        tracing::debug!(path = %self.path.display(), "switch lock released");
    }
}
