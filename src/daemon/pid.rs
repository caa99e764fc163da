// PID file guard so only one supervisor manages the markers at a time

use crate::error::{Result, SupervisorError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Holds the supervisor PID file for the lifetime of the run
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a PID file manager for `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Claim the PID file for this process with exclusive-create semantics.
    ///
    /// Fails with `AlreadyRunning` when the file names a live process. A stale
    /// file left by a dead supervisor is removed and creation retried once.
    pub fn acquire(&self) -> Result<()> {
        match self.create_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.check_holder()?;
                self.remove_stale()?;
                self.create_exclusive().map_err(|e| {
                    if e.kind() == ErrorKind::AlreadyExists {
                        // Lost the race to another supervisor
                        match self.holder() {
                            Some(pid) => SupervisorError::AlreadyRunning(pid),
                            None => SupervisorError::PidFileError(
                                "PID file was recreated concurrently".to_string(),
                            ),
                        }
                    } else {
                        write_error(e)
                    }
                })?;
            }
            Err(e) => return Err(write_error(e)),
        }

        info!("Wrote PID file {}", self.path.display());
        Ok(())
    }

    /// Create the file only if it does not exist and record our PID in it
    fn create_exclusive(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        write!(file, "{}", std::process::id())
    }

    /// Error out if the existing file names a live process
    fn check_holder(&self) -> Result<()> {
        match self.holder() {
            Some(pid) if is_process_alive(pid) => Err(SupervisorError::AlreadyRunning(pid)),
            Some(pid) => {
                warn!("Replacing stale PID file {} (PID {})", self.path.display(), pid);
                Ok(())
            }
            None => {
                warn!("Replacing unreadable PID file {}", self.path.display());
                Ok(())
            }
        }
    }

    fn remove_stale(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SupervisorError::PidFileError(format!(
                "Failed to remove stale PID file: {}",
                e
            ))),
        }
    }

    /// Read the PID from the file
    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| SupervisorError::PidFileError(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| SupervisorError::PidFileError(format!("Invalid PID in file: {}", e)))
    }

    /// PID recorded in the file, if the file exists and is well formed
    fn holder(&self) -> Option<u32> {
        if !self.exists() {
            return None;
        }
        self.read().ok()
    }

    /// Check if the PID file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the file, but only while it still names this process
    pub fn release(&self) -> Result<()> {
        if self.holder() == Some(std::process::id()) {
            fs::remove_file(&self.path).map_err(|e| {
                SupervisorError::PidFileError(format!("Failed to remove PID file: {}", e))
            })?;
        }
        Ok(())
    }

    /// Get the path to the PID file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_error(e: std::io::Error) -> SupervisorError {
    SupervisorError::PidFileError(format!("Failed to write PID file: {}", e))
}

/// Check if a process with the given PID is alive
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    // Signal 0 checks existence without delivering anything
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_own_pid() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("poswatch.pid"));

        pid_file.acquire().unwrap();
        assert_eq!(pid_file.read().unwrap(), std::process::id());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poswatch.pid");

        let first = PidFile::with_path(&path);
        first.acquire().unwrap();

        let second = PidFile::with_path(&path);
        let result = second.acquire();
        assert!(matches!(
            result,
            Err(SupervisorError::AlreadyRunning(pid)) if pid == std::process::id()
        ));
        // The holder's file is left intact
        assert_eq!(first.read().unwrap(), std::process::id());
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("poswatch.pid"));

        pid_file.acquire().unwrap();
        assert!(pid_file.exists());

        pid_file.release().unwrap();
        assert!(!pid_file.exists());
    }

    #[test]
    fn test_acquire_replaces_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poswatch.pid");
        // PID far above any default pid_max
        fs::write(&path, "2147483000").unwrap();

        let pid_file = PidFile::with_path(&path);
        pid_file.acquire().unwrap();
        assert_eq!(pid_file.read().unwrap(), std::process::id());
    }

    #[test]
    fn test_acquire_replaces_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poswatch.pid");
        fs::write(&path, "not a pid").unwrap();

        PidFile::with_path(&path).acquire().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_acquire_refuses_live_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poswatch.pid");
        // PID 1 is always alive
        fs::write(&path, "1").unwrap();

        let result = PidFile::with_path(&path).acquire();
        assert!(matches!(result, Err(SupervisorError::AlreadyRunning(1))));
    }

    #[test]
    fn test_release_leaves_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poswatch.pid");
        fs::write(&path, "1").unwrap();

        PidFile::with_path(&path).release().unwrap();
        assert!(path.exists());
    }
}
