//! Single-run guard for scheduled invocations.

use crate::error::{SyncError, SyncResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LOCK_FILE: &str = "athlete-sync.lock";

/// Held for the duration of a run; the lock file is removed on drop.
///
/// The file holds the owning pid. A file left behind by a run that was
/// killed is taken over once that pid no longer names a live process.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        match Self::create(&path) {
            Err(SyncError::Locked(_)) if Self::holder_is_gone(&path) => {
                warn!("taking over stale run lock {}", path.display());
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SyncError::io(path, e)),
                }
                Self::create(&path)
            }
            other => other,
        }
    }

    pub fn in_dir(dir: &Path) -> SyncResult<Self> {
        Self::acquire(dir.join(LOCK_FILE))
    }

    fn create(path: &Path) -> SyncResult<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut f) => {
                writeln!(f, "{}", std::process::id()).map_err(|e| SyncError::io(path, e))?;
                debug!("acquired run lock {}", path.display());
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SyncError::Locked(path.to_path_buf()))
            }
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// True when the lock file names a pid that is not running. A file
    /// without a readable pid counts as held.
    fn holder_is_gone(path: &Path) -> bool {
        let Ok(text) = std::fs::read_to_string(path) else {
            return false;
        };
        match text.trim().parse::<u32>() {
            Ok(pid) => !process_alive(pid),
            Err(_) => false,
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without procfs there is no cheap liveness check; keep the lock.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("could not release run lock {}: {}", self.path.display(), e);
        }
    }
}
