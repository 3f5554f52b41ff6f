// src/activation/lock.rs

//! Exclusive session lock
//!
//! Renames against one package directory must never interleave, so every
//! state-changing session holds an advisory `flock` on a file next to the
//! manifest for its whole lifetime. The lock is released when dropped.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock without blocking
    ///
    /// Fails with [`Error::LockError`] when another session holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired session lock at {}", path.display());
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::LockError(format!(
                "another session holds {}",
                path.display()
            ))),
            Err(e) => Err(Error::LockError(format!(
                "failed to lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// True if some session currently holds the lock
    pub fn is_held(path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released session lock at {}", self.path.display());
    }
}
