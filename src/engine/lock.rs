//! Directory lock guard
//!
//! A `LOCK` file holding the owner's pid marks a data directory as in use.
//! It is created exclusively and removed when the guard is dropped; a file
//! left behind by a crashed process blocks later opens unless bypassed.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

/// Name of the lock file inside a data directory
pub const LOCK_FILENAME: &str = "LOCK";

/// Held for as long as an engine owns its directory
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    /// Take the lock for `dir`
    ///
    /// With `bypass` set, an existing lock file is taken over instead of
    /// failing the open.
    pub fn acquire(dir: &Path, bypass: bool) -> Result<Self> {
        let path = dir.join(LOCK_FILENAME);

        let file = if bypass {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
        } else {
            OpenOptions::new().create_new(true).write(true).open(&path)
        };

        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(VaultError::Locked(dir.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self { path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
