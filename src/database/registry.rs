//! Database registry
//!
//! Maps database names to open handles. Lookups of existing handles share a
//! read lock; creation and closing take the write lock, so at most one
//! handle per name is ever live.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::EngineStats;
use crate::error::{Result, VaultError};

use super::Database;

/// Owner of every open database
pub struct Registry {
    /// Directory holding one sub-directory per database
    root: PathBuf,

    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Registry {
    /// Create a registry rooted at `root`, creating the directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            databases: RwLock::new(HashMap::new()),
        })
    }

    /// Return the open handle for `name`, opening it on first use
    ///
    /// The open runs under the write lock, re-checking the map first so two
    /// racing callers end up with the same handle. A failed open leaves the
    /// map untouched.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Database>> {
        validate_name(name)?;

        if let Some(db) = self.databases.read().get(name) {
            return Ok(Arc::clone(db));
        }

        let mut databases = self.databases.write();
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }

        let path = self.database_path(name);
        let db = Arc::new(Database::open(name, &path)?);
        tracing::info!(
            "Opened database {} at {} ({})",
            name,
            path.display(),
            db.opened_with()
        );
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Open handle for `name`, if any
    pub fn get(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.read().get(name).cloned()
    }

    /// Close and forget `name`; closing an unknown name is a no-op
    ///
    /// The engine is closed before the write lock is released, so a
    /// concurrent reopen never sees the old `LOCK` file.
    pub fn close(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.write();
        match databases.remove(name) {
            Some(db) => {
                tracing::info!("Closing database {}", name);
                db.close()
            }
            None => Ok(()),
        }
    }

    /// Close every open database; returns how many were closed cleanly
    pub fn close_all(&self) -> usize {
        let mut databases = self.databases.write();

        let mut closed = 0;
        for (name, db) in databases.drain() {
            match db.close() {
                Ok(()) => closed += 1,
                Err(e) => tracing::error!("Failed to close database {}: {}", name, e),
            }
        }
        tracing::info!("Closed {} databases", closed);
        closed
    }

    /// Names of the open databases, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Size statistics of an open database
    pub fn stats(&self, name: &str) -> Result<EngineStats> {
        match self.get(name) {
            Some(db) => db.stats(),
            None => Err(VaultError::Storage(format!("database {} is not open", name))),
        }
    }

    /// Directory used for `name`
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Root directory of all databases
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if !self.databases.get_mut().is_empty() {
            self.close_all();
        }
    }
}

/// Check that `name` maps to a single directory under the registry root
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::EmptyDatabaseName);
    }

    let bad = name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control());

    if bad {
        return Err(VaultError::InvalidDatabaseName(name.to_string()));
    }
    Ok(())
}
