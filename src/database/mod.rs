//! Database Module
//!
//! A [`Database`] is the handle for one named, independently opened store.
//! It turns JSON record semantics into engine transactions:
//!
//! - every value is stored as a JSON array (a single logical value is a
//!   one-element array)
//! - insert refuses existing keys, update refuses missing keys, delete never fails
//! - prefix queries skip entries that do not decode
//!
//! The [`Registry`] owns every open handle.

mod recovery;
mod registry;

use std::fs::{self, File};
use std::ops::ControlFlow;
use std::path::Path;

use chrono::{DateTime, TimeZone};
use serde_json::Value;

use crate::engine::{BackupSummary, Engine, EngineStats};
use crate::error::{Result, VaultError};
use crate::storage::CompactionStats;

pub use recovery::{open_with_recovery, quarantine_path, OpenAttempt};
pub use registry::{validate_name, Registry};

/// Discard ratio used by [`Database::compress`]
pub const DISCARD_RATIO: f64 = 0.7;

/// One open database
pub struct Database {
    name: String,
    engine: Engine,
    opened_with: OpenAttempt,
}

impl Database {
    /// Open the store at `path` through the recovery sequence
    pub fn open(name: &str, path: &Path) -> Result<Self> {
        let (engine, opened_with) = open_with_recovery(path)?;
        Ok(Self {
            name: name.to_string(),
            engine,
            opened_with,
        })
    }

    /// Wrap an engine opened by the caller
    pub fn from_engine(name: &str, engine: Engine) -> Self {
        Self {
            name: name.to_string(),
            engine,
            opened_with: OpenAttempt::Normal,
        }
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Store `values` under a key that must not exist yet
    pub fn insert(&self, key: &str, values: &[Value]) -> Result<()> {
        let encoded = encode(values)?;
        self.engine.update(|txn| {
            if txn.contains(key.as_bytes())? {
                return Err(VaultError::KeyExists);
            }
            txn.set(key.as_bytes(), &encoded);
            Ok(())
        })
    }

    /// Decoded values stored under `key`
    pub fn get(&self, key: &str) -> Result<Vec<Value>> {
        let raw = self
            .engine
            .view(|txn| txn.get(key.as_bytes()))?
            .ok_or(VaultError::KeyNotFound)?;
        decode(&raw)
    }

    /// Replace the values of an existing key
    pub fn update(&self, key: &str, values: &[Value]) -> Result<()> {
        let encoded = encode(values)?;
        self.engine.update(|txn| {
            if !txn.contains(key.as_bytes())? {
                return Err(VaultError::KeyNotFound);
            }
            txn.set(key.as_bytes(), &encoded);
            Ok(())
        })
    }

    /// Remove `key`; removing a missing key succeeds
    pub fn delete(&self, key: &str) -> Result<()> {
        self.engine.delete(key.as_bytes())
    }

    /// Up to `limit` decoded entries whose key starts with `prefix`, ascending
    ///
    /// Entries that fail to decode are skipped and do not count toward `limit`.
    pub fn prefix_query(&self, prefix: &str, limit: usize) -> Result<Vec<(String, Vec<Value>)>> {
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }

        self.engine.view(|txn| {
            txn.visit_prefix(prefix.as_bytes(), |key, raw| {
                match decode(&raw) {
                    Ok(values) => out.push((String::from_utf8_lossy(&key).into_owned(), values)),
                    Err(e) => {
                        tracing::debug!(
                            "Skipping undecodable entry {:?} in {}: {}",
                            String::from_utf8_lossy(&key),
                            self.name,
                            e
                        );
                    }
                }
                if out.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
        })?;

        Ok(out)
    }

    // =========================================================================
    // Whole-Database Operations
    // =========================================================================

    /// Write a full snapshot to `target`, creating parent directories
    pub fn backup_to(&self, target: &Path) -> Result<BackupSummary> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(target)?;
        let summary = self.engine.backup(&file)?;
        file.sync_all()?;
        Ok(summary)
    }

    /// Apply the backup file at `source`, returning the number of entries loaded
    pub fn restore_from(&self, source: &Path) -> Result<u64> {
        let file = File::open(source)?;
        self.engine.load(file)
    }

    /// Reclaim space using [`DISCARD_RATIO`]
    pub fn compress(&self) -> Result<CompactionStats> {
        self.engine.reclaim_space(DISCARD_RATIO)
    }

    /// Flush and release the store
    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which recovery step opened this database
    pub fn opened_with(&self) -> OpenAttempt {
        self.opened_with
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.engine.stats()
    }
}

/// Backup file name for `database` at `at`: `<database>_<YYYY-MM-DD_HH_MM_SS>.bak`
pub fn backup_file_name<Tz>(database: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.bak", database, at.format("%Y-%m-%d_%H_%M_%S"))
}

fn encode(values: &[Value]) -> Result<Vec<u8>> {
    serde_json::to_vec(values).map_err(|e| VaultError::Serialization(e.to_string()))
}

fn decode(raw: &[u8]) -> Result<Vec<Value>> {
    serde_json::from_slice(raw).map_err(VaultError::Decode)
}
