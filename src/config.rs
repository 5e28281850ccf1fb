//! Configuration for VaultKV
//!
//! Two layers live here:
//! - [`StoreConfig`]: options for a single embedded engine instance
//! - [`ServerConfig`] / [`ConfigHandle`]: the service's JSON config file,
//!   held as a reloadable immutable snapshot

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

// =============================================================================
// Engine Configuration
// =============================================================================

/// Configuration for one engine instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables, lock file)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK             (owner pid, absent in read-only mode)
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Open Behaviour
    // -------------------------------------------------------------------------
    /// Take over a lock file left behind by an unclean shutdown
    pub bypass_lock_guard: bool,

    /// Open without taking the lock and without touching anything on disk
    pub read_only: bool,

    /// Merge all SSTables into one when the engine is closed
    pub compact_on_close: bool,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },

    /// Never fsync on the write path; only at flush and close
    Never,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./vaultkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 16 * 1024 * 1024, // 16 MB
            bypass_lock_guard: false,
            read_only: false,
            compact_on_close: false,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Ignore a stale lock file
    pub fn bypass_lock_guard(mut self, bypass: bool) -> Self {
        self.config.bypass_lock_guard = bypass;
        self
    }

    /// Open in read-only mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Merge SSTables on close
    pub fn compact_on_close(mut self, compact: bool) -> Self {
        self.config.compact_on_close = compact;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dbconfig.json";

/// Contents of the service config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shared secret every command must carry
    #[serde(default = "default_apikey")]
    pub apikey: String,

    /// Listening port, kept as a string in the file
    #[serde(default = "default_dbport")]
    pub dbport: String,

    /// Root for `databases/` and `backups/`; RESTORE paths resolve against it
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
}

fn default_apikey() -> String {
    "gorms".to_string()
}

fn default_dbport() -> String {
    "3308".to_string()
}

fn default_datadir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            apikey: default_apikey(),
            dbport: default_dbport(),
            datadir: default_datadir(),
        }
    }
}

impl ServerConfig {
    /// Read the config file, writing the defaults first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| VaultError::Config(e.to_string()))?;
            fs::write(path, json)?;
            tracing::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }

        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parsed listening port
    pub fn port(&self) -> Result<u16> {
        self.dbport
            .trim()
            .parse()
            .map_err(|_| VaultError::Config(format!("invalid dbport {:?}", self.dbport)))
    }

    /// Directory holding one sub-directory per database
    pub fn databases_dir(&self) -> PathBuf {
        self.datadir.join("databases")
    }

    /// Directory receiving backup files
    pub fn backups_dir(&self) -> PathBuf {
        self.datadir.join("backups")
    }
}

/// Reloadable snapshot of the service config
///
/// Readers take a cheap `Arc` clone of the current snapshot; `reload()`
/// re-reads the file and swaps the snapshot in one step.
pub struct ConfigHandle {
    /// Backing file, `None` for handles built from an in-memory config
    path: Option<PathBuf>,

    current: RwLock<Arc<ServerConfig>>,
}

impl ConfigHandle {
    /// Load (or create) the config file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = ServerConfig::load_or_create(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Wrap a config that has no backing file
    pub fn fixed(config: ServerConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the backing file; on failure the previous snapshot stays active
    ///
    /// `datadir` is fixed for the life of the handle; a changed value is
    /// logged and ignored.
    pub fn reload(&self) -> Result<Arc<ServerConfig>> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| VaultError::Config("config has no backing file".to_string()))?;

        let mut fresh = ServerConfig::load_or_create(path)?;

        let mut current = self.current.write();
        // Databases stay under the root chosen at startup
        if fresh.datadir != current.datadir {
            tracing::warn!(
                "Ignoring datadir change to {} on reload; keeping {} until restart",
                fresh.datadir.display(),
                current.datadir.display()
            );
            fresh.datadir = current.datadir.clone();
        }
        let fresh = Arc::new(fresh);
        *current = Arc::clone(&fresh);
        drop(current);

        tracing::info!("Reloaded config from {}", path.display());
        Ok(fresh)
    }
}
