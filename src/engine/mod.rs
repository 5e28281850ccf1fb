//! Engine Module
//!
//! The embedded storage engine behind every database.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Read scopes and serialized write scopes (transactions)
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery, the directory lock and read-only opens
//! - Full backups, backup loading and space reclamation

mod backup;
mod lock;
mod txn;

use std::collections::BTreeMap;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::error::{Result, VaultError};
use crate::memtable::{Entry, MemTable};
use crate::storage::{CompactionStats, StorageManager};
use crate::wal::{Operation, WalEntry, WalRecovery, WalWriter};

pub use backup::{BackupSummary, BACKUP_MAGIC};
pub use lock::{DirLock, LOCK_FILENAME};
pub use txn::{ReadTxn, WriteTxn};

/// Size and shape of an open engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub sstable_count: usize,
    pub sstable_bytes: u64,
    pub wal_bytes: u64,
    pub memtable_bytes: usize,
    pub memtable_entries: usize,
    pub read_only: bool,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Write scopes** (`update`): serialized by `write_lock` for their whole
///   duration, so a read-then-write inside one scope is atomic. Their
///   buffered writes are applied under `commit_lock` (exclusive):
///   WAL first, then MemTable, then a flush if the MemTable is full.
///
/// - **Read scopes** (`view`): hold `commit_lock` shared, so they run
///   concurrently with each other and never observe a half-applied commit.
pub struct Engine {
    config: StoreConfig,

    /// Directory for SSTables
    storage_dir: PathBuf,

    /// Write-ahead log; `None` when opened read-only
    wal: Option<Mutex<WalWriter>>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write scopes, flushes and compaction
    write_lock: Mutex<()>,

    /// Shared by read scopes, exclusive while a commit is applied
    commit_lock: RwLock<()>,

    /// Directory lock; released on close
    dir_lock: Mutex<Option<DirLock>>,

    closed: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create data directory and take the directory lock
    /// 2. Load existing SSTables
    /// 3. Recover from WAL if it exists and flush the recovered entries
    /// 4. Ready to serve requests
    ///
    /// Read-only configs skip the lock and never write to disk.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.read_only {
            return Self::open_read_only(config);
        }

        fs::create_dir_all(&config.data_dir)?;
        let dir_lock = DirLock::acquire(&config.data_dir, config.bypass_lock_guard)?;

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let storage = StorageManager::open(&storage_dir, false)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery in {}: {} entries recovered, {} corrupted, last_lsn={}",
                    config.data_dir.display(),
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }
            Self::replay(&memtable, entries);
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        // Make recovered data durable in an SSTable before dropping the log
        if !memtable.is_empty() {
            tracing::debug!("Flushing {} recovered entries", memtable.entry_count());
            storage.flush(&memtable)?;
            memtable.clear();
            wal.truncate()?;
        }

        Ok(Self {
            config,
            storage_dir,
            wal: Some(Mutex::new(wal)),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            commit_lock: RwLock::new(()),
            dir_lock: Mutex::new(Some(dir_lock)),
            closed: AtomicBool::new(false),
        })
    }

    fn open_read_only(config: StoreConfig) -> Result<Self> {
        if !config.data_dir.is_dir() {
            return Err(VaultError::Storage(format!(
                "{} does not exist, cannot open read-only",
                config.data_dir.display()
            )));
        }

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let storage = StorageManager::open(&storage_dir, true)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, _) = WalRecovery::replay(&wal_path)?;
            Self::replay(&memtable, entries);
        }

        Ok(Self {
            config,
            storage_dir,
            wal: None,
            memtable,
            storage,
            write_lock: Mutex::new(()),
            commit_lock: RwLock::new(()),
            dir_lock: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    fn replay(memtable: &MemTable, entries: Vec<WalEntry>) {
        for entry in entries {
            match entry.operation {
                Operation::Put { key, value } => {
                    memtable.put(key, value);
                }
                Operation::Delete { key } => {
                    memtable.delete(key);
                }
            }
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run a read scope
    pub fn view<T>(&self, f: impl FnOnce(&ReadTxn<'_>) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let _guard = self.commit_lock.read();
        f(&ReadTxn::new(self))
    }

    /// Run a write scope
    ///
    /// The scope is exclusive per engine. Its writes are committed only if
    /// the closure returns `Ok`; an error discards them.
    pub fn update<T>(&self, f: impl FnOnce(&mut WriteTxn<'_>) -> Result<T>) -> Result<T> {
        if self.wal.is_none() {
            return Err(VaultError::ReadOnly);
        }

        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        let mut txn = WriteTxn::new(self);
        let out = f(&mut txn)?;
        self.commit(txn.into_writes())?;
        Ok(out)
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.view(|txn| txn.get(key))
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.update(|txn| {
            txn.set(key, value);
            Ok(())
        })
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.update(|txn| {
            txn.delete(key);
            Ok(())
        })
    }

    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    fn read_entry(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = match self.memtable.get(key) {
            Some(entry) => Some(entry),
            None => self.storage.get(key)?,
        };

        Ok(match entry {
            Some(Entry::Value(value)) => Some(value),
            Some(Entry::Tombstone) | None => None,
        })
    }

    /// Visit live entries whose key starts with `prefix`, ascending
    ///
    /// Candidate keys are gathered from every source first (newest source
    /// wins); values are only read for the entries actually visited. The
    /// visitor returns `ControlFlow::Break` to stop early.
    fn visit_prefix(
        &self,
        prefix: &[u8],
        mut visit: impl FnMut(Vec<u8>, Vec<u8>) -> ControlFlow<()>,
    ) -> Result<()> {
        enum Source {
            Mem(Entry),
            Table(usize),
        }

        let tables = self.storage.tables();
        let mut candidates: BTreeMap<Vec<u8>, Source> = BTreeMap::new();

        for (key, entry) in self.memtable.scan_prefix(prefix) {
            candidates.insert(key, Source::Mem(entry));
        }
        for (i, table) in tables.iter().enumerate() {
            for key in table.keys_with_prefix(prefix) {
                if !candidates.contains_key(key) {
                    candidates.insert(key.to_vec(), Source::Table(i));
                }
            }
        }

        for (key, source) in candidates {
            let entry = match source {
                Source::Mem(entry) => Some(entry),
                Source::Table(i) => tables[i].get(&key)?,
            };
            if let Some(Entry::Value(value)) = entry {
                if visit(key, value).is_break() {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Apply a write scope's buffered writes
    fn commit(&self, writes: BTreeMap<Vec<u8>, Entry>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let wal = self.wal.as_ref().ok_or(VaultError::ReadOnly)?;

        let _commit_guard = self.commit_lock.write();

        let operations = writes
            .iter()
            .map(|(key, entry)| match entry {
                Entry::Value(value) => Operation::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                Entry::Tombstone => Operation::Delete { key: key.clone() },
            })
            .collect();
        wal.lock().append_batch(operations)?;

        let mut size = self.memtable.size();
        for (key, entry) in writes {
            size = match entry {
                Entry::Value(value) => self.memtable.put(key, value),
                Entry::Tombstone => self.memtable.delete(key),
            };
        }

        // The writes are already durable in the WAL; a failed flush leaves
        // them in the memtable and is retried by the next commit or close.
        if size >= self.config.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(
                    "Flush after commit failed in {}: {}",
                    self.config.data_dir.display(),
                    e
                );
            }
        }

        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        if self.wal.is_none() {
            return Err(VaultError::ReadOnly);
        }
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;
        let _commit_guard = self.commit_lock.write();
        self.flush_internal()
    }

    /// Internal flush implementation (write and commit locks held)
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        // Entries are now durable in the SSTable
        if let Some(wal) = &self.wal {
            wal.lock().truncate()?;
        }

        Ok(())
    }

    /// Reclaim space held by stale entries
    ///
    /// Tables where at least `discard_ratio` of the entries are shadowed or
    /// deleted trigger a merge of all tables. Finding nothing to reclaim is
    /// not an error.
    pub fn reclaim_space(&self, discard_ratio: f64) -> Result<CompactionStats> {
        if self.wal.is_none() {
            return Err(VaultError::ReadOnly);
        }
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;
        self.storage.compact(discard_ratio)
    }

    /// Close the engine gracefully
    ///
    /// Flushes pending data, syncs the WAL, optionally merges tables and
    /// releases the directory lock. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(wal) = &self.wal {
            let _write_guard = self.write_lock.lock();
            {
                let _commit_guard = self.commit_lock.write();
                self.flush_internal()?;
            }
            wal.lock().sync()?;

            if self.config.compact_on_close && self.storage.sstable_count() > 1 {
                self.storage.merge_all()?;
            }
        }

        self.dir_lock.lock().take();
        tracing::debug!("Closed engine at {}", self.config.data_dir.display());
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VaultError::Closed);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.wal.is_none()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Size and shape of the engine
    pub fn stats(&self) -> Result<EngineStats> {
        let wal_bytes = match &self.wal {
            Some(wal) => wal.lock().file_size()?,
            None => fs::metadata(self.config.data_dir.join(Self::WAL_FILENAME))
                .map(|m| m.len())
                .unwrap_or(0),
        };

        Ok(EngineStats {
            sstable_count: self.storage.sstable_count(),
            sstable_bytes: self.storage.total_size(),
            wal_bytes,
            memtable_bytes: self.memtable.size(),
            memtable_entries: self.memtable.entry_count(),
            read_only: self.is_read_only(),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(
                "Failed to close engine at {}: {}",
                self.config.data_dir.display(),
                e
            );
        }
    }
}
