//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Reclaim space by merging tables (compaction)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::{Result, VaultError};
use crate::memtable::{Entry, MemTable};

use super::{SSTable, SSTableBuilder, SSTableReader};

/// Outcome of a space reclamation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionStats {
    /// Tables before the pass
    pub tables_before: usize,
    /// Tables after the pass
    pub tables_after: usize,
    /// Highest discardable fraction found in any table
    pub max_discard_ratio: f64,
    /// Entries dropped (shadowed values and tombstones)
    pub entries_dropped: u64,
    /// Bytes on disk before and after
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Whether any file was rewritten
    pub rewritten: bool,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - Each reader guards its own file handle, so lookups only need the read lock
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - Flush and compaction must be serialized by the caller (engine write lock)
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<SSTableReader>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist (skipped when read-only)
    /// 2. Remove temporary files left by an interrupted flush (skipped when read-only)
    /// 3. Discover existing SSTable files and open a reader for each
    /// 4. Order by ID descending (newest first)
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        if !read_only {
            fs::create_dir_all(path)?;
        }

        let mut sstable_ids: Vec<u64> = Vec::new();

        if path.exists() {
            for entry in fs::read_dir(path)? {
                let file_path = entry?.path();
                if !file_path.is_file() {
                    continue;
                }

                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    sstable_ids.push(id);
                } else if !read_only && Self::is_temp_file(&file_path) {
                    tracing::warn!("Removing unfinished SSTable {}", file_path.display());
                    fs::remove_file(&file_path)?;
                }
            }
        }

        // Newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            sstables.push(SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?);
        }

        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Get an entry by key (searches all SSTables newest → oldest)
    ///
    /// Returns the newest entry found, which may be a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let sstables = self.sstables.read();

        for reader in sstables.iter() {
            if let Some(entry) = reader.get(key)? {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    /// Shared view of the open tables, newest first
    pub(crate) fn tables(&self) -> RwLockReadGuard<'_, Vec<SSTableReader>> {
        self.sstables.read()
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries,
    /// opens a reader for it, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(VaultError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        let mut builder = SSTableBuilder::new(&path)?;
        for (key, entry) in memtable.iter() {
            builder.add_entry(&key, &entry)?;
        }
        let metadata = builder.finish()?;

        let reader = SSTableReader::open(&path)?;
        self.sstables.write().insert(0, reader);

        tracing::debug!(
            "Flushed {} entries to {}",
            metadata.entry_count,
            path.display()
        );

        Ok(metadata)
    }

    /// Reclaim space if any table is at least `discard_ratio` stale
    ///
    /// An entry is discardable when a newer table holds the same key or when
    /// it is a tombstone. If some table reaches the ratio, every table is
    /// merged into a single one; otherwise nothing is rewritten.
    pub fn compact(&self, discard_ratio: f64) -> Result<CompactionStats> {
        let ratios = self.discard_ratios()?;
        let max_ratio = ratios.iter().cloned().fold(0.0_f64, f64::max);

        if ratios.is_empty() || max_ratio < discard_ratio {
            let count = ratios.len();
            let bytes = self.total_size();
            return Ok(CompactionStats {
                tables_before: count,
                tables_after: count,
                max_discard_ratio: max_ratio,
                bytes_before: bytes,
                bytes_after: bytes,
                ..Default::default()
            });
        }

        let mut stats = self.merge_all()?;
        stats.max_discard_ratio = max_ratio;
        Ok(stats)
    }

    /// Merge every table into one, dropping shadowed entries and tombstones
    pub fn merge_all(&self) -> Result<CompactionStats> {
        let bytes_before = self.total_size();

        // Oldest → newest so newer entries overwrite older ones
        let (merged, total_entries, old_paths) = {
            let sstables = self.sstables.read();
            let mut merged: BTreeMap<Vec<u8>, Entry> = BTreeMap::new();
            let mut total = 0u64;
            for reader in sstables.iter().rev() {
                for item in reader.iter()? {
                    let (key, entry) = item?;
                    merged.insert(key, entry);
                    total += 1;
                }
            }
            let paths: Vec<PathBuf> = sstables.iter().map(|r| r.path().to_path_buf()).collect();
            (merged, total, paths)
        };

        let tables_before = old_paths.len();
        let live: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter_map(|(k, e)| match e {
                Entry::Value(v) => Some((k, v)),
                Entry::Tombstone => None,
            })
            .collect();
        let live_count = live.len() as u64;

        let replacement = if live.is_empty() {
            None
        } else {
            let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
            let path = self.sstable_path(id);
            let mut builder = SSTableBuilder::new(&path)?;
            for (key, value) in &live {
                builder.add(key, value)?;
            }
            builder.finish()?;
            Some(SSTableReader::open(&path)?)
        };

        {
            let mut sstables = self.sstables.write();
            sstables.clear();
            sstables.extend(replacement);
        }

        // Oldest first: any table left behind by a crash here is still
        // shadowed by the newer tables that survive with it
        for path in old_paths.iter().rev() {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("Failed to remove compacted table {}: {}", path.display(), e);
            }
        }

        let stats = CompactionStats {
            tables_before,
            tables_after: self.sstable_count(),
            max_discard_ratio: 0.0,
            entries_dropped: total_entries - live_count,
            bytes_before,
            bytes_after: self.total_size(),
            rewritten: true,
        };

        tracing::info!(
            "Compacted {} tables into {} in {}, dropped {} entries",
            stats.tables_before,
            stats.tables_after,
            self.data_dir.display(),
            stats.entries_dropped
        );

        Ok(stats)
    }

    /// Discardable fraction of each table, newest first
    fn discard_ratios(&self) -> Result<Vec<f64>> {
        let sstables = self.sstables.read();
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut ratios = Vec::with_capacity(sstables.len());

        for reader in sstables.iter() {
            let mut discardable = 0u64;
            for item in reader.iter()? {
                let (key, entry) = item?;
                if seen.contains(&key) {
                    discardable += 1;
                } else {
                    if entry == Entry::Tombstone {
                        discardable += 1;
                    }
                    seen.insert(key);
                }
            }
            let total = reader.entry_count().max(1);
            ratios.push(discardable as f64 / total as f64);
        }

        Ok(ratios)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Total bytes held by SSTable files
    pub fn total_size(&self) -> u64 {
        self.sstables.read().iter().map(|r| r.file_size()).sum()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }

    fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy().ends_with(".sst.tmp"))
            .unwrap_or(false)
    }
}
