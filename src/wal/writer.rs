//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, VaultError};

use super::{Operation, WalEntry, WalRecovery};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN handed to the next appended entry
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing file is appended to; LSNs continue after its last valid entry.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let next_lsn = if path.exists() {
            WalRecovery::verify(path)?.last_lsn + 1
        } else {
            1
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append an entry to the WAL, returning its LSN
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.write_one(operation)?;
        self.writer.flush()?;
        self.maybe_sync()?;
        Ok(lsn)
    }

    /// Append several entries with a single flush/sync decision at the end
    ///
    /// Returns the LSN of the last entry (or the last assigned LSN if empty).
    pub fn append_batch(&mut self, operations: Vec<Operation>) -> Result<u64> {
        let mut last = self.next_lsn.saturating_sub(1);
        for operation in operations {
            last = self.write_one(operation)?;
        }
        self.writer.flush()?;
        self.maybe_sync()?;
        Ok(last)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry (their effects are durable elsewhere); LSNs keep counting
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the LSN the next entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Size of the WAL file in bytes
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.writer.get_ref().metadata()?.len())
    }

    /// Path of the WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_one(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, operation).serialize()?;
        self.writer
            .write_all(&frame)
            .map_err(|e| VaultError::Storage(format!("WAL write failed: {}", e)))?;
        self.next_lsn += 1;
        self.unsynced += 1;
        Ok(lsn)
    }

    fn maybe_sync(&mut self) -> Result<()> {
        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
            WalSyncStrategy::Never => false,
        };
        if due {
            self.writer.get_ref().sync_data()?;
            self.unsynced = 0;
        }
        Ok(())
    }
}
