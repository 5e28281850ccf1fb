//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

use super::{ReadOutcome, WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Detect and skip corrupted entries
    /// 3. Truncate partial writes at end
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, mut result, tail) = Self::scan(path)?;

        if let Some(offset) = tail {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
            file.sync_all()?;
            result.was_truncated = true;
            tracing::warn!("Truncated partial WAL tail at offset {}", offset);
        }

        Ok((entries, result))
    }

    /// Read every valid entry without modifying the file
    pub fn replay(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, _) = Self::scan(path)?;
        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, mut result, tail) = Self::scan(path)?;
        result.was_truncated = tail.is_some();
        Ok(result)
    }

    /// Walk the file, returning entries, stats and the offset of a partial tail
    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, Option<u64>)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut tail = None;

        while let Some(outcome) = reader.next_entry()? {
            match outcome {
                ReadOutcome::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = result.last_lsn.max(entry.lsn);
                    entries.push(entry);
                }
                ReadOutcome::Corrupted { offset } => {
                    tracing::warn!("Skipping corrupted WAL entry at offset {}", offset);
                    result.entries_corrupted += 1;
                }
                ReadOutcome::PartialTail { offset } => {
                    tail = Some(offset);
                    break;
                }
            }
        }

        Ok((entries, result, tail))
    }
}
