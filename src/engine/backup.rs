//! Full backups and backup loading
//!
//! ## Stream Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                        │
//! │   Magic: "VKBK" (4) | Version: u16 (2) | Created: u64 (8)│
//! ├──────────────────────────────────────────────────────────┤
//! │ Records                                                  │
//! │   [Len: u32][CRC32: u32][bincode(BackupRecord)]          │
//! │   ... one Entry record per live key, ascending ...       │
//! │   ... terminated by an End record carrying the count ... │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

use super::Engine;

/// Magic bytes opening every backup stream
pub const BACKUP_MAGIC: &[u8; 4] = b"VKBK";

const BACKUP_VERSION: u16 = 1;
const HEADER_SIZE: usize = 14;

/// Largest record accepted while loading (64 MB)
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Entries applied per write scope while loading
const LOAD_BATCH_SIZE: usize = 1000;

#[derive(Debug, Serialize, Deserialize)]
enum BackupRecord {
    Entry { key: Vec<u8>, value: Vec<u8> },
    End { count: u64 },
}

/// Outcome of writing a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupSummary {
    /// Live entries written
    pub entries: u64,
    /// Unix millis recorded in the header
    pub created_at: u64,
}

impl Engine {
    /// Write a point-in-time snapshot of every live entry to `writer`
    pub fn backup<W: Write>(&self, writer: W) -> Result<BackupSummary> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut writer = BufWriter::new(writer);
        writer.write_all(BACKUP_MAGIC)?;
        writer.write_all(&BACKUP_VERSION.to_le_bytes())?;
        writer.write_all(&created_at.to_le_bytes())?;

        // Records are written as they are visited; values are never
        // collected in memory
        let count = self.view(|txn| {
            let mut count = 0u64;
            let mut failure = None;
            txn.visit_prefix(b"", |key, value| {
                match write_record(&mut writer, &BackupRecord::Entry { key, value }) {
                    Ok(()) => {
                        count += 1;
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        failure = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })?;
            match failure {
                Some(e) => Err(e),
                None => Ok(count),
            }
        })?;
        write_record(&mut writer, &BackupRecord::End { count })?;
        writer.flush()?;

        tracing::info!(
            "Backed up {} entries from {}",
            count,
            self.data_dir().display()
        );

        Ok(BackupSummary {
            entries: count,
            created_at,
        })
    }

    /// Apply a backup stream to this engine
    ///
    /// The whole stream is verified before anything is written, so a
    /// truncated or corrupted file leaves the database untouched. Entries are
    /// upserted: keys absent from the backup keep their current values.
    pub fn load<R: Read + Seek>(&self, reader: R) -> Result<u64> {
        let mut reader = BufReader::new(reader);

        let expected = verify_stream(&mut reader)?;

        reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        let mut batch: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(LOAD_BATCH_SIZE);
        let mut applied = 0u64;

        loop {
            match read_record(&mut reader)? {
                BackupRecord::Entry { key, value } => {
                    batch.push((key, value));
                    if batch.len() >= LOAD_BATCH_SIZE {
                        applied += self.apply_batch(&mut batch)?;
                    }
                }
                BackupRecord::End { .. } => break,
            }
        }
        applied += self.apply_batch(&mut batch)?;

        debug_assert_eq!(applied, expected);
        tracing::info!("Loaded {} entries into {}", applied, self.data_dir().display());
        Ok(applied)
    }

    fn apply_batch(&self, batch: &mut Vec<(Vec<u8>, Vec<u8>)>) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len() as u64;
        self.update(|txn| {
            for (key, value) in batch.iter() {
                txn.set(key, value);
            }
            Ok(())
        })?;
        batch.clear();
        Ok(count)
    }
}

fn write_record<W: Write>(writer: &mut W, record: &BackupRecord) -> Result<()> {
    let payload = bincode::serialize(record)?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

fn read_record<R: Read>(reader: &mut R) -> Result<BackupRecord> {
    let mut header = [0u8; 8];
    reader
        .read_exact(&mut header)
        .map_err(|_| VaultError::Backup("unexpected end of stream".to_string()))?;

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if len > MAX_RECORD_SIZE {
        return Err(VaultError::Backup(format!("record of {} bytes exceeds limit", len)));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|_| VaultError::Backup("unexpected end of stream".to_string()))?;
    if crc32fast::hash(&payload) != crc {
        return Err(VaultError::Backup("record checksum mismatch".to_string()));
    }

    bincode::deserialize(&payload).map_err(|e| VaultError::Backup(e.to_string()))
}

/// Check header, every record checksum and the final count; returns the count
fn verify_stream<R: Read>(reader: &mut R) -> Result<u64> {
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|_| VaultError::Backup("missing header".to_string()))?;

    if &header[0..4] != BACKUP_MAGIC {
        return Err(VaultError::Backup("not a backup file".to_string()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != BACKUP_VERSION {
        return Err(VaultError::Backup(format!("unsupported version {}", version)));
    }

    let mut seen = 0u64;
    loop {
        match read_record(reader)? {
            BackupRecord::Entry { .. } => seen += 1,
            BackupRecord::End { count } if count == seen => return Ok(count),
            BackupRecord::End { count } => {
                return Err(VaultError::Backup(format!(
                    "end record announces {} entries, found {}",
                    count, seen
                )));
            }
        }
    }
}
