//! WAL Reader
//!
//! Handles reading framed entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

use super::{WalEntry, HEADER_SIZE};

/// What the reader found at the current position
#[derive(Debug)]
pub enum ReadOutcome {
    /// A well-formed entry
    Entry(WalEntry),

    /// A complete frame whose payload failed its CRC or could not be decoded;
    /// the reader has already moved past it
    Corrupted { offset: u64 },

    /// The file ends in the middle of a frame at `offset`
    PartialTail { offset: u64 },
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next frame
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Offset of the next unread frame
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next frame; `Ok(None)` at a clean end of file
    pub fn next_entry(&mut self) -> Result<Option<ReadOutcome>> {
        let offset = self.position;
        let remaining = self.file_len - offset;

        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Some(ReadOutcome::PartialTail { offset }));
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as u64;

        if remaining - (HEADER_SIZE as u64) < len {
            return Ok(Some(ReadOutcome::PartialTail { offset }));
        }

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload)?;
        self.position += HEADER_SIZE as u64 + len;

        if WalEntry::compute_crc(&payload) != crc {
            return Ok(Some(ReadOutcome::Corrupted { offset }));
        }

        match WalEntry::deserialize(&payload) {
            Ok(entry) => Ok(Some(ReadOutcome::Entry(entry))),
            Err(_) => Ok(Some(ReadOutcome::Corrupted { offset })),
        }
    }
}
