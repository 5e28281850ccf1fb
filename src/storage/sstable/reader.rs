//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.
//! The file handle sits behind a mutex so lookups only need `&self`, letting
//! the storage manager serve concurrent readers under a shared lock.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, VaultError};
use crate::memtable::Entry;

use super::iterator::SSTableIterator;
use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    /// Index block starting offset (end of data block)
    index_offset: u64,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header, footer and the data block checksum, then loads the
    /// entire index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(path, "file too small"));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(corrupt(path, &format!("invalid magic {:?}", &header[0..4])));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(corrupt(path, &format!("unsupported version {}", version)));
        }

        let entry_count = read_u64(&header[6..14]);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = read_u64(&footer[0..8]);
        let data_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corrupt(path, "index offset out of bounds"));
        }

        let mut data = vec![0u8; (index_offset - HEADER_SIZE) as usize];
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        file.read_exact(&mut data)?;
        if crc32fast::hash(&data) != data_crc {
            return Err(corrupt(path, "data checksum mismatch"));
        }
        drop(data);

        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;
        let index = parse_index(path, &index_data)?;

        if index.len() as u64 != entry_count {
            return Err(corrupt(
                path,
                &format!("index holds {} keys, header says {}", index.len(), entry_count),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            file_size,
        })
    }

    /// Get an entry by key: O(log n) lookup via in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(Entry::Value(_)))`: key found with value
    /// - `Ok(Some(Entry::Tombstone))`: key found but deleted
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        // Skip the key (we already know it matches)
        file.seek(SeekFrom::Current(key_len as i64))?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(Some(Entry::Tombstone));
        }

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;

        Ok(Some(Entry::Value(value)))
    }

    /// Keys starting with `prefix`, ascending (tombstones included)
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.index
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(k, _)| k.as_slice())
            .take_while(move |k| k.starts_with(prefix))
    }

    /// Whether the index holds `key` (as a value or a tombstone)
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// File size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an iterator over all entries in key order
    ///
    /// Holds this table's file lock until the iterator is dropped.
    pub fn iter(&self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(self.file.lock(), self.index_offset)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Parse index entries: [key_len(4)][offset(8)][key]
fn parse_index(path: &Path, data: &[u8]) -> Result<BTreeMap<Vec<u8>, u64>> {
    let mut index = BTreeMap::new();
    let mut pos = 0;

    while pos < data.len() {
        if pos + 12 > data.len() {
            return Err(corrupt(path, "truncated index entry"));
        }
        let key_len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let offset = read_u64(&data[pos + 4..pos + 12]);
        pos += 12;

        if pos + key_len > data.len() {
            return Err(corrupt(path, "truncated index key"));
        }
        index.insert(data[pos..pos + key_len].to_vec(), offset);
        pos += key_len;
    }

    Ok(index)
}

fn corrupt(path: &Path, reason: &str) -> VaultError {
    VaultError::Storage(format!("corrupted SSTable {}: {}", path.display(), reason))
}
