//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::Entry;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, Entry>>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get an entry by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock), returning the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(key, Entry::Value(value))
    }

    /// Delete a key (write lock, inserts tombstone), returning the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, Entry::Tombstone)
    }

    fn insert(&self, key: Vec<u8>, entry: Entry) -> usize {
        let mut data = self.data.write();
        let added = key.len() + entry.size();
        let removed = data
            .insert(key.clone(), entry)
            .map(|old| key.len() + old.size())
            .unwrap_or(0);

        let current = self.size.load(Ordering::SeqCst);
        let new_size = (current + added).saturating_sub(removed);
        self.size.store(new_size, Ordering::SeqCst);
        new_size
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the table holds no entries (tombstones included)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Entry)> {
        let data = self.data.read();
        data.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }

    /// Get an iterator over all entries (for flush)
    /// Returns a snapshot in sorted key order
    pub fn iter(&self) -> MemTableIterator {
        let entries: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a snapshot of MemTable entries
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, Entry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, Entry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
