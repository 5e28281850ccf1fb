//! Tests for SSTables and the StorageManager
//!
//! These tests verify:
//! - Building and reading SSTables (values and tombstones)
//! - Corruption detection at open
//! - Prefix key enumeration
//! - Flush from MemTable, newest-first lookups
//! - Space reclamation thresholds

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use vaultkv::memtable::{Entry, MemTable};
use vaultkv::storage::{SSTableBuilder, SSTableReader, StorageManager};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sstables");
    (temp_dir, path)
}

fn build_table(path: &PathBuf, entries: &[(&str, Option<&str>)]) {
    let mut builder = SSTableBuilder::new(path).unwrap();
    for (key, value) in entries {
        match value {
            Some(v) => builder.add(key.as_bytes(), v.as_bytes()).unwrap(),
            None => builder.add_tombstone(key.as_bytes()).unwrap(),
        }
    }
    builder.finish().unwrap();
}

fn memtable_with(entries: &[(&str, Option<&str>)]) -> MemTable {
    let table = MemTable::new();
    for (key, value) in entries {
        match value {
            Some(v) => table.put(key.as_bytes().to_vec(), v.as_bytes().to_vec()),
            None => table.delete(key.as_bytes().to_vec()),
        };
    }
    table
}

// =============================================================================
// SSTable Tests
// =============================================================================

#[test]
fn test_build_and_read() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("table.sst");
    build_table(&path, &[("a", Some("1")), ("b", None), ("c", Some("3"))]);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 3);
    assert_eq!(reader.get(b"a").unwrap(), Some(Entry::Value(b"1".to_vec())));
    assert_eq!(reader.get(b"b").unwrap(), Some(Entry::Tombstone));
    assert_eq!(reader.get(b"zzz").unwrap(), None);
    assert!(reader.contains_key(b"c"));

    let all: Vec<(Vec<u8>, Entry)> = reader.iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2], (b"c".to_vec(), Entry::Value(b"3".to_vec())));

    // Temporary file is gone once published
    assert!(!path.with_extension("sst.tmp").exists());
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let temp = TempDir::new().unwrap();
    let mut builder = SSTableBuilder::new(&temp.path().join("t.sst")).unwrap();

    builder.add(b"b", b"1").unwrap();
    assert!(builder.add(b"a", b"2").is_err());
    assert!(builder.add(b"b", b"3").is_err());
    assert_eq!(builder.entry_count(), 1);
}

#[test]
fn test_corrupted_table_fails_to_open() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("table.sst");
    build_table(&path, &[("key", Some("value"))]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[16] ^= 0xFF; // inside the data block
    fs::write(&path, &bytes).unwrap();
    assert!(SSTableReader::open(&path).is_err());

    fs::write(&path, b"not a table at all, definitely").unwrap();
    assert!(SSTableReader::open(&path).is_err());
}

#[test]
fn test_keys_with_prefix() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("table.sst");
    build_table(
        &path,
        &[("order:1", Some("o")), ("user:1", Some("a")), ("user:2", None), ("userz", Some("z"))],
    );

    let reader = SSTableReader::open(&path).unwrap();
    let keys: Vec<&[u8]> = reader.keys_with_prefix(b"user:").collect();
    assert_eq!(keys, vec![b"user:1".as_slice(), b"user:2".as_slice()]);
}

// =============================================================================
// StorageManager Tests
// =============================================================================

#[test]
fn test_flush_and_newest_wins() {
    let (_temp, dir) = setup_temp_dir();
    let storage = StorageManager::open(&dir, false).unwrap();

    storage.flush(&memtable_with(&[("k", Some("old")), ("gone", Some("x"))])).unwrap();
    storage.flush(&memtable_with(&[("k", Some("new")), ("gone", None)])).unwrap();

    assert_eq!(storage.sstable_count(), 2);
    assert_eq!(storage.get(b"k").unwrap(), Some(Entry::Value(b"new".to_vec())));
    assert_eq!(storage.get(b"gone").unwrap(), Some(Entry::Tombstone));
    assert!(storage.flush(&MemTable::new()).is_err());
}

#[test]
fn test_reopen_discovers_tables_and_removes_temp_files() {
    let (_temp, dir) = setup_temp_dir();
    {
        let storage = StorageManager::open(&dir, false).unwrap();
        storage.flush(&memtable_with(&[("a", Some("1"))])).unwrap();
        storage.flush(&memtable_with(&[("b", Some("2"))])).unwrap();
    }
    fs::write(dir.join("sstable_000099.sst.tmp"), b"partial").unwrap();

    let storage = StorageManager::open(&dir, false).unwrap();
    assert_eq!(storage.sstable_count(), 2);
    assert_eq!(storage.next_sstable_id(), 3);
    assert!(!dir.join("sstable_000099.sst.tmp").exists());
}

#[test]
fn test_read_only_open_leaves_disk_alone() {
    let (_temp, dir) = setup_temp_dir();
    assert!(StorageManager::open(&dir, true).is_ok());
    assert!(!dir.exists());
}

#[test]
fn test_compact_below_threshold_is_noop() {
    let (_temp, dir) = setup_temp_dir();
    let storage = StorageManager::open(&dir, false).unwrap();
    storage.flush(&memtable_with(&[("a", Some("1")), ("b", Some("2"))])).unwrap();
    storage.flush(&memtable_with(&[("c", Some("3"))])).unwrap();

    let stats = storage.compact(0.7).unwrap();
    assert!(!stats.rewritten);
    assert_eq!(stats.tables_before, 2);
    assert_eq!(stats.tables_after, 2);
}

#[test]
fn test_compact_merges_stale_tables() {
    let (_temp, dir) = setup_temp_dir();
    let storage = StorageManager::open(&dir, false).unwrap();
    storage.flush(&memtable_with(&[("a", Some("1")), ("b", Some("2")), ("c", Some("3"))])).unwrap();
    storage.flush(&memtable_with(&[("a", Some("10")), ("b", None), ("c", Some("30"))])).unwrap();

    let stats = storage.compact(0.7).unwrap();
    assert!(stats.rewritten);
    assert!(stats.max_discard_ratio >= 0.7);
    assert_eq!(stats.tables_after, 1);
    assert_eq!(stats.entries_dropped, 4);

    assert_eq!(storage.get(b"a").unwrap(), Some(Entry::Value(b"10".to_vec())));
    assert_eq!(storage.get(b"b").unwrap(), None);
    assert_eq!(storage.get(b"c").unwrap(), Some(Entry::Value(b"30".to_vec())));

    let files = fs::read_dir(&dir).unwrap().count();
    assert_eq!(files, 1);
}
