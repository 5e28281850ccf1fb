//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Read and write scopes (atomic commit, discard on error)
//! - Flush to SSTable and crash recovery from WAL
//! - Directory lock guard and read-only opens
//! - Backup stream and loading
//! - Space reclamation and close semantics

use std::fs;
use std::io::{self, Cursor, Write};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vaultkv::config::{StoreConfig, WalSyncStrategy};
use vaultkv::engine::{Engine, BACKUP_MAGIC, LOCK_FILENAME};
use vaultkv::VaultError;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(temp: &TempDir) -> StoreConfig {
    StoreConfig::builder()
        .data_dir(temp.path().join("db"))
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_size_limit(1024 * 1024)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_for(&temp_dir)).unwrap();
    (temp_dir, engine)
}

fn setup_temp_engine_with_small_memtable() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .data_dir(temp_dir.path().join("db"))
        .wal_sync_strategy(WalSyncStrategy::Never)
        .memtable_size_limit(100) // Very small to trigger flushes
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_get_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    assert_eq!(engine.memtable_entry_count(), 1);

    engine.delete(b"key").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), None);

    // Deleting a missing key is fine
    engine.delete(b"never").unwrap();
}

#[test]
fn test_reads_span_memtable_and_sstables() {
    let (_temp, engine) = setup_temp_engine_with_small_memtable();

    for i in 0..50 {
        engine.put(format!("key{:03}", i).as_bytes(), b"0123456789").unwrap();
    }
    assert!(engine.sstable_count() > 0);

    engine.delete(b"key010").unwrap();
    engine.put(b"key020", b"updated").unwrap();

    for i in 0..50 {
        let got = engine.get(format!("key{:03}", i).as_bytes()).unwrap();
        match i {
            10 => assert_eq!(got, None),
            20 => assert_eq!(got, Some(b"updated".to_vec())),
            _ => assert_eq!(got, Some(b"0123456789".to_vec())),
        }
    }
}

#[test]
fn test_commit_succeeds_when_flush_fails() {
    let (_temp, engine) = setup_temp_engine_with_small_memtable();
    let storage_dir = engine.storage_dir().to_path_buf();

    // Nowhere to write the table
    fs::remove_dir_all(&storage_dir).unwrap();

    engine.put(b"kept", &[7u8; 200]).unwrap();
    assert_eq!(engine.get(b"kept").unwrap(), Some(vec![7u8; 200]));
    assert_eq!(engine.sstable_count(), 0);
    assert!(engine.memtable_entry_count() > 0);

    // Next commit retries the flush
    fs::create_dir_all(&storage_dir).unwrap();
    engine.put(b"more", &[8u8; 200]).unwrap();
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.get(b"kept").unwrap(), Some(vec![7u8; 200]));
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn test_update_scope_sees_own_writes_and_commits() {
    let (_temp, engine) = setup_temp_engine();

    engine
        .update(|txn| {
            txn.set(b"a", b"1");
            assert_eq!(txn.get(b"a")?, Some(b"1".to_vec()));
            txn.delete(b"a");
            assert!(!txn.contains(b"a")?);
            txn.set(b"b", b"2");
            assert_eq!(txn.len(), 2);
            Ok(())
        })
        .unwrap();

    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_failed_update_scope_discards_writes() {
    let (_temp, engine) = setup_temp_engine();

    let result: vaultkv::Result<()> = engine.update(|txn| {
        txn.set(b"a", b"1");
        Err(VaultError::KeyExists)
    });

    assert!(matches!(result, Err(VaultError::KeyExists)));
    assert_eq!(engine.get(b"a").unwrap(), None);
}

#[test]
fn test_scan_prefix_merges_sources_in_order() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"user:3", b"c").unwrap();
    engine.put(b"user:1", b"a").unwrap();
    engine.flush().unwrap();
    engine.put(b"user:2", b"b").unwrap();
    engine.put(b"user:1", b"a2").unwrap();
    engine.delete(b"user:3").unwrap();
    engine.put(b"other", b"x").unwrap();

    let all = engine.view(|txn| txn.scan_prefix(b"user:", usize::MAX)).unwrap();
    assert_eq!(
        all,
        vec![
            (b"user:1".to_vec(), b"a2".to_vec()),
            (b"user:2".to_vec(), b"b".to_vec()),
        ]
    );

    let limited = engine.view(|txn| txn.scan_prefix(b"user:", 1)).unwrap();
    assert_eq!(limited.len(), 1);
    assert!(engine.view(|txn| txn.scan_prefix(b"user:", 0)).unwrap().is_empty());
}

#[test]
fn test_visit_prefix_stops_on_break() {
    let (_temp, engine) = setup_temp_engine();
    for key in ["p1", "p2", "p3"] {
        engine.put(key.as_bytes(), b"v").unwrap();
    }

    let mut seen = Vec::new();
    engine
        .view(|txn| {
            txn.visit_prefix(b"p", |key, _| {
                seen.push(key);
                if seen.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
        })
        .unwrap();

    assert_eq!(seen, vec![b"p1".to_vec(), b"p2".to_vec()]);
}

#[test]
fn test_concurrent_writers_serialize() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    engine.put(b"counter", b"0").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..25 {
                    engine
                        .update(|txn| {
                            let current: u64 = String::from_utf8(txn.get(b"counter")?.unwrap())
                                .unwrap()
                                .parse()
                                .unwrap();
                            txn.set(b"counter", (current + 1).to_string().as_bytes());
                            Ok(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.get(b"counter").unwrap(), Some(b"100".to_vec()));
}

// =============================================================================
// Durability and Recovery
// =============================================================================

#[test]
fn test_recovery_from_wal_after_crash() {
    let temp = TempDir::new().unwrap();
    let config = config_for(&temp);

    {
        let engine = Engine::open(config.clone()).unwrap();
        engine.put(b"durable", b"yes").unwrap();
        engine.delete(b"durable-gone").unwrap();
        // Simulate a crash: skip close, leave the lock behind
        std::mem::forget(engine);
    }

    // The stale lock blocks a normal open...
    assert!(matches!(Engine::open(config.clone()), Err(VaultError::Locked(_))));

    // ...but a bypassing open replays the WAL
    let bypass = StoreConfig { bypass_lock_guard: true, ..config };
    let engine = Engine::open(bypass).unwrap();
    assert_eq!(engine.get(b"durable").unwrap(), Some(b"yes".to_vec()));
    assert!(engine.sstable_count() >= 1);
}

#[test]
fn test_data_survives_close_and_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open(config_for(&temp)).unwrap();
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
        assert!(!temp.path().join("db").join(LOCK_FILENAME).exists());
    }

    let engine = Engine::open(config_for(&temp)).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_lock_blocks_second_open() {
    let (temp, _engine) = setup_temp_engine();
    assert!(temp.path().join("db").join(LOCK_FILENAME).exists());
    assert!(matches!(Engine::open(config_for(&temp)), Err(VaultError::Locked(_))));
}

#[test]
fn test_read_only_open() {
    let temp = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_for(&temp)).unwrap();
        engine.put(b"k", b"v").unwrap();
    }

    let config = StoreConfig { read_only: true, ..config_for(&temp) };
    let engine = Engine::open(config).unwrap();

    assert!(engine.is_read_only());
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    assert!(matches!(engine.put(b"k", b"x"), Err(VaultError::ReadOnly)));
    assert!(matches!(engine.reclaim_space(0.7), Err(VaultError::ReadOnly)));
    assert!(!temp.path().join("db").join(LOCK_FILENAME).exists());

    let missing = StoreConfig::builder()
        .data_dir(temp.path().join("nowhere"))
        .read_only(true)
        .build();
    assert!(Engine::open(missing).is_err());
    assert!(!temp.path().join("nowhere").exists());
}

#[test]
fn test_operations_after_close_fail() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"k", b"v").unwrap();

    engine.close().unwrap();
    engine.close().unwrap();

    assert!(engine.is_closed());
    assert!(matches!(engine.get(b"k"), Err(VaultError::Closed)));
    assert!(matches!(engine.put(b"k", b"v"), Err(VaultError::Closed)));
}

#[test]
fn test_interrupted_merge_keeps_deletes() {
    let temp = TempDir::new().unwrap();
    let config = config_for(&temp);

    let engine = Engine::open(config.clone()).unwrap();
    engine.put(b"gone", b"old").unwrap();
    engine.flush().unwrap();
    engine.delete(b"gone").unwrap();
    engine.put(b"stay", b"yes").unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.sstable_count(), 2);

    let tombstone_table = engine.storage_dir().join("sstable_000002.sst");
    let tombstone_bytes = fs::read(&tombstone_table).unwrap();

    let stats = engine.reclaim_space(0.0).unwrap();
    assert!(stats.rewritten);
    engine.close().unwrap();

    // Crash state: the older table was removed, the newer one was not yet
    fs::write(&tombstone_table, tombstone_bytes).unwrap();

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"gone").unwrap(), None);
    assert_eq!(engine.get(b"stay").unwrap(), Some(b"yes".to_vec()));
}

#[test]
fn test_compact_on_close_merges_tables() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .data_dir(temp.path().join("db"))
        .memtable_size_limit(64)
        .compact_on_close(true)
        .build();

    {
        let engine = Engine::open(config.clone()).unwrap();
        for i in 0..20 {
            engine.put(format!("key{:02}", i).as_bytes(), b"0123456789").unwrap();
        }
        assert!(engine.sstable_count() > 1);
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.get(b"key07").unwrap(), Some(b"0123456789".to_vec()));
}

// =============================================================================
// Backup and Load
// =============================================================================

#[test]
fn test_backup_and_load_into_empty_engine() {
    let (_temp, source) = setup_temp_engine_with_small_memtable();
    for i in 0..1500 {
        source.put(format!("k{:05}", i).as_bytes(), format!("v{}", i).as_bytes()).unwrap();
    }
    source.delete(b"k00000").unwrap();

    let mut stream = Vec::new();
    let summary = source.backup(&mut stream).unwrap();
    assert_eq!(summary.entries, 1499);
    assert_eq!(&stream[0..4], BACKUP_MAGIC);

    let (_temp2, target) = setup_temp_engine();
    let loaded = target.load(Cursor::new(stream)).unwrap();
    assert_eq!(loaded, 1499);

    assert_eq!(target.get(b"k00000").unwrap(), None);
    assert_eq!(target.get(b"k01234").unwrap(), Some(b"v1234".to_vec()));
    assert_eq!(target.get(b"k01499").unwrap(), Some(b"v1499".to_vec()));
}

/// Accepts `capacity` bytes, then fails every write
struct FullDisk {
    written: usize,
    capacity: usize,
}

impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.capacity {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        let n = buf.len().min(self.capacity - self.written);
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_backup_streams_records_and_reports_write_failures() {
    let (_temp, source) = setup_temp_engine_with_small_memtable();
    for i in 0..2000 {
        source.put(format!("k{:05}", i).as_bytes(), &[b'x'; 64]).unwrap();
    }

    // Fails partway through the records, long before the end record
    let mut disk = FullDisk {
        written: 0,
        capacity: 32 * 1024,
    };
    let err = source.backup(&mut disk).unwrap_err();
    assert!(matches!(err, VaultError::Io(_)));
    assert_eq!(disk.written, 32 * 1024);

    // The engine is still usable afterwards
    source.put(b"after", b"ok").unwrap();
    let mut stream = Vec::new();
    assert_eq!(source.backup(&mut stream).unwrap().entries, 2001);
}

#[test]
fn test_load_merges_with_existing_keys() {
    let (_temp, source) = setup_temp_engine();
    source.put(b"shared", b"from-backup").unwrap();
    let mut stream = Vec::new();
    source.backup(&mut stream).unwrap();

    let (_temp2, target) = setup_temp_engine();
    target.put(b"shared", b"local").unwrap();
    target.put(b"local-only", b"kept").unwrap();

    target.load(Cursor::new(stream)).unwrap();
    assert_eq!(target.get(b"shared").unwrap(), Some(b"from-backup".to_vec()));
    assert_eq!(target.get(b"local-only").unwrap(), Some(b"kept".to_vec()));
}

#[test]
fn test_truncated_backup_is_rejected_without_writes() {
    let (_temp, source) = setup_temp_engine();
    for i in 0..10 {
        source.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }
    let mut stream = Vec::new();
    source.backup(&mut stream).unwrap();
    stream.truncate(stream.len() - 3);

    let (_temp2, target) = setup_temp_engine();
    assert!(matches!(target.load(Cursor::new(stream)), Err(VaultError::Backup(_))));
    assert_eq!(target.get(b"k0").unwrap(), None);

    assert!(target.load(Cursor::new(b"garbage".to_vec())).is_err());
}

// =============================================================================
// Space Reclamation
// =============================================================================

#[test]
fn test_reclaim_space() {
    let (temp, engine) = setup_temp_engine();

    // Nothing on disk yet: success, nothing rewritten
    let stats = engine.reclaim_space(0.7).unwrap();
    assert!(!stats.rewritten);

    for round in 0..3 {
        for i in 0..10 {
            engine.put(format!("k{}", i).as_bytes(), format!("v{}", round).as_bytes()).unwrap();
        }
        engine.flush().unwrap();
    }
    assert_eq!(engine.sstable_count(), 3);

    let stats = engine.reclaim_space(0.7).unwrap();
    assert!(stats.rewritten);
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.get(b"k3").unwrap(), Some(b"v2".to_vec()));

    let sst_files = fs::read_dir(temp.path().join("db").join("sstables")).unwrap().count();
    assert_eq!(sst_files, 1);

    let engine_stats = engine.stats().unwrap();
    assert_eq!(engine_stats.sstable_count, 1);
    assert!(engine_stats.sstable_bytes > 0);
}
