//! Benchmarks for VaultKV storage operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;
use tempfile::tempdir;
use vaultkv::config::{StoreConfig, WalSyncStrategy};
use vaultkv::{Database, Engine};

const SEEDED_KEYS: usize = 10_000;

fn open_engine(dir: &std::path::Path) -> Engine {
    let config = StoreConfig::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::Never)
        .build();
    Engine::open(config).expect("open engine")
}

fn seeded_database(dir: &std::path::Path) -> Database {
    let db = Database::from_engine("bench", open_engine(dir));
    for i in 0..SEEDED_KEYS {
        db.insert(&format!("user:{:06}", i), &[json!({ "id": i, "name": format!("user-{}", i) })])
            .expect("seed");
    }
    db
}

fn storage_benchmarks(c: &mut Criterion) {
    c.bench_function("engine_put_sequential", |b| {
        let dir = tempdir().expect("temp");
        let engine = open_engine(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            engine
                .put(format!("key:{:012}", i).as_bytes(), b"value-payload-0123456789")
                .expect("put");
        });
    });

    let dir = tempdir().expect("temp");
    let db = seeded_database(dir.path());

    c.bench_function("database_select", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 7919) % SEEDED_KEYS;
            black_box(db.get(&format!("user:{:06}", i)).expect("get"));
        });
    });

    c.bench_function("database_prefix_query_100", |b| {
        b.iter(|| black_box(db.prefix_query("user:00", 100).expect("like")));
    });

    c.bench_function("database_insert_delete", |b| {
        b.iter_batched(
            || format!("tmp:{}", rand_suffix()),
            |key| {
                db.insert(&key, &[json!(1)]).expect("insert");
                db.delete(&key).expect("delete");
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("database_backup", |b| {
        let out = dir.path().join("bench.bak");
        b.iter(|| black_box(db.backup_to(&out).expect("backup")));
    });
}

fn rand_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
