//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/set operations
//! - Threshold-triggered background flushes
//! - Crash recovery from active and sealed WALs
//! - Flush failures and refused writes
//! - Concurrent access patterns
//! - Engine lifecycle (open/close)

use std::fs;
use std::sync::Arc;
use std::thread;

use sparsekv::config::{Config, WalSyncStrategy};
use sparsekv::engine::Engine;
use sparsekv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_with_threshold(dir: &std::path::Path, threshold: usize) -> Config {
    Config::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
        .memtable_threshold(threshold)
        .index_block_size(32)
        .scan_chunk_size(16)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
    (temp_dir, engine)
}

fn setup_temp_engine_with_threshold(threshold: usize) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_with_threshold(temp_dir.path(), threshold)).unwrap();
    (temp_dir, engine)
}

fn get_str(engine: &Engine, key: &str) -> Option<String> {
    engine
        .get(key.as_bytes())
        .unwrap()
        .map(|v| String::from_utf8(v).unwrap())
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let engine = Engine::open(Config::builder().data_dir(&data_dir).build()).unwrap();

    assert!(data_dir.join("segments").is_dir());
    assert!(data_dir.join("wal").join("0.log").exists());
    assert_eq!(engine.wal_generation(), 0);
    assert_eq!(engine.segment_count(), 0);
}

#[test]
fn test_engine_set_and_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.set(b"key1", b"value1").unwrap();

    assert_eq!(get_str(&engine, "key1").as_deref(), Some("value1"));
}

#[test]
fn test_engine_get_never_written() {
    let (_temp, engine) = setup_temp_engine();
    engine.set(b"present", b"1").unwrap();

    assert_eq!(engine.get(b"absent").unwrap(), None);
}

#[test]
fn test_engine_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.set(b"key", b"value1").unwrap();
    engine.set(b"key", b"value2").unwrap();

    assert_eq!(get_str(&engine, "key").as_deref(), Some("value2"));
    assert_eq!(engine.memtable_len(), 1);
}

#[test]
fn test_engine_empty_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.set(b"key", b"").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), Some(Vec::new()));
}

#[test]
fn test_engine_open_path_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.data_dir(), temp_dir.path());
    assert_eq!(engine.config().memtable_threshold, 4096);
    assert_eq!(engine.segment_dir(), temp_dir.path().join("segments"));
}

#[test]
fn test_engine_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();

    let zero_threshold = config_with_threshold(temp_dir.path(), 0);
    assert!(matches!(Engine::open(zero_threshold), Err(KvError::Config(_))));

    let zero_block = Config::builder()
        .data_dir(temp_dir.path())
        .index_block_size(0)
        .build();
    assert!(matches!(Engine::open(zero_block), Err(KvError::Config(_))));
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_engine_threshold_flush() {
    let (temp, engine) = setup_temp_engine_with_threshold(5);

    for (key, value) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")] {
        engine.set(key.as_bytes(), value.as_bytes()).unwrap();
    }
    engine.wait_for_flushes().unwrap();

    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.sealed_count(), 0);
    assert_eq!(engine.wal_generation(), 1);
    assert_eq!(
        fs::read(temp.path().join("segments").join("0")).unwrap(),
        b"a\x1f1\x1eb\x1f2\x1ec\x1f3\x1ed\x1f4\x1ee\x1f5".to_vec()
    );
    assert!(!temp.path().join("wal").join("0.log").exists());
    assert_eq!(get_str(&engine, "c").as_deref(), Some("3"));
}

#[test]
fn test_engine_overwrites_do_not_trigger_flush() {
    let (_temp, engine) = setup_temp_engine_with_threshold(3);

    for i in 0..10 {
        engine.set(b"a", format!("{}", i).as_bytes()).unwrap();
        engine.set(b"b", b"x").unwrap();
    }
    engine.wait_for_flushes().unwrap();

    assert_eq!(engine.segment_count(), 0);
    assert_eq!(engine.memtable_len(), 2);
}

#[test]
fn test_engine_reads_span_memtable_and_segments() {
    let (_temp, engine) = setup_temp_engine_with_threshold(2);

    engine.set(b"a", b"old").unwrap();
    engine.set(b"b", b"1").unwrap();
    engine.set(b"a", b"mid").unwrap();
    engine.set(b"c", b"1").unwrap();
    engine.set(b"a", b"new").unwrap();
    engine.wait_for_flushes().unwrap();

    assert_eq!(engine.segment_count(), 2);
    assert_eq!(get_str(&engine, "a").as_deref(), Some("new"));
    assert_eq!(get_str(&engine, "b").as_deref(), Some("1"));
    assert_eq!(get_str(&engine, "c").as_deref(), Some("1"));
}

#[test]
fn test_engine_manual_flush() {
    let (temp, engine) = setup_temp_engine();
    engine.set(b"a", b"1").unwrap();
    engine.set(b"b", b"2").unwrap();

    engine.flush().unwrap();

    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.memtable_len(), 0);
    assert!(temp.path().join("segments").join("0").exists());
    assert_eq!(get_str(&engine, "b").as_deref(), Some("2"));
}

#[test]
fn test_engine_flush_with_empty_memtable() {
    let (_temp, engine) = setup_temp_engine();

    engine.flush().unwrap();

    assert_eq!(engine.segment_count(), 0);
    assert_eq!(engine.wal_generation(), 0);
}

#[test]
fn test_engine_compaction() {
    let (_temp, engine) = setup_temp_engine_with_threshold(2);
    engine.set(b"a", b"1").unwrap();
    engine.set(b"c", b"3").unwrap();
    engine.set(b"a", b"10").unwrap();
    engine.set(b"b", b"2").unwrap();
    engine.wait_for_flushes().unwrap();
    assert_eq!(engine.segment_count(), 2);

    assert!(engine.compact().unwrap());

    assert_eq!(engine.segments().segment_ids(), vec![0]);
    assert_eq!(get_str(&engine, "a").as_deref(), Some("10"));
    assert_eq!(get_str(&engine, "b").as_deref(), Some("2"));
    assert_eq!(get_str(&engine, "c").as_deref(), Some("3"));
    assert!(!engine.compact().unwrap());
}

#[test]
fn test_engine_compact_all() {
    let (_temp, engine) = setup_temp_engine_with_threshold(1);
    for i in 0..6 {
        engine.set(b"k", format!("v{}", i).as_bytes()).unwrap();
    }
    engine.wait_for_flushes().unwrap();

    let merges = engine.compact_all().unwrap();

    assert_eq!(merges, 5);
    assert_eq!(engine.segment_count(), 1);
    assert_eq!(get_str(&engine, "k").as_deref(), Some("v5"));
}

// =============================================================================
// Flush Failure Tests
// =============================================================================

#[test]
fn test_engine_flush_failure_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_with_threshold(temp_dir.path(), 2)).unwrap();
    fs::remove_dir_all(temp_dir.path().join("segments")).unwrap();

    engine.set(b"a", b"1").unwrap();
    engine.set(b"b", b"2").unwrap();
    engine.wait_for_flushes().unwrap();

    // Still served from the sealed memtable
    assert_eq!(get_str(&engine, "a").as_deref(), Some("1"));
    assert_eq!(engine.sealed_count(), 1);

    // Writes are refused and leave no trace
    assert!(matches!(engine.set(b"a", b"3"), Err(KvError::FlushPipeline(_))));
    assert_eq!(get_str(&engine, "a").as_deref(), Some("1"));
    assert_eq!(engine.memtable_len(), 0);

    assert!(matches!(engine.flush(), Err(KvError::SegmentIo { .. })));
    assert!(matches!(engine.flush(), Err(KvError::FlushPipeline(_))));
    assert!(temp_dir.path().join("wal").join("0.log").exists());
    drop(engine);

    // Recovery flushes the sealed log and accepts writes again
    let engine = Engine::open(config_with_threshold(temp_dir.path(), 2)).unwrap();
    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.wal_generation(), 1);
    assert_eq!(get_str(&engine, "a").as_deref(), Some("1"));
    assert_eq!(get_str(&engine, "b").as_deref(), Some("2"));
    engine.set(b"a", b"3").unwrap();
    assert_eq!(get_str(&engine, "a").as_deref(), Some("3"));
}

#[test]
fn test_engine_refuses_writes_after_flush_failure() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1)).unwrap();
    fs::remove_dir_all(temp_dir.path().join("segments")).unwrap();

    engine.set(b"k0", b"v").unwrap();
    engine.wait_for_flushes().unwrap();

    for i in 1..200 {
        let key = format!("k{}", i);
        let result = engine.set(key.as_bytes(), b"v");
        assert!(matches!(result, Err(KvError::FlushPipeline(_))), "set {}", i);
    }

    // No further memtables or logs pile up
    assert_eq!(engine.sealed_count(), 1);
    assert_eq!(engine.wal_generation(), 1);
    let wal_files = fs::read_dir(temp_dir.path().join("wal")).unwrap().count();
    assert_eq!(wal_files, 2);
}

#[test]
fn test_engine_take_flush_errors_drains() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1)).unwrap();
    fs::remove_dir_all(temp_dir.path().join("segments")).unwrap();

    engine.set(b"a", b"1").unwrap();
    engine.wait_for_flushes().unwrap();

    assert_eq!(engine.take_flush_errors().len(), 1);
    assert!(engine.take_flush_errors().is_empty());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_engine_recovery_from_wal() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
        engine.set(b"x", b"1").unwrap();
        engine.set(b"y", b"2").unwrap();
        engine.set(b"x", b"3").unwrap();
        // Dropped without close
    }

    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();

    assert_eq!(get_str(&engine, "x").as_deref(), Some("3"));
    assert_eq!(get_str(&engine, "y").as_deref(), Some("2"));
    assert_eq!(engine.memtable_len(), 2);
    assert_eq!(engine.segment_count(), 0);
}

#[test]
fn test_engine_recovery_does_not_duplicate_wal() {
    let temp_dir = TempDir::new().unwrap();
    let wal = temp_dir.path().join("wal").join("0.log");
    {
        let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
        engine.set(b"x", b"1").unwrap();
        engine.close().unwrap();
    }
    let before = fs::metadata(&wal).unwrap().len();

    for _ in 0..3 {
        let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
        engine.close().unwrap();
    }

    assert_eq!(fs::metadata(&wal).unwrap().len(), before);
}

#[test]
fn test_engine_recovery_of_sealed_wal() {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    fs::create_dir_all(&wal_dir).unwrap();
    // Generation 0 was sealed but its flush never finished
    fs::write(wal_dir.join("0.log"), b"b\x1f1\x1ea\x1f1").unwrap();
    fs::write(wal_dir.join("1.log"), b"a\x1f2\x1ec\x1f3").unwrap();

    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();

    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.wal_generation(), 1);
    assert!(!wal_dir.join("0.log").exists());
    assert_eq!(
        fs::read(temp_dir.path().join("segments").join("0")).unwrap(),
        b"a\x1f1\x1eb\x1f1".to_vec()
    );
    assert_eq!(get_str(&engine, "a").as_deref(), Some("2"));
    assert_eq!(get_str(&engine, "b").as_deref(), Some("1"));
    assert_eq!(get_str(&engine, "c").as_deref(), Some("3"));
}

#[test]
fn test_engine_recovery_after_flush() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_with_threshold(temp_dir.path(), 3)).unwrap();
        for i in 0..10 {
            let key = format!("key{}", i);
            engine.set(key.as_bytes(), b"v").unwrap();
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(config_with_threshold(temp_dir.path(), 3)).unwrap();

    assert_eq!(engine.segment_count(), 3);
    assert_eq!(engine.memtable_len(), 1);
    for i in 0..10 {
        assert_eq!(get_str(&engine, &format!("key{}", i)).as_deref(), Some("v"));
    }
}

#[test]
fn test_engine_recovery_with_torn_tail() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
        engine.set(b"a", b"1").unwrap();
        engine.close().unwrap();
    }
    let wal = temp_dir.path().join("wal").join("0.log");
    let mut bytes = fs::read(&wal).unwrap();
    bytes.extend_from_slice(b"\x1epartial");
    fs::write(&wal, bytes).unwrap();

    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
    engine.set(b"b", b"2").unwrap();
    engine.close().unwrap();

    let engine = Engine::open(config_with_threshold(temp_dir.path(), 1024)).unwrap();
    assert_eq!(get_str(&engine, "a").as_deref(), Some("1"));
    assert_eq!(get_str(&engine, "b").as_deref(), Some("2"));
    assert_eq!(engine.get(b"partial").unwrap(), None);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_engine_concurrent_writers_and_readers() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(config_with_threshold(temp_dir.path(), 50)).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{}-k{:03}", t, i);
                    let value = format!("v{}", i);
                    engine.set(key.as_bytes(), value.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t0-k{:03}", i);
                    // Either not written yet or the final value, never torn
                    if let Some(value) = engine.get(key.as_bytes()).unwrap() {
                        assert_eq!(value, format!("v{}", i).into_bytes());
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    engine.wait_for_flushes().unwrap();

    assert!(engine.take_flush_errors().is_empty());
    assert_eq!(engine.segment_count(), 16);
    for t in 0..4 {
        for i in 0..200 {
            let key = format!("t{}-k{:03}", t, i);
            assert_eq!(get_str(&engine, &key), Some(format!("v{}", i)));
        }
    }
}

#[test]
fn test_engine_concurrent_reads_during_compaction() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(config_with_threshold(temp_dir.path(), 10)).unwrap());
    for i in 0..100 {
        let key = format!("k{:03}", i);
        engine.set(key.as_bytes(), b"v").unwrap();
    }
    engine.wait_for_flushes().unwrap();

    let compactor = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.compact_all().unwrap())
    };
    for _ in 0..5 {
        for i in 0..100 {
            let key = format!("k{:03}", i);
            assert_eq!(get_str(&engine, &key).as_deref(), Some("v"));
        }
    }

    assert_eq!(compactor.join().unwrap(), 9);
    assert_eq!(engine.segment_count(), 1);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_close_keeps_unflushed_writes_in_wal() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_with_threshold(temp_dir.path(), 3)).unwrap();
        engine.set(b"a", b"1").unwrap();
        engine.set(b"b", b"2").unwrap();
        engine.set(b"c", b"3").unwrap();
        engine.set(b"d", b"4").unwrap();
        engine.close().unwrap();
    }

    // close waited for the queued flush
    let segment_dir = temp_dir.path().join("segments");
    assert!(segment_dir.join("0").exists());
    assert_eq!(
        fs::read(temp_dir.path().join("wal").join("1.log")).unwrap(),
        b"d\x1f4".to_vec()
    );
}
