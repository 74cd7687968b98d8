//! Tests for the file-backed table
//!
//! These tests verify:
//! - Header creation and probing
//! - Upsert/lookup/delete and replay on load (last record wins)
//! - Scan pagination in key order
//! - The per-lookup key ceiling and key length limits
//! - Compaction keeps live rows and bumps the generation
//! - Corrupt headers and records are reported, not repaired

use std::fs;
use std::path::PathBuf;

use collection_store::config::SyncStrategy;
use collection_store::planner::MAX_KEYS_PER_LOOKUP;
use collection_store::storage::{
    FileOptions, FileTable, Header, MemoryTable, FileState, Row, Table, HEADER_SIZE, MAX_KEY_LEN,
    SCHEMA_VERSION,
};
use collection_store::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("table.db");
    (temp_dir, path)
}

fn fast_options() -> FileOptions {
    FileOptions {
        sync_strategy: SyncStrategy::OsManaged,
        ..FileOptions::default()
    }
}

fn key(i: usize) -> Vec<u8> {
    format!("key-{:04}", i).into_bytes()
}

fn lookup(table: &mut FileTable, keys: &[&str]) -> Vec<Row> {
    let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
    table.lookup(&refs).unwrap()
}

// =============================================================================
// Create / Inspect Tests
// =============================================================================

#[test]
fn test_inspect_missing() {
    let (_temp, path) = setup_temp_file();
    assert_eq!(FileTable::inspect(&path).unwrap(), FileState::Missing);
}

#[test]
fn test_inspect_empty_file() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"").unwrap();
    assert_eq!(FileTable::inspect(&path).unwrap(), FileState::Empty);
}

#[test]
fn test_create_writes_header() {
    let (_temp, path) = setup_temp_file();
    let table = FileTable::create(&path, fast_options()).unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE);
    assert_eq!(table.len(), 0);

    match FileTable::inspect(&path).unwrap() {
        FileState::Present(fingerprint) => {
            assert_eq!(fingerprint, table.fingerprint());
            assert_eq!(fingerprint.generation, 0);
        }
        other => panic!("expected Present, got {:?}", other),
    }
}

#[test]
fn test_inspect_garbage_is_corrupt() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"blah").unwrap();

    let err = FileTable::inspect(&path).unwrap_err();
    assert!(err.is_corrupt(), "expected CorruptStore, got {:?}", err);
}

#[test]
fn test_unsupported_version_is_corrupt() {
    let (_temp, path) = setup_temp_file();

    let mut header = Header::new(0, 0).encode();
    header[8..10].copy_from_slice(&(SCHEMA_VERSION + 1).to_le_bytes());
    let crc = crc32fast::hash(&header[..28]);
    header[28..32].copy_from_slice(&crc.to_le_bytes());
    fs::write(&path, header).unwrap();

    let err = FileTable::load(&path, fast_options()).err().unwrap();
    assert!(err.is_corrupt());
    assert!(err.to_string().contains("unsupported schema version"));
}

// =============================================================================
// Read / Write Tests
// =============================================================================

#[test]
fn test_upsert_and_lookup() {
    let (_temp, path) = setup_temp_file();
    let mut table = FileTable::create(&path, fast_options()).unwrap();

    table.upsert(b"alpha", b"one").unwrap();
    table.upsert(b"beta", b"two").unwrap();

    let rows = lookup(&mut table, &["alpha", "missing", "beta"]);
    assert_eq!(
        rows,
        vec![
            (b"alpha".to_vec(), b"one".to_vec()),
            (b"beta".to_vec(), b"two".to_vec())
        ]
    );
}

#[test]
fn test_load_replays_last_record_wins() {
    let (_temp, path) = setup_temp_file();

    {
        let mut table = FileTable::create(&path, fast_options()).unwrap();
        table.upsert(b"a", b"first").unwrap();
        table.upsert(b"b", b"keep").unwrap();
        table.upsert(b"a", b"second").unwrap();
        table.upsert(b"c", b"gone").unwrap();
        assert!(table.delete(b"c").unwrap());
    }

    let mut table = FileTable::load(&path, fast_options()).unwrap();
    assert_eq!(table.len(), 2);

    let rows = lookup(&mut table, &["a", "b", "c"]);
    assert_eq!(
        rows,
        vec![
            (b"a".to_vec(), b"second".to_vec()),
            (b"b".to_vec(), b"keep".to_vec())
        ]
    );
}

#[test]
fn test_delete_missing_key_writes_nothing() {
    let (_temp, path) = setup_temp_file();
    let mut table = FileTable::create(&path, fast_options()).unwrap();

    assert!(!table.delete(b"nothing").unwrap());
    assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE);
}

#[test]
fn test_scan_pages_in_key_order() {
    let (_temp, path) = setup_temp_file();
    let mut table = FileTable::create(&path, fast_options()).unwrap();

    for i in (0..10).rev() {
        table.upsert(&key(i), b"v").unwrap();
    }

    let mut seen = Vec::new();
    let mut after: Option<Vec<u8>> = None;
    loop {
        let page = table.scan(after.as_deref(), 4).unwrap();
        if page.is_empty() {
            break;
        }
        after = page.last().map(|(k, _)| k.clone());
        seen.extend(page.into_iter().map(|(k, _)| k));
    }

    let expected: Vec<Vec<u8>> = (0..10).map(key).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_lookup_over_ceiling_rejected() {
    let (_temp, path) = setup_temp_file();
    let mut file_table = FileTable::create(&path, fast_options()).unwrap();
    let mut memory_table = MemoryTable::new();

    let keys: Vec<Vec<u8>> = (0..MAX_KEYS_PER_LOOKUP + 1).map(key).collect();
    let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();

    let tables: [&mut dyn Table; 2] = [&mut file_table, &mut memory_table];
    for table in tables {
        let err = table.lookup(&refs).unwrap_err();
        assert!(matches!(
            err,
            StoreError::TooManyKeys { requested, limit }
                if requested == MAX_KEYS_PER_LOOKUP + 1 && limit == MAX_KEYS_PER_LOOKUP
        ));
        assert!(table.lookup(&refs[..MAX_KEYS_PER_LOOKUP]).is_ok());
    }
}

#[test]
fn test_upsert_rejects_invalid_keys() {
    let (_temp, path) = setup_temp_file();
    let mut file_table = FileTable::create(&path, fast_options()).unwrap();
    let mut memory_table = MemoryTable::new();

    let too_long = vec![b'k'; MAX_KEY_LEN as usize + 1];
    let tables: [&mut dyn Table; 2] = [&mut file_table, &mut memory_table];
    for table in tables {
        for key in [&b""[..], &too_long[..]] {
            let err = table.upsert(key, b"v").unwrap_err();
            assert!(err.is_invalid_key(), "expected InvalidKey, got {:?}", err);
        }
        assert_eq!(table.len(), 0);
    }

    // Nothing reached the file
    assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE);
}

#[test]
fn test_longest_key_survives_reload() {
    let (_temp, path) = setup_temp_file();
    let longest = vec![b'k'; MAX_KEY_LEN as usize];

    {
        let mut table = FileTable::create(&path, fast_options()).unwrap();
        table.upsert(&longest, b"v").unwrap();
    }

    let mut table = FileTable::load(&path, fast_options()).unwrap();
    let rows = table.lookup(&[longest.as_slice()]).unwrap();
    assert_eq!(rows, vec![(longest, b"v".to_vec())]);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_failed_compaction_keeps_writes() {
    let (_temp, path) = setup_temp_file();
    let options = FileOptions {
        sync_strategy: SyncStrategy::OsManaged,
        compaction_threshold: 0.1,
        compaction_min_bytes: 0,
    };
    fs::create_dir(path.with_extension("db.compact")).unwrap();

    let mut table = FileTable::create(&path, options).unwrap();
    for round in 0..3u8 {
        table.upsert(b"a", &[round; 64]).unwrap();
    }
    table.upsert(b"b", b"other").unwrap();
    assert!(table.delete(b"b").unwrap());

    assert_eq!(table.header().generation, 0);
    assert!(table.compact().is_err());
    assert_eq!(lookup(&mut table, &["a"]), vec![(b"a".to_vec(), vec![2u8; 64])]);

    drop(table);
    let mut reloaded = FileTable::load(&path, options).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(lookup(&mut reloaded, &["a"]), vec![(b"a".to_vec(), vec![2u8; 64])]);
}


#[test]
fn test_compaction_keeps_live_rows() {
    let (_temp, path) = setup_temp_file();
    let options = FileOptions {
        sync_strategy: SyncStrategy::OsManaged,
        compaction_threshold: 0.5,
        compaction_min_bytes: 4 * 1024,
    };
    let mut table = FileTable::create(&path, options).unwrap();

    let value = vec![7u8; 256];
    for round in 0..10 {
        for i in 0..8 {
            let mut v = value.clone();
            v[0] = round as u8;
            table.upsert(&key(i), &v).unwrap();
        }
    }

    let stats = table.stats();
    assert!(stats.generation > 0, "expected at least one compaction");
    assert_eq!(stats.entry_count, 8);
    assert!(stats.total_bytes < 10 * 8 * 256);

    let rows = table.scan(None, 100).unwrap();
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|(_, v)| v[0] == 9));

    // The compacted file loads on its own
    drop(table);
    let mut reloaded = FileTable::load(&path, options).unwrap();
    assert_eq!(reloaded.len(), 8);
    assert_eq!(reloaded.header().generation, stats.generation);
    assert_eq!(lookup(&mut reloaded, &["key-0003"])[0].1[0], 9);
}

#[test]
fn test_explicit_compact_bumps_generation() {
    let (_temp, path) = setup_temp_file();
    let mut table = FileTable::create(&path, fast_options()).unwrap();

    table.upsert(b"a", b"1").unwrap();
    table.upsert(b"a", b"2").unwrap();
    table.upsert(b"b", b"3").unwrap();
    table.delete(b"b").unwrap();

    table.compact().unwrap();

    assert_eq!(table.header().generation, 1);
    assert_eq!(table.stats().total_bytes, fs::metadata(&path).unwrap().len());
    assert_eq!(lookup(&mut table, &["a"]), vec![(b"a".to_vec(), b"2".to_vec())]);
    assert!(!path.with_extension("db.compact").exists());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_truncated_record_is_corrupt() {
    let (_temp, path) = setup_temp_file();
    {
        let mut table = FileTable::create(&path, fast_options()).unwrap();
        table.upsert(b"a", b"some value").unwrap();
    }

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    let err = FileTable::load(&path, fast_options()).err().unwrap();
    assert!(err.is_corrupt());
    assert!(err.to_string().contains("truncated record"));
}

#[test]
fn test_checksum_mismatch_is_corrupt() {
    let (_temp, path) = setup_temp_file();
    {
        let mut table = FileTable::create(&path, fast_options()).unwrap();
        table.upsert(b"a", b"some value").unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = FileTable::load(&path, fast_options()).err().unwrap();
    assert!(err.is_corrupt());
    assert!(err.to_string().contains("checksum mismatch"));
    // Loader does not touch the file
    assert_eq!(fs::read(&path).unwrap(), bytes);
}
