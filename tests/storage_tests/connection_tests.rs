//! Tests for the connection state machine
//!
//! These tests verify:
//! - Nothing is created until the first write
//! - A missing file reads as empty without being created
//! - A deleted file is recreated empty on the next write
//! - Writes made through another handle are picked up
//! - A closed connection stays closed

use std::fs;
use std::path::PathBuf;

use collection_store::config::{Config, SyncStrategy};
use collection_store::storage::{Access, Connection, FileOptions, FileTable, Table};
use tempfile::TempDir;

fn setup_connection() -> (TempDir, PathBuf, Connection) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("collections.db");
    let config = Config::builder()
        .path(&path)
        .sync_strategy(SyncStrategy::OsManaged)
        .build();
    let connection = Connection::new(&config);
    (temp_dir, path, connection)
}

fn options() -> FileOptions {
    FileOptions {
        sync_strategy: SyncStrategy::OsManaged,
        ..FileOptions::default()
    }
}

#[test]
fn test_open_is_lazy() {
    let (_temp, path, mut connection) = setup_connection();

    assert!(!connection.is_open());
    assert!(!path.exists());

    connection.table(Access::Write).unwrap();

    assert!(connection.is_open());
    assert!(path.exists());
}

#[test]
fn test_read_of_missing_file_creates_nothing() {
    let (_temp, path, mut connection) = setup_connection();

    let table = connection.table(Access::Read).unwrap();
    assert_eq!(table.len(), 0);
    assert!(table.scan(None, 10).unwrap().is_empty());

    assert!(!connection.is_open());
    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());

    // The first write still creates it
    connection.table(Access::Write).unwrap().upsert(b"a", b"1").unwrap();
    assert!(path.exists());
    assert_eq!(connection.table(Access::Read).unwrap().len(), 1);
}

#[test]
fn test_deleted_file_reads_empty_until_next_write() {
    let (_temp, path, mut connection) = setup_connection();

    connection.table(Access::Write).unwrap().upsert(b"a", b"1").unwrap();
    fs::remove_file(&path).unwrap();

    let table = connection.table(Access::Read).unwrap();
    assert_eq!(table.len(), 0);
    assert!(table.lookup(&[b"a".as_slice()]).unwrap().is_empty());
    assert!(!path.exists());

    connection.table(Access::Write).unwrap().upsert(b"b", b"2").unwrap();
    assert!(path.exists());

    let table = connection.table(Access::Read).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.lookup(&[b"a".as_slice()]).unwrap().is_empty());
}

#[test]
fn test_emptied_file_is_recreated_on_write() {
    let (_temp, path, mut connection) = setup_connection();

    connection.table(Access::Write).unwrap().upsert(b"a", b"1").unwrap();
    fs::write(&path, b"").unwrap();

    assert_eq!(connection.table(Access::Read).unwrap().len(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);

    assert_eq!(connection.table(Access::Write).unwrap().len(), 0);
    assert!(fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn test_external_write_is_reloaded() {
    let (_temp, path, mut connection) = setup_connection();

    connection.table(Access::Write).unwrap().upsert(b"a", b"1").unwrap();

    {
        let mut other = FileTable::load(&path, options()).unwrap();
        other.upsert(b"b", b"2").unwrap();
    }

    let table = connection.table(Access::Read).unwrap();
    assert_eq!(table.len(), 2);
    let rows = table.lookup(&[b"b".as_slice()]).unwrap();
    assert_eq!(rows, vec![(b"b".to_vec(), b"2".to_vec())]);
}

#[test]
fn test_file_created_elsewhere_is_loaded() {
    let (_temp, path, mut connection) = setup_connection();

    assert_eq!(connection.table(Access::Read).unwrap().len(), 0);

    {
        let mut other = FileTable::create(&path, options()).unwrap();
        other.upsert(b"a", b"1").unwrap();
    }

    assert_eq!(connection.table(Access::Read).unwrap().len(), 1);
    assert!(connection.is_open());
}

#[test]
fn test_corrupt_file_fails_and_is_untouched() {
    let (_temp, path, mut connection) = setup_connection();

    connection.table(Access::Write).unwrap();
    fs::write(&path, b"blah").unwrap();

    let err = connection.table(Access::Read).err().unwrap();
    assert!(err.is_corrupt());
    assert_eq!(fs::read(&path).unwrap(), b"blah");

    // Writes fail the same way; never repaired
    assert!(connection.table(Access::Write).err().unwrap().is_corrupt());
    assert_eq!(fs::read(&path).unwrap(), b"blah");
}

#[test]
fn test_closed_connection_rejects() {
    let (_temp, path, mut connection) = setup_connection();

    connection.table(Access::Write).unwrap();
    connection.close();
    connection.close();

    assert!(connection.is_closed());
    assert!(connection.table(Access::Read).err().unwrap().is_closed());
    assert!(connection.table(Access::Write).err().unwrap().is_closed());

    // Closing never deletes the file
    assert!(path.exists());
}

#[test]
fn test_in_memory_connection() {
    let config = Config::builder().in_memory().build();
    let mut connection = Connection::new(&config);

    assert!(connection.location().is_in_memory());
    connection.table(Access::Write).unwrap().upsert(b"a", b"1").unwrap();
    assert_eq!(connection.table(Access::Read).unwrap().len(), 1);
}
