//! Tests for the block store implementations
//!
//! These tests verify:
//! - Area allocation, positioned reads/writes and deletion
//! - Bounds checking
//! - File-backed persistence and id discovery on reopen
//! - Checksum validation of area files

use std::fs;
use std::sync::Arc;

use lobstore::block::NULL_AREA;
use lobstore::{BlockStore, FileBlockStore, LobError, MemoryBlockStore, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_file_store() -> (TempDir, FileBlockStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileBlockStore::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap();
    (temp_dir, store)
}

/// Shared behaviour checks run against any implementation
fn exercise_basic_operations(store: &dyn BlockStore) {
    let id = store.create_area(16).unwrap();
    assert!(id > 0);
    assert_ne!(id, NULL_AREA);
    assert!(store.contains(id));
    assert_eq!(store.area_size(id).unwrap(), 16);
    assert_eq!(store.read_area(id).unwrap(), vec![0u8; 16]);

    store.write_at(id, 4, b"abcd").unwrap();
    assert_eq!(store.read_at(id, 4, 4).unwrap(), b"abcd");
    assert_eq!(&store.read_area(id).unwrap()[..8], b"\0\0\0\0abcd");

    store.delete_area(id).unwrap();
    assert!(!store.contains(id));
}

// =============================================================================
// Memory Store Tests
// =============================================================================

#[test]
fn test_memory_basic_operations() {
    let store = MemoryBlockStore::new();
    exercise_basic_operations(&store);
    assert_eq!(store.area_count(), 0);
}

#[test]
fn test_memory_ids_are_not_reused() {
    let store = MemoryBlockStore::new();

    let first = store.create_area(8).unwrap();
    store.delete_area(first).unwrap();
    let second = store.create_area(8).unwrap();

    assert_ne!(first, second);
}

#[test]
fn test_memory_out_of_bounds_write_fails() {
    let store = MemoryBlockStore::new();
    let id = store.create_area(8).unwrap();

    let result = store.write_at(id, 6, b"abcd");

    assert!(matches!(result, Err(LobError::Storage(_))));
    assert_eq!(store.read_area(id).unwrap(), vec![0u8; 8]);
}

#[test]
fn test_memory_missing_area_is_storage_error() {
    let store = MemoryBlockStore::new();

    let err = store.read_area(42).unwrap_err();

    assert!(err.is_storage_io());
    assert!(matches!(store.delete_area(42), Err(LobError::Storage(_))));
}

#[test]
fn test_memory_allocated_bytes() {
    let store = MemoryBlockStore::new();
    store.create_area(100).unwrap();
    let id = store.create_area(50).unwrap();

    assert_eq!(store.allocated_bytes(), 150);

    store.delete_area(id).unwrap();
    assert_eq!(store.allocated_bytes(), 100);
}

#[test]
fn test_checkpoint_lock_is_exclusive() {
    let store = Arc::new(MemoryBlockStore::new());
    let guard = store.lock();

    let other = Arc::clone(&store);
    let handle = std::thread::spawn(move || {
        let _guard = other.lock();
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!handle.is_finished());

    drop(guard);
    handle.join().unwrap();
}

// =============================================================================
// File Store Tests
// =============================================================================

#[test]
fn test_file_basic_operations() {
    let (_temp, store) = setup_file_store();
    exercise_basic_operations(&store);
}

#[test]
fn test_file_area_naming() {
    let (_temp, store) = setup_file_store();

    let id = store.create_area(4).unwrap();

    let path = store.area_path(id);
    assert!(path.exists());
    assert_eq!(path.file_name().unwrap(), "area_00000001.blk");
}

#[test]
fn test_file_reopen_discovers_areas() {
    let temp_dir = TempDir::new().unwrap();

    let (a, b) = {
        let store = FileBlockStore::open(temp_dir.path(), SyncStrategy::OnCheckpoint).unwrap();
        let a = store.create_area(8).unwrap();
        let b = store.create_area(8).unwrap();
        store.write_at(b, 0, b"persist!").unwrap();
        store.sync().unwrap();
        (a, b)
    };

    let store = FileBlockStore::open(temp_dir.path(), SyncStrategy::OnCheckpoint).unwrap();

    assert_eq!(store.area_count(), 2);
    assert!(store.contains(a));
    assert_eq!(store.read_area(b).unwrap(), b"persist!");
    assert_eq!(store.next_area_id(), 3); // Continues from max + 1
}

#[test]
fn test_file_ignores_unrelated_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("notes.txt"), b"hello").unwrap();
    fs::write(temp_dir.path().join("area_xyz.blk"), b"junk").unwrap();

    let store = FileBlockStore::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap();

    assert_eq!(store.area_count(), 0);
    assert_eq!(store.next_area_id(), 1);
}

#[test]
fn test_file_checksum_mismatch_is_content_error() {
    let (_temp, store) = setup_file_store();
    let id = store.create_area(8).unwrap();
    store.write_at(id, 0, b"12345678").unwrap();

    // Flip one data byte behind the 12-byte area header
    let path = store.area_path(id);
    let mut raw = fs::read(&path).unwrap();
    raw[12] ^= 0xFF;
    fs::write(&path, raw).unwrap();

    let result = store.read_area(id);
    assert!(matches!(result, Err(LobError::Content(_))));
}

#[test]
fn test_file_truncated_area_is_content_error() {
    let (_temp, store) = setup_file_store();
    let id = store.create_area(8).unwrap();

    let path = store.area_path(id);
    let raw = fs::read(&path).unwrap();
    fs::write(&path, &raw[..raw.len() - 2]).unwrap();

    assert!(matches!(store.read_area(id), Err(LobError::Content(_))));
}

#[test]
fn test_file_delete_removes_file() {
    let (_temp, store) = setup_file_store();
    let id = store.create_area(8).unwrap();
    let path = store.area_path(id);

    store.delete_area(id).unwrap();

    assert!(!path.exists());
    assert!(matches!(store.read_area(id), Err(LobError::Storage(_))));
}
