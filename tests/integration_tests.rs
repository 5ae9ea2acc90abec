//! End-to-end tests over the file-backed store

use std::io::{Read, Write};
use std::sync::Arc;

use lobstore::directory::SlotState;
use lobstore::manifest::MANIFEST_FILENAME;
use lobstore::{open_file_store, Config, LobError, Manifest, ObjectStream, SyncStrategy, PAGE_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .sync_strategy(SyncStrategy::OnCheckpoint)
        .slots_per_block(4)
        .build()
}

fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 199) as u8).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_open_creates_manifest() {
    let temp_dir = TempDir::new().unwrap();

    assert!(Manifest::load(temp_dir.path()).unwrap().is_none());
    let store = open_file_store(&test_config(&temp_dir)).unwrap();

    let manifest = Manifest::load(temp_dir.path()).unwrap().unwrap();
    assert_eq!(manifest.header_id, store.header_id());
    assert_eq!(manifest.created_by, lobstore::VERSION);
    assert!(temp_dir.path().join(MANIFEST_FILENAME).exists());
}

#[test]
fn test_objects_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let data = sample_data(PAGE_SIZE * 2 + 500);

    let id = {
        let store = open_file_store(&config).unwrap();
        let object = store.create_object(data.len() as i64, true).unwrap();
        let id = object.id();
        let mut stream = ObjectStream::new(Arc::clone(&store), object);
        stream.write_all(&data).unwrap();
        stream.complete().unwrap();
        store.establish_reference(id).unwrap();
        store.sync().unwrap();
        id
    };

    let store = open_file_store(&config).unwrap();
    let object = store.get_object(id).unwrap();
    assert!(object.is_complete());
    assert!(object.is_compressed());

    let mut out = Vec::new();
    ObjectStream::new(Arc::clone(&store), object)
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, data);
    assert!(matches!(
        store.descriptor(id).unwrap().state,
        SlotState::Complete { ref_count: 1, .. }
    ));
}

#[test]
fn test_delete_chain_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let freed = {
        let store = open_file_store(&config).unwrap();
        let mut keep = store.create_object(3, false).unwrap();
        store.write_object_part(&mut keep, 0, b"abc").unwrap();
        store.complete(&mut keep).unwrap();

        let mut gone = store.create_object(3, false).unwrap();
        store.write_object_part(&mut gone, 0, b"xyz").unwrap();
        store.complete(&mut gone).unwrap();
        let acquired = store.acquire(gone.id()).unwrap();
        assert!(acquired.release().unwrap());
        gone.id()
    };

    let store = open_file_store(&config).unwrap();

    assert_eq!(store.free_slot_count().unwrap(), 3);
    assert_eq!(store.create_object(1, false).unwrap().id(), freed);
}

#[test]
fn test_destroy_removes_area_files() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_file_store(&test_config(&temp_dir)).unwrap();
    store.create_object(0, false).unwrap(); // grow directory first
    let baseline = store.blocks().area_count();

    let object = store.create_object(PAGE_SIZE as i64 * 2, false).unwrap();
    let id = object.id();
    let mut stream = ObjectStream::new(Arc::clone(&store), object);
    stream.write_all(&sample_data(PAGE_SIZE * 2)).unwrap();
    stream.complete().unwrap();
    assert_eq!(store.blocks().area_count(), baseline + 3);

    let reference = store.acquire(id).unwrap();
    drop(reference);

    assert_eq!(store.blocks().area_count(), baseline);
}

#[test]
fn test_areas_without_manifest_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    open_file_store(&config).unwrap();
    std::fs::remove_file(temp_dir.path().join(MANIFEST_FILENAME)).unwrap();

    let result = open_file_store(&config);

    assert!(matches!(result, Err(LobError::Format(_))));
}
