//! Tests for failure handling against a faulty block store
//!
//! These tests verify:
//! - A failed last release can be retried to completion
//! - Orphaned areas are freed when object creation or a page write fails
//! - Directory growth survives a failed delete of the replaced block table

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use lobstore::block::CheckpointGuard;
use lobstore::directory::{Descriptor, Directory, SlotState};
use lobstore::{
    AreaId, BlockStore, Config, LargeObjectStore, LobError, MemoryBlockStore, Result, PAGE_SIZE,
};

// =============================================================================
// Faulty Block Store
// =============================================================================

/// Memory block store that fails one chosen delete or write
struct FaultyBlockStore {
    inner: MemoryBlockStore,

    /// Deletes that succeed before one fails; negative when disarmed
    deletes_before_fault: AtomicI64,

    /// Writes that succeed before one fails; negative when disarmed
    writes_before_fault: AtomicI64,
}

impl FaultyBlockStore {
    fn new() -> Self {
        Self {
            inner: MemoryBlockStore::new(),
            deletes_before_fault: AtomicI64::new(-1),
            writes_before_fault: AtomicI64::new(-1),
        }
    }

    fn fail_delete_after(&self, successes: i64) {
        self.deletes_before_fault.store(successes, Ordering::SeqCst);
    }

    fn fail_write_after(&self, successes: i64) {
        self.writes_before_fault.store(successes, Ordering::SeqCst);
    }

    fn trips(counter: &AtomicI64) -> bool {
        match counter.load(Ordering::SeqCst) {
            n if n < 0 => false,
            0 => {
                counter.store(-1, Ordering::SeqCst);
                true
            }
            n => {
                counter.store(n - 1, Ordering::SeqCst);
                false
            }
        }
    }
}

impl BlockStore for FaultyBlockStore {
    fn create_area(&self, size: usize) -> Result<AreaId> {
        self.inner.create_area(size)
    }

    fn read_area(&self, id: AreaId) -> Result<Vec<u8>> {
        self.inner.read_area(id)
    }

    fn read_at(&self, id: AreaId, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.inner.read_at(id, offset, len)
    }

    fn write_at(&self, id: AreaId, offset: usize, data: &[u8]) -> Result<()> {
        if Self::trips(&self.writes_before_fault) {
            return Err(LobError::Storage(format!("injected write fault on area {}", id)));
        }
        self.inner.write_at(id, offset, data)
    }

    fn area_size(&self, id: AreaId) -> Result<usize> {
        self.inner.area_size(id)
    }

    fn delete_area(&self, id: AreaId) -> Result<()> {
        if Self::trips(&self.deletes_before_fault) {
            return Err(LobError::Storage(format!("injected delete fault on area {}", id)));
        }
        self.inner.delete_area(id)
    }

    fn contains(&self, id: AreaId) -> bool {
        self.inner.contains(id)
    }

    fn area_count(&self) -> usize {
        self.inner.area_count()
    }

    fn lock(&self) -> CheckpointGuard<'_> {
        self.inner.lock()
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Store over a faulty block store, with the directory already grown
fn setup_store() -> (Arc<FaultyBlockStore>, LargeObjectStore) {
    let faulty = Arc::new(FaultyBlockStore::new());
    let blocks: Arc<dyn BlockStore> = faulty.clone();
    let config = Config::builder().slots_per_block(4).build();
    let (store, _header_id) = LargeObjectStore::create(blocks, &config).unwrap();
    store.create_object(0, false).unwrap();
    (faulty, store)
}

fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 241) as u8).collect()
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn test_failed_release_can_be_retried() {
    let (faulty, store) = setup_store();
    let baseline = faulty.area_count();

    let data = sample_data(PAGE_SIZE * 2);
    let mut object = store.create_object(data.len() as i64, false).unwrap();
    store.write_object_part(&mut object, 0, &data[..PAGE_SIZE]).unwrap();
    store
        .write_object_part(&mut object, PAGE_SIZE as u64, &data[PAGE_SIZE..])
        .unwrap();
    store.complete(&mut object).unwrap();
    store.establish_reference(object.id()).unwrap();
    assert_eq!(faulty.area_count(), baseline + 3);

    faulty.fail_delete_after(1);
    let err = store.release_reference(object.id()).unwrap_err();

    assert!(err.is_storage_io());
    assert!(matches!(
        store.descriptor(object.id()).unwrap().state,
        SlotState::Complete { ref_count: 1, .. }
    ));
    assert_eq!(faulty.area_count(), baseline + 2);

    assert!(store.release_reference(object.id()).unwrap());
    assert!(store.descriptor(object.id()).unwrap().is_deleted());
    assert_eq!(faulty.area_count(), baseline);
    assert_eq!(store.free_slot_count().unwrap(), 3);
}

#[test]
fn test_failed_header_delete_can_be_retried() {
    let (faulty, store) = setup_store();
    let baseline = faulty.area_count();

    let mut object = store.create_object(10, false).unwrap();
    store.write_object_part(&mut object, 0, b"0123456789").unwrap();
    store.complete(&mut object).unwrap();
    store.establish_reference(object.id()).unwrap();

    // The page delete succeeds, the header delete fails
    faulty.fail_delete_after(1);
    assert!(store.release_reference(object.id()).is_err());
    assert_eq!(faulty.area_count(), baseline + 1);

    assert!(store.release_reference(object.id()).unwrap());
    assert_eq!(faulty.area_count(), baseline);
}

#[test]
fn test_release_resumes_after_failed_pointer_update() {
    let (faulty, store) = setup_store();
    let baseline = faulty.area_count();

    let data = sample_data(PAGE_SIZE + 1);
    let mut object = store.create_object(data.len() as i64, true).unwrap();
    store.write_object_part(&mut object, 0, &data[..PAGE_SIZE]).unwrap();
    store
        .write_object_part(&mut object, PAGE_SIZE as u64, &data[PAGE_SIZE..])
        .unwrap();
    store.complete(&mut object).unwrap();
    store.establish_reference(object.id()).unwrap();

    // First page is freed but its pointer stays in the header
    faulty.fail_write_after(0);
    assert!(store.release_reference(object.id()).is_err());
    assert_eq!(faulty.area_count(), baseline + 2);

    assert!(store.release_reference(object.id()).unwrap());
    assert_eq!(faulty.area_count(), baseline);
    assert_eq!(store.stats().objects_destroyed, 1);
}

// =============================================================================
// Creation and Write Cleanup Tests
// =============================================================================

#[test]
fn test_failed_create_frees_header() {
    let (faulty, store) = setup_store();
    let baseline = faulty.area_count();
    let free = store.free_slot_count().unwrap();

    faulty.fail_write_after(0);
    let err = store.create_object(100, false).unwrap_err();

    assert!(err.is_storage_io());
    assert_eq!(faulty.area_count(), baseline);
    assert_eq!(store.free_slot_count().unwrap(), free);

    let object = store.create_object(100, false).unwrap();
    assert_eq!(object.id(), 1);
}

#[test]
fn test_failed_page_publish_frees_page() {
    let (faulty, store) = setup_store();
    let mut object = store.create_object(PAGE_SIZE as i64, false).unwrap();
    let baseline = faulty.area_count();

    // Page content write succeeds, pointer publish fails
    faulty.fail_write_after(1);
    let err = store
        .write_object_part(&mut object, 0, b"first attempt")
        .unwrap_err();

    assert!(err.is_storage_io());
    assert_eq!(faulty.area_count(), baseline);
    assert_eq!(object.current_size(), 0);

    store.write_object_part(&mut object, 0, b"second attempt").unwrap();
    store.complete(&mut object).unwrap();

    let mut buf = vec![0u8; b"second attempt".len()];
    store.read_object_part(&object, 0, &mut buf).unwrap();
    assert_eq!(buf, b"second attempt");
}

// =============================================================================
// Directory Growth Tests
// =============================================================================

#[test]
fn test_growth_survives_failed_table_delete() {
    let faulty = Arc::new(FaultyBlockStore::new());
    let blocks: Arc<dyn BlockStore> = faulty.clone();
    let mut directory = Directory::create(Arc::clone(&blocks), 2).unwrap();
    directory.increase_size().unwrap();

    faulty.fail_delete_after(0);
    assert_eq!(directory.increase_size().unwrap(), 1);

    assert_eq!(directory.block_count(), 2);
    assert_eq!(directory.node_count(), 4);
    directory.write_record(3, &Descriptor::deleted(2)).unwrap();

    let reopened = Directory::open(blocks, directory.root_id()).unwrap();
    assert_eq!(reopened.block_count(), 2);
    assert_eq!(
        reopened.read_record(3).unwrap().state,
        SlotState::Deleted { next: 2 }
    );
}
