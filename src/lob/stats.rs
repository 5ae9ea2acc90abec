//! Store statistics
//!
//! Lock-free counters updated on every structural operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a `LargeObjectStore`
#[derive(Debug, Default)]
pub struct StoreStats {
    objects_created: AtomicU64,
    objects_completed: AtomicU64,
    objects_destroyed: AtomicU64,
    parts_written: AtomicU64,
    parts_read: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    slots_recycled: AtomicU64,
    directory_growths: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub objects_created: u64,
    pub objects_completed: u64,
    pub objects_destroyed: u64,
    /// `write_object_part` calls that stored a page
    pub parts_written: u64,
    /// `read_object_part` calls that returned data
    pub parts_read: u64,
    /// Uncompressed bytes accepted by `write_object_part`
    pub bytes_written: u64,
    /// Bytes returned by `read_object_part`
    pub bytes_read: u64,
    pub slots_recycled: u64,
    pub directory_growths: u64,
}

impl StoreStats {
    pub(crate) fn object_created(&self) {
        self.objects_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn object_completed(&self) {
        self.objects_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn object_destroyed(&self) {
        self.objects_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn part_written(&self, bytes: usize) {
        self.parts_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn part_read(&self, bytes: usize) {
        self.parts_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn slot_recycled(&self) {
        self.slots_recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn directory_grown(&self) {
        self.directory_growths.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            objects_created: self.objects_created.load(Ordering::Relaxed),
            objects_completed: self.objects_completed.load(Ordering::Relaxed),
            objects_destroyed: self.objects_destroyed.load(Ordering::Relaxed),
            parts_written: self.parts_written.load(Ordering::Relaxed),
            parts_read: self.parts_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            slots_recycled: self.slots_recycled.load(Ordering::Relaxed),
            directory_growths: self.directory_growths.load(Ordering::Relaxed),
        }
    }
}
