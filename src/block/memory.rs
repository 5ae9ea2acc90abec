//! In-memory block store

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::LobError;

use super::{check_range, AreaId, BlockStore, CheckpointGuard};

/// Block store keeping every area in memory
pub struct MemoryBlockStore {
    /// Live areas by id
    areas: RwLock<HashMap<AreaId, Vec<u8>>>,

    /// Next id to hand out (ids start at 1)
    next_area_id: AtomicI64,

    /// Checkpoint lock
    checkpoint: Mutex<()>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            areas: RwLock::new(HashMap::new()),
            next_area_id: AtomicI64::new(1),
            checkpoint: Mutex::new(()),
        }
    }

    /// Total bytes held across all areas (for testing/debugging)
    pub fn allocated_bytes(&self) -> usize {
        self.areas.read().values().map(Vec::len).sum()
    }

    fn missing(id: AreaId) -> LobError {
        LobError::Storage(format!("Area {} does not exist", id))
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn create_area(&self, size: usize) -> Result<AreaId> {
        let id = self.next_area_id.fetch_add(1, Ordering::SeqCst);
        self.areas.write().insert(id, vec![0u8; size]);
        Ok(id)
    }

    fn read_area(&self, id: AreaId) -> Result<Vec<u8>> {
        self.areas
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::missing(id))
    }

    fn read_at(&self, id: AreaId, offset: usize, len: usize) -> Result<Vec<u8>> {
        let areas = self.areas.read();
        let area = areas.get(&id).ok_or_else(|| Self::missing(id))?;
        check_range(id, area.len(), offset, len)?;
        Ok(area[offset..offset + len].to_vec())
    }

    fn write_at(&self, id: AreaId, offset: usize, data: &[u8]) -> Result<()> {
        let mut areas = self.areas.write();
        let area = areas.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        check_range(id, area.len(), offset, data.len())?;
        area[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn area_size(&self, id: AreaId) -> Result<usize> {
        self.areas
            .read()
            .get(&id)
            .map(Vec::len)
            .ok_or_else(|| Self::missing(id))
    }

    fn delete_area(&self, id: AreaId) -> Result<()> {
        self.areas
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::missing(id))
    }

    fn contains(&self, id: AreaId) -> bool {
        self.areas.read().contains_key(&id)
    }

    fn area_count(&self) -> usize {
        self.areas.read().len()
    }

    fn lock(&self) -> CheckpointGuard<'_> {
        CheckpointGuard::new(self.checkpoint.lock())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
