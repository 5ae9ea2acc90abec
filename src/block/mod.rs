//! Block Store Module
//!
//! Opaque, independently addressable byte areas that the large object store
//! and the descriptor directory are built on.
//!
//! ## Responsibilities
//! - Allocate fixed-size, zero-filled areas identified by an `AreaId`
//! - Positioned reads and writes inside an area
//! - Area deletion
//! - A store-wide checkpoint lock bracketing multi-step structural updates
//!
//! Two implementations are provided:
//! - [`MemoryBlockStore`]: areas in a `HashMap`, for tests and embedding
//! - [`FileBlockStore`]: one checksummed file per area under a data directory

mod file;
mod memory;

use parking_lot::MutexGuard;

use crate::error::Result;

pub use file::FileBlockStore;
pub use memory::MemoryBlockStore;

/// Identifier of an area. Valid ids are positive; `-1` is the on-disk null.
pub type AreaId = i64;

/// Sentinel used in on-disk pointers for "no area"
pub const NULL_AREA: AreaId = -1;

/// Storage backend consumed by the directory and the large object store
///
/// ## Concurrency:
/// All methods take `&self`; implementations synchronize internally.
/// Writers to the *same* area must be serialized by the caller.
pub trait BlockStore: Send + Sync {
    /// Allocate a zero-filled area of exactly `size` bytes
    fn create_area(&self, size: usize) -> Result<AreaId>;

    /// Read the full contents of an area
    fn read_area(&self, id: AreaId) -> Result<Vec<u8>>;

    /// Read `len` bytes starting at `offset`
    fn read_at(&self, id: AreaId, offset: usize, len: usize) -> Result<Vec<u8>>;

    /// Overwrite bytes starting at `offset`; the area never grows
    fn write_at(&self, id: AreaId, offset: usize, data: &[u8]) -> Result<()>;

    /// Size in bytes of an area
    fn area_size(&self, id: AreaId) -> Result<usize>;

    /// Delete an area; its id is never handed out again
    fn delete_area(&self, id: AreaId) -> Result<()>;

    /// Whether an area with this id currently exists
    fn contains(&self, id: AreaId) -> bool;

    /// Number of live areas
    fn area_count(&self) -> usize;

    /// Acquire the checkpoint lock; released when the guard drops
    fn lock(&self) -> CheckpointGuard<'_>;

    /// Make all completed writes durable
    fn sync(&self) -> Result<()>;
}

/// RAII guard for the block store's checkpoint lock
pub struct CheckpointGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl<'a> CheckpointGuard<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, ()>) -> Self {
        Self { _guard: guard }
    }
}

/// Bounds check shared by both implementations
pub(crate) fn check_range(id: AreaId, size: usize, offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(crate::LobError::Storage(format!(
            "Access out of bounds on area {}: offset {} + len {} > size {}",
            id, offset, len, size
        ))),
    }
}
