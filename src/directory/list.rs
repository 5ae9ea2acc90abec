//! Fixed-slot list
//!
//! Blocks of `slots_per_block` slots, each block its own area. Slot `i`
//! lives in block `i / slots_per_block`.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, warn};

use crate::block::{AreaId, BlockStore, NULL_AREA};
use crate::error::Result;
use crate::LobError;

use super::{Descriptor, END_OF_CHAIN, SLOT_SIZE};

/// Magic number of the directory root area ("LDIR")
const DIRECTORY_MAGIC: i32 = 0x4C44_4952;

/// Root size: magic (4) + slots per block (4) + block count (8)
/// + delete head (8) + table area (8)
const ROOT_SIZE: usize = 32;

const BLOCK_COUNT_OFFSET: usize = 8;
const DELETE_HEAD_OFFSET: usize = 16;
const TABLE_AREA_OFFSET: usize = 24;

/// Persistent descriptor directory
///
/// Not synchronized: the owning store keeps it behind its directory mutex.
pub struct Directory {
    blocks: Arc<dyn BlockStore>,

    /// Root area id (persisted in the store header)
    root: AreaId,

    slots_per_block: u32,

    /// Area id of each block, in index order
    block_areas: Vec<AreaId>,

    /// Area listing `block_areas`, `NULL_AREA` while empty
    table_area: AreaId,

    /// Cached copy of the persisted delete head
    delete_head: i64,
}

impl Directory {
    /// Create an empty directory with an empty delete chain
    pub fn create(blocks: Arc<dyn BlockStore>, slots_per_block: u32) -> Result<Self> {
        let root = blocks.create_area(ROOT_SIZE)?;

        let mut buf = BytesMut::with_capacity(ROOT_SIZE);
        buf.put_i32_le(DIRECTORY_MAGIC);
        buf.put_i32_le(slots_per_block as i32);
        buf.put_i64_le(0);
        buf.put_i64_le(END_OF_CHAIN);
        buf.put_i64_le(NULL_AREA);
        blocks.write_at(root, 0, &buf)?;

        debug!(root, slots_per_block, "created descriptor directory");

        Ok(Self {
            blocks,
            root,
            slots_per_block,
            block_areas: Vec::new(),
            table_area: NULL_AREA,
            delete_head: END_OF_CHAIN,
        })
    }

    /// Load an existing directory from its root area
    pub fn open(blocks: Arc<dyn BlockStore>, root: AreaId) -> Result<Self> {
        let raw = blocks.read_area(root)?;
        if raw.len() < ROOT_SIZE {
            return Err(LobError::Format(format!(
                "Directory root {} too short: {} bytes",
                root,
                raw.len()
            )));
        }

        let mut cursor = raw.as_slice();
        let magic = cursor.get_i32_le();
        if magic != DIRECTORY_MAGIC {
            return Err(LobError::Format(format!(
                "Invalid directory magic: {:#x}",
                magic
            )));
        }

        let slots_per_block = cursor.get_i32_le();
        let block_count = cursor.get_i64_le();
        let delete_head = cursor.get_i64_le();
        let table_area = cursor.get_i64_le();

        if slots_per_block < 2 || block_count < 0 {
            return Err(LobError::Format(format!(
                "Corrupt directory root: slots_per_block={}, block_count={}",
                slots_per_block, block_count
            )));
        }

        let block_areas = if block_count == 0 {
            Vec::new()
        } else {
            let table = blocks.read_at(table_area, 0, block_count as usize * 8)?;
            let mut cursor = table.as_slice();
            (0..block_count).map(|_| cursor.get_i64_le()).collect()
        };

        debug!(root, block_count, delete_head, "opened descriptor directory");

        Ok(Self {
            blocks,
            root,
            slots_per_block: slots_per_block as u32,
            block_areas,
            table_area,
            delete_head,
        })
    }

    /// Root area id
    pub fn root_id(&self) -> AreaId {
        self.root
    }

    /// Add one block of slots; returns the new block's number.
    ///
    /// New slots are zero-filled; the caller initializes them.
    pub fn increase_size(&mut self) -> Result<usize> {
        let block_area = self
            .blocks
            .create_area(self.slots_per_block as usize * SLOT_SIZE)?;

        let mut areas = self.block_areas.clone();
        areas.push(block_area);

        let mut table = BytesMut::with_capacity(areas.len() * 8);
        for &area in &areas {
            table.put_i64_le(area);
        }
        let new_table = self.blocks.create_area(table.len())?;
        self.blocks.write_at(new_table, 0, &table)?;

        {
            let _checkpoint = self.blocks.lock();
            self.blocks
                .write_at(self.root, BLOCK_COUNT_OFFSET, &(areas.len() as i64).to_le_bytes())?;
            self.blocks
                .write_at(self.root, TABLE_AREA_OFFSET, &new_table.to_le_bytes())?;
        }

        let old_table = std::mem::replace(&mut self.table_area, new_table);
        self.block_areas = areas;

        // The root no longer points at the old table; a failed delete only leaks it
        if old_table != NULL_AREA {
            if let Err(e) = self.blocks.delete_area(old_table) {
                warn!(area = old_table, error = %e, "failed to free replaced block table");
            }
        }

        let block = self.block_areas.len() - 1;
        debug!(block, area = block_area, nodes = self.node_count(), "grew descriptor directory");
        Ok(block)
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.block_areas.len()
    }

    /// Index of the first slot in `block`
    pub fn block_first_position(&self, block: usize) -> i64 {
        block as i64 * self.slots_per_block as i64
    }

    /// Slots in `block`
    pub fn block_node_count(&self, _block: usize) -> u32 {
        self.slots_per_block
    }

    /// Total slots across all blocks
    pub fn node_count(&self) -> i64 {
        self.block_areas.len() as i64 * self.slots_per_block as i64
    }

    /// Read and decode a slot
    pub fn read_record(&self, index: i64) -> Result<Descriptor> {
        let (area, offset) = self.locate(index)?;
        let raw = self.blocks.read_at(area, offset, SLOT_SIZE)?;
        Descriptor::decode(&raw)
    }

    /// Encode and write a slot
    pub fn write_record(&self, index: i64, descriptor: &Descriptor) -> Result<()> {
        let (area, offset) = self.locate(index)?;
        self.blocks.write_at(area, offset, &descriptor.encode())
    }

    /// Persist a new delete-chain head
    pub fn write_delete_head(&mut self, index: i64) -> Result<()> {
        self.blocks
            .write_at(self.root, DELETE_HEAD_OFFSET, &index.to_le_bytes())?;
        self.delete_head = index;
        Ok(())
    }

    /// Current delete-chain head, `END_OF_CHAIN` when empty
    pub fn read_delete_head(&self) -> i64 {
        self.delete_head
    }

    fn locate(&self, index: i64) -> Result<(AreaId, usize)> {
        if index < 0 || index >= self.node_count() {
            return Err(LobError::invariant(format!(
                "Slot index {} outside directory of {} slots",
                index,
                self.node_count()
            )));
        }
        let spb = self.slots_per_block as i64;
        let block = (index / spb) as usize;
        let offset = (index % spb) as usize * SLOT_SIZE;
        Ok((self.block_areas[block], offset))
    }
}
