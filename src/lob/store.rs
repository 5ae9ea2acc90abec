//! Large Object Store
//!
//! Owns object creation, page I/O, completion and reference-counted
//! destruction on top of a block store and a descriptor directory.

use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::block::{AreaId, BlockStore, NULL_AREA};
use crate::config::Config;
use crate::directory::{Descriptor, Directory, SlotState, END_OF_CHAIN};
use crate::error::Result;
use crate::LobError;

use super::format::{
    self, ObjectHeader, ObjectSummary, StoreHeader, OBJECT_CURRENT_SIZE_OFFSET,
    MAX_OBJECT_SIZE, OBJECT_HEADER_FIXED_SIZE, PAGE_SIZE, STORE_HEADER_SIZE,
};
use super::{LargeObject, ObjectRef, StatsSnapshot, StoreStats};

/// The large object store
///
/// ## Concurrency:
/// - `directory`: one mutex held for every slot read-modify-write
///   (allocation, completion, reference changes, deletion)
/// - the block store's checkpoint lock brackets page allocation together with
///   the header update that publishes it, and object destruction
/// - lock order is always directory → checkpoint
/// - writers to the same open object must be serialized by the caller
pub struct LargeObjectStore {
    blocks: Arc<dyn BlockStore>,

    /// Area id of the store header
    header_id: AreaId,

    /// Descriptor directory and its delete-chain head
    directory: Mutex<Directory>,

    /// DEFLATE level for compressed objects
    compression_level: u32,

    stats: StoreStats,
}

impl LargeObjectStore {
    /// Initialize a new store in `blocks`
    ///
    /// Returns the store and the header area id; persist the id to reopen.
    pub fn create(blocks: Arc<dyn BlockStore>, config: &Config) -> Result<(Self, AreaId)> {
        config.validate()?;

        let directory = Directory::create(Arc::clone(&blocks), config.slots_per_block)?;

        let header = StoreHeader {
            directory_root: directory.root_id(),
        };
        let header_id = blocks.create_area(STORE_HEADER_SIZE)?;
        blocks.write_at(header_id, 0, &header.encode())?;

        info!(header_id, root = directory.root_id(), "created large object store");

        let store = Self {
            blocks,
            header_id,
            directory: Mutex::new(directory),
            compression_level: config.compression_level,
            stats: StoreStats::default(),
        };
        Ok((store, header_id))
    }

    /// Open an existing store from its header area
    ///
    /// Fails with `LobError::Format` on a bad magic number or version.
    pub fn open(blocks: Arc<dyn BlockStore>, header_id: AreaId, config: &Config) -> Result<Self> {
        config.validate()?;

        let raw = blocks.read_area(header_id)?;
        let header = StoreHeader::decode(&raw)?;
        let directory = Directory::open(Arc::clone(&blocks), header.directory_root)?;

        info!(
            header_id,
            slots = directory.node_count(),
            delete_head = directory.read_delete_head(),
            "opened large object store"
        );

        Ok(Self {
            blocks,
            header_id,
            directory: Mutex::new(directory),
            compression_level: config.compression_level,
            stats: StoreStats::default(),
        })
    }

    // =========================================================================
    // Object Lifecycle
    // =========================================================================

    /// Create an open object with room for `max_size` bytes
    pub fn create_object(&self, max_size: i64, compressed: bool) -> Result<LargeObject> {
        if max_size < 0 {
            return Err(LobError::invariant(format!(
                "Negative object size {}",
                max_size
            )));
        }
        if max_size > MAX_OBJECT_SIZE {
            return Err(LobError::invariant(format!(
                "Object size {} exceeds limit {}",
                max_size, MAX_OBJECT_SIZE
            )));
        }

        let header = ObjectHeader::new(max_size, compressed);
        let header_area = self
            .blocks
            .create_area(ObjectHeader::encoded_len(header.pages.len()))?;

        let slot = self
            .blocks
            .write_at(header_area, 0, &header.encode())
            .and_then(|_| self.allocate_slot(Descriptor::open(header_area)));

        let id = match slot {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self.blocks.delete_area(header_area) {
                    warn!(area = header_area, error = %cleanup, "failed to free orphaned object header");
                }
                return Err(e);
            }
        };

        self.stats.object_created();
        debug!(id, max_size, compressed, pages = header.pages.len(), "created object");

        Ok(LargeObject {
            id,
            declared_size: max_size,
            current_size: 0,
            compressed,
            complete: false,
        })
    }

    /// Mark an open object complete, fixing its total size
    ///
    /// Completing twice is an invariant violation.
    pub fn complete(&self, object: &mut LargeObject) -> Result<()> {
        let dir = self.directory.lock();
        let descriptor = dir.read_record(object.id)?;

        let header = match descriptor.state {
            SlotState::Open { header } => header,
            SlotState::Complete { .. } => {
                return Err(LobError::invariant(format!(
                    "Object {} is already complete",
                    object.id
                )))
            }
            SlotState::Deleted { .. } => {
                return Err(LobError::invariant(format!(
                    "Cannot complete deleted object {}",
                    object.id
                )))
            }
        };

        let current_size = self.read_current_size(header)?;
        dir.write_record(
            object.id,
            &Descriptor {
                state: SlotState::Complete {
                    ref_count: 0,
                    header,
                },
                total_size: current_size,
                current_size,
            },
        )?;
        drop(dir);

        object.current_size = current_size;
        object.complete = true;
        self.stats.object_completed();
        debug!(id = object.id, size = current_size, "completed object");
        Ok(())
    }

    /// Resolve an existing slot into a handle
    ///
    /// Open objects resolve to an incomplete handle so writing can resume;
    /// deleted slots are an invariant violation.
    pub fn get_object(&self, id: i64) -> Result<LargeObject> {
        let descriptor = self.directory.lock().read_record(id)?;

        let (header, complete) = match descriptor.state {
            SlotState::Open { header } => (header, false),
            SlotState::Complete { header, .. } => (header, true),
            SlotState::Deleted { .. } => {
                return Err(LobError::invariant(format!("Object {} is deleted", id)))
            }
        };

        let raw = self
            .blocks
            .read_at(header, 0, OBJECT_HEADER_FIXED_SIZE)?;
        let fixed = ObjectSummary::decode(&raw)?;

        Ok(LargeObject {
            id,
            declared_size: fixed.declared_size,
            current_size: if complete {
                descriptor.total_size
            } else {
                fixed.current_size
            },
            compressed: fixed.compressed,
            complete,
        })
    }

    /// Add one reference to a complete object
    pub fn establish_reference(&self, id: i64) -> Result<()> {
        let dir = self.directory.lock();
        let mut descriptor = dir.read_record(id)?;

        match descriptor.state {
            SlotState::Complete { ref_count, header } => {
                let ref_count = ref_count.checked_add(1).ok_or_else(|| {
                    LobError::invariant(format!("Reference count overflow on object {}", id))
                })?;
                descriptor.state = SlotState::Complete { ref_count, header };
                dir.write_record(id, &descriptor)?;
                debug!(id, ref_count, "established reference");
                Ok(())
            }
            _ => Err(LobError::invariant(format!(
                "Cannot reference object {} in state {:?}",
                id, descriptor.state
            ))),
        }
    }

    /// Drop one reference; destroys the object when the count reaches zero
    ///
    /// Returns `true` if the object was destroyed. Each freed page is nulled in
    /// the object header, so after a failing delete the slot keeps its last
    /// reference and a later release resumes with the remaining pages.
    pub fn release_reference(&self, id: i64) -> Result<bool> {
        let mut dir = self.directory.lock();
        let mut descriptor = dir.read_record(id)?;

        let (ref_count, header) = match descriptor.state {
            SlotState::Complete { ref_count, header } if ref_count > 0 => (ref_count, header),
            state => {
                return Err(LobError::invariant(format!(
                    "Cannot release object {} in state {:?}",
                    id, state
                )))
            }
        };

        if ref_count > 1 {
            descriptor.state = SlotState::Complete {
                ref_count: ref_count - 1,
                header,
            };
            dir.write_record(id, &descriptor)?;
            debug!(id, ref_count = ref_count - 1, "released reference");
            return Ok(false);
        }

        let object_header = ObjectHeader::decode(&self.blocks.read_area(header)?)?;

        let _checkpoint = self.blocks.lock();
        let mut freed = 0usize;
        for (index, &page) in object_header.pages.iter().enumerate() {
            // Area ids are never reused, so a missing page was already freed
            if page == NULL_AREA || !self.blocks.contains(page) {
                continue;
            }
            self.blocks.delete_area(page)?;
            self.blocks.write_at(
                header,
                ObjectHeader::page_pointer_offset(index),
                &NULL_AREA.to_le_bytes(),
            )?;
            freed += 1;
        }
        self.blocks.delete_area(header)?;

        let head = dir.read_delete_head();
        dir.write_record(id, &Descriptor::deleted(head))?;
        dir.write_delete_head(id)?;

        self.stats.object_destroyed();
        debug!(id, pages = freed, next_free = head, "destroyed object");
        Ok(true)
    }

    /// Establish a reference and wrap it in a counted handle
    pub fn acquire(self: &Arc<Self>, id: i64) -> Result<ObjectRef> {
        self.establish_reference(id)?;
        Ok(ObjectRef::new(Arc::clone(self), id))
    }

    // =========================================================================
    // Page I/O
    // =========================================================================

    /// Write one page of an open object
    ///
    /// `offset` must be page aligned, `data` at most one page, and the page
    /// must not have been written before.
    pub fn write_object_part(&self, object: &mut LargeObject, offset: u64, data: &[u8]) -> Result<()> {
        let end = Self::check_part(object.id, offset, data.len())?;
        if object.complete {
            return Err(LobError::invariant(format!(
                "Write to complete object {}",
                object.id
            )));
        }

        let descriptor = self.directory.lock().read_record(object.id)?;
        let header_area = match descriptor.state {
            SlotState::Open { header } => header,
            state => {
                return Err(LobError::invariant(format!(
                    "Write to object {} in state {:?}",
                    object.id, state
                )))
            }
        };

        let header = ObjectHeader::decode(&self.blocks.read_area(header_area)?)?;
        let page_index = offset as usize / PAGE_SIZE;

        if end > header.declared_size as u64 {
            return Err(LobError::invariant(format!(
                "Write of {} bytes at {} exceeds declared size {} of object {}",
                data.len(),
                offset,
                header.declared_size,
                object.id
            )));
        }
        match header.pages.get(page_index) {
            Some(&NULL_AREA) => {}
            Some(_) => {
                return Err(LobError::invariant(format!(
                    "Page {} of object {} is already written",
                    page_index, object.id
                )))
            }
            None => {
                return Err(LobError::invariant(format!(
                    "Page {} is outside object {} of {} pages",
                    page_index,
                    object.id,
                    header.pages.len()
                )))
            }
        }

        let payload: Cow<'_, [u8]> = if header.compressed {
            Cow::Owned(format::deflate(data, self.compression_level)?)
        } else {
            Cow::Borrowed(data)
        };
        let page = format::encode_page(&payload);
        let current_size = header.current_size + data.len() as i64;

        let checkpoint = self.blocks.lock();
        let page_area = self.blocks.create_area(page.len())?;

        let published = self
            .blocks
            .write_at(page_area, 0, &page)
            .and_then(|_| {
                self.blocks.write_at(
                    header_area,
                    ObjectHeader::page_pointer_offset(page_index),
                    &page_area.to_le_bytes(),
                )
            })
            .and_then(|_| {
                self.blocks.write_at(
                    header_area,
                    OBJECT_CURRENT_SIZE_OFFSET,
                    &current_size.to_le_bytes(),
                )
            });

        if let Err(e) = published {
            if let Err(cleanup) = self.blocks.delete_area(page_area) {
                warn!(area = page_area, error = %cleanup, "failed to free unpublished page");
            }
            return Err(e);
        }
        drop(checkpoint);

        // Mirror the running size into the slot while the object is open
        let dir = self.directory.lock();
        let mut descriptor = dir.read_record(object.id)?;
        if let SlotState::Open { .. } = descriptor.state {
            descriptor.current_size = current_size;
            dir.write_record(object.id, &descriptor)?;
        }
        drop(dir);

        object.current_size = current_size;
        self.stats.part_written(data.len());
        debug!(
            id = object.id,
            page = page_index,
            len = data.len(),
            stored = payload.len(),
            "wrote page"
        );
        Ok(())
    }

    /// Read `buf.len()` bytes of one page of a complete object
    pub fn read_object_part(&self, object: &LargeObject, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = Self::check_part(object.id, offset, buf.len())?;

        let descriptor = self.directory.lock().read_record(object.id)?;
        let header_area = match descriptor.state {
            SlotState::Complete { header, .. } => header,
            state => {
                return Err(LobError::invariant(format!(
                    "Read from object {} in state {:?}",
                    object.id, state
                )))
            }
        };

        if end > descriptor.total_size as u64 {
            return Err(LobError::invariant(format!(
                "Read of {} bytes at {} exceeds size {} of object {}",
                buf.len(),
                offset,
                descriptor.total_size,
                object.id
            )));
        }

        let page_index = offset as usize / PAGE_SIZE;
        let pointer = self.blocks.read_at(
            header_area,
            ObjectHeader::page_pointer_offset(page_index),
            8,
        )?;
        let page_area = i64::from_le_bytes([
            pointer[0], pointer[1], pointer[2], pointer[3], pointer[4], pointer[5], pointer[6],
            pointer[7],
        ]);
        if page_area == NULL_AREA {
            return Err(LobError::Content(format!(
                "Page {} of object {} was never written",
                page_index, object.id
            )));
        }

        let raw = self.blocks.read_area(page_area)?;
        let payload = format::decode_page(&raw)?;

        if object.compressed {
            let inflated = format::inflate(payload, buf.len())?;
            buf.copy_from_slice(&inflated);
        } else {
            let stored = payload.get(..buf.len()).ok_or_else(|| {
                LobError::Content(format!(
                    "Page {} of object {} holds {} bytes, {} requested",
                    page_index,
                    object.id,
                    payload.len(),
                    buf.len()
                ))
            })?;
            buf.copy_from_slice(stored);
        }

        self.stats.part_read(buf.len());
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Area id of the store header
    pub fn header_id(&self) -> AreaId {
        self.header_id
    }

    /// Current descriptor of a slot
    pub fn descriptor(&self, id: i64) -> Result<Descriptor> {
        self.directory.lock().read_record(id)
    }

    /// Total slots in the directory
    pub fn slot_count(&self) -> i64 {
        self.directory.lock().node_count()
    }

    /// Length of the delete chain
    pub fn free_slot_count(&self) -> Result<usize> {
        let dir = self.directory.lock();
        let limit = dir.node_count() as usize;
        let mut count = 0;
        let mut next = dir.read_delete_head();

        while next != END_OF_CHAIN {
            if count >= limit {
                return Err(LobError::invariant("Delete chain contains a cycle"));
            }
            next = match dir.read_record(next)?.state {
                SlotState::Deleted { next } => next,
                state => {
                    return Err(LobError::invariant(format!(
                        "Slot {} on delete chain is in state {:?}",
                        next, state
                    )))
                }
            };
            count += 1;
        }
        Ok(count)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Underlying block store
    pub fn blocks(&self) -> &Arc<dyn BlockStore> {
        &self.blocks
    }

    /// Make all writes durable
    pub fn sync(&self) -> Result<()> {
        let _checkpoint = self.blocks.lock();
        self.blocks.sync()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Pop a slot off the delete chain, or grow the directory by one block
    fn allocate_slot(&self, descriptor: Descriptor) -> Result<i64> {
        let mut dir = self.directory.lock();
        let head = dir.read_delete_head();

        if head == END_OF_CHAIN {
            let block = dir.increase_size()?;
            let first = dir.block_first_position(block);
            let count = dir.block_node_count(block) as i64;

            dir.write_record(first, &descriptor)?;
            for i in 1..count {
                let next = if i + 1 < count { first + i + 1 } else { END_OF_CHAIN };
                dir.write_record(first + i, &Descriptor::deleted(next))?;
            }
            dir.write_delete_head(first + 1)?;

            self.stats.directory_grown();
            return Ok(first);
        }

        let popped = dir.read_record(head)?;
        let next = match popped.state {
            SlotState::Deleted { next } => next,
            state => {
                return Err(LobError::invariant(format!(
                    "Corrupt delete chain: slot {} is in state {:?}",
                    head, state
                )))
            }
        };

        dir.write_delete_head(next)?;
        dir.write_record(head, &descriptor)?;

        self.stats.slot_recycled();
        debug!(slot = head, next_free = next, "recycled slot");
        Ok(head)
    }

    /// Alignment and length preconditions shared by page reads and writes
    ///
    /// Returns the end offset of the part.
    fn check_part(id: i64, offset: u64, len: usize) -> Result<u64> {
        if offset % PAGE_SIZE as u64 != 0 {
            return Err(LobError::invariant(format!(
                "Offset {} on object {} is not page aligned",
                offset, id
            )));
        }
        if len > PAGE_SIZE {
            return Err(LobError::invariant(format!(
                "Length {} on object {} exceeds page size {}",
                len, id, PAGE_SIZE
            )));
        }
        offset.checked_add(len as u64).ok_or_else(|| {
            LobError::invariant(format!(
                "Part of {} bytes at {} on object {} overflows the offset range",
                len, offset, id
            ))
        })
    }

    fn read_current_size(&self, header_area: AreaId) -> Result<i64> {
        let raw = self
            .blocks
            .read_at(header_area, OBJECT_CURRENT_SIZE_OFFSET, 8)?;
        Ok(i64::from_le_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]))
    }
}
