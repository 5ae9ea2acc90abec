//! Slot descriptors
//!
//! On disk the slot state is a status word with bit flags; in memory it is a
//! closed enum so a deleted slot can never carry a reference count.

use bytes::{Buf, BufMut, BytesMut};

use crate::block::AreaId;
use crate::error::Result;
use crate::LobError;

/// Slot size in bytes
pub const SLOT_SIZE: usize = 32;

/// Status flag: slot is on the delete chain
pub const STATUS_DELETED: i32 = 0x02_0000;

/// Status value: object is being written
pub const STATUS_OPEN: i32 = 0;

/// Status value: object is complete and readable
pub const STATUS_COMPLETE: i32 = 1;

const STATE_MASK: i32 = 0xFF;

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Being written; `header` is the object header area
    Open { header: AreaId },

    /// Immutable and readable
    Complete { ref_count: i32, header: AreaId },

    /// Free; `next` is the next free slot index or `END_OF_CHAIN`
    Deleted { next: i64 },
}

/// Decoded slot contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub state: SlotState,
    /// Final size, `-1` until the object is complete
    pub total_size: i64,
    /// Bytes written so far
    pub current_size: i64,
}

impl Descriptor {
    /// Slot for a freshly created object
    pub fn open(header: AreaId) -> Self {
        Self {
            state: SlotState::Open { header },
            total_size: -1,
            current_size: 0,
        }
    }

    /// Free slot linking to `next`
    pub fn deleted(next: i64) -> Self {
        Self {
            state: SlotState::Deleted { next },
            total_size: -1,
            current_size: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.state, SlotState::Deleted { .. })
    }

    /// Object header area, if the slot is live
    pub fn header(&self) -> Option<AreaId> {
        match self.state {
            SlotState::Open { header } | SlotState::Complete { header, .. } => Some(header),
            SlotState::Deleted { .. } => None,
        }
    }

    pub fn encode(&self) -> BytesMut {
        let (status, ref_count, pointer) = match self.state {
            SlotState::Open { header } => (STATUS_OPEN, 0, header),
            SlotState::Complete { ref_count, header } => (STATUS_COMPLETE, ref_count, header),
            SlotState::Deleted { next } => (STATUS_DELETED, 0, next),
        };

        let mut buf = BytesMut::with_capacity(SLOT_SIZE);
        buf.put_i32_le(status);
        buf.put_i32_le(ref_count);
        buf.put_i64_le(self.total_size);
        buf.put_i64_le(self.current_size);
        buf.put_i64_le(pointer);
        buf
    }

    pub fn decode(mut raw: &[u8]) -> Result<Self> {
        if raw.len() < SLOT_SIZE {
            return Err(LobError::Format(format!(
                "Slot too short: {} bytes",
                raw.len()
            )));
        }

        let status = raw.get_i32_le();
        let ref_count = raw.get_i32_le();
        let total_size = raw.get_i64_le();
        let current_size = raw.get_i64_le();
        let pointer = raw.get_i64_le();

        let state = if status & STATUS_DELETED != 0 {
            SlotState::Deleted { next: pointer }
        } else {
            match status & STATE_MASK {
                STATUS_OPEN => SlotState::Open { header: pointer },
                STATUS_COMPLETE => SlotState::Complete {
                    ref_count,
                    header: pointer,
                },
                other => {
                    return Err(LobError::Format(format!(
                        "Unknown slot status {:#x}",
                        other
                    )))
                }
            }
        };

        Ok(Self {
            state,
            total_size,
            current_size,
        })
    }
}
