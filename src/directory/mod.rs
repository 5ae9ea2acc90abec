//! Descriptor Directory Module
//!
//! A persistent, growable array of fixed-size slots. Each slot describes one
//! large object; free slots are linked into the delete chain through their
//! pointer field.
//!
//! ## Root Area
//! ```text
//! ┌───────────┬──────────────────┬──────────────┬───────────────┬─────────────┐
//! │ Magic (4) │ SlotsPerBlock(4) │ BlockCount(8)│ DeleteHead (8)│ TableArea(8)│
//! └───────────┴──────────────────┴──────────────┴───────────────┴─────────────┘
//! ```
//! The table area lists the area id of every block (8 bytes each) and is
//! reallocated whenever the directory grows.
//!
//! ## Slot (32 bytes)
//! ```text
//! ┌────────────┬──────────────┬───────────────┬─────────────────┬─────────────┐
//! │ Status (4) │ RefCount (4) │ TotalSize (8) │ CurrentSize (8) │ Pointer (8) │
//! └────────────┴──────────────┴───────────────┴─────────────────┴─────────────┘
//! ```

mod descriptor;
mod list;

pub use descriptor::{Descriptor, SlotState, SLOT_SIZE, STATUS_COMPLETE, STATUS_DELETED, STATUS_OPEN};
pub use list::Directory;

/// Terminator of the delete chain
pub const END_OF_CHAIN: i64 = -1;
