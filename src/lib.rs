//! # lobstore
//!
//! A large-object (BLOB/CLOB) storage engine with:
//! - 64 KiB pages, each its own block-store area
//! - Optional per-page DEFLATE compression
//! - A descriptor directory with a recyclable delete chain
//! - Reference-counted object lifetime
//! - Buffered streams for arbitrary-offset I/O
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ObjectStream                           │
//! │          (write buffer / page look-ahead buffer)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ page-aligned, write-once
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   LargeObjectStore                          │
//! │        (create / write / complete / read / refcount)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Directory  │          │   Object    │
//!   │   (slots)   │          │ header/pages│
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────────────────────────────┐
//!   │             BlockStore              │
//!   │   (areas + checkpoint lock)         │
//!   └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod block;
pub mod directory;
pub mod lob;
pub mod manifest;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LobError, Result};
pub use config::{Config, SyncStrategy};
pub use block::{AreaId, BlockStore, FileBlockStore, MemoryBlockStore};
pub use lob::{LargeObject, LargeObjectStore, ObjectRef, ObjectStream, PAGE_SIZE};
pub use manifest::{open_file_store, Manifest};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lobstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
