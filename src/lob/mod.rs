//! Large Object Module
//!
//! Stores variable-length binary objects as 64 KiB pages inside a block store.
//!
//! ## Responsibilities
//! - Create objects and hand out descriptor slot ids
//! - Page-aligned, write-once page I/O with optional DEFLATE compression
//! - Completion (open → complete) as the publish point for readers
//! - Reference counting; the last release frees pages and recycles the slot
//! - Buffered streams for arbitrary-offset sequential access
//!
//! ## Object Layout
//! ```text
//!  Descriptor slot ──► Object Header ──┬──► Page 0  [written|len|payload]
//!                                      ├──► Page 1
//!                                      └──► ...     (-1 until written)
//! ```

pub mod format;
mod handle;
mod stats;
mod store;
mod stream;

pub use format::PAGE_SIZE;
pub use handle::{LargeObject, ObjectRef};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::LargeObjectStore;
pub use stream::ObjectStream;
