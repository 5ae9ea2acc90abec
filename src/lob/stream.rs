//! Object Stream
//!
//! Byte-stream access to one large object.
//!
//! The store only accepts page-aligned, write-once page I/O. The stream hides
//! that contract:
//! - **write**: bytes accumulate in memory; `flush` drains them in page-sized
//!   chunks, one `write_object_part` per chunk
//! - **read**: one page-sized look-ahead buffer, refilled on a miss
//!
//! A flush that leaves a partial page ends the writable region: the next
//! chunk would start mid-page and is rejected by the store. Flush once, when
//! all data has been written, or let [`ObjectStream::complete`] do it.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::warn;

use crate::error::Result;
use crate::LobError;

use super::{LargeObject, LargeObjectStore, PAGE_SIZE};

/// Buffered stream over one large object
pub struct ObjectStream {
    store: Arc<LargeObjectStore>,
    object: LargeObject,

    /// Pending writes, unbounded until flushed
    write_buf: BytesMut,

    /// Look-ahead buffer holding at most one page
    read_buf: Vec<u8>,

    /// Object offset of `read_buf[0]`; `None` when the buffer is empty
    read_origin: Option<u64>,

    /// Read cursor
    position: u64,
}

impl ObjectStream {
    pub fn new(store: Arc<LargeObjectStore>, object: LargeObject) -> Self {
        Self {
            store,
            object,
            write_buf: BytesMut::new(),
            read_buf: Vec::with_capacity(PAGE_SIZE),
            read_origin: None,
            position: 0,
        }
    }

    /// The wrapped handle
    pub fn object(&self) -> &LargeObject {
        &self.object
    }

    /// Size of the object; bytes flushed so far while open
    pub fn len(&self) -> u64 {
        self.object.current_size.max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes waiting for `flush`
    pub fn buffered_len(&self) -> usize {
        self.write_buf.len()
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Flush pending writes and mark the object complete
    pub fn complete(&mut self) -> Result<()> {
        self.flush_pages()?;
        self.store.complete(&mut self.object)
    }

    /// Flush pending writes and return the handle
    pub fn into_inner(mut self) -> Result<LargeObject> {
        self.flush_pages()?;
        let placeholder = LargeObject {
            id: self.object.id,
            declared_size: 0,
            current_size: 0,
            compressed: false,
            complete: true,
        };
        Ok(std::mem::replace(&mut self.object, placeholder))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.object.complete {
            return Err(LobError::invariant(format!(
                "Write to complete object {} through stream",
                self.object.id
            )));
        }
        self.write_buf.extend_from_slice(data);
        Ok(())
    }

    /// Drain the write buffer, one store call per page-sized chunk
    fn flush_pages(&mut self) -> Result<()> {
        while !self.write_buf.is_empty() {
            let take = self.write_buf.len().min(PAGE_SIZE);
            let offset = self.len();
            self.store
                .write_object_part(&mut self.object, offset, &self.write_buf[..take])?;
            let _ = self.write_buf.split_to(take);
        }
        Ok(())
    }

    /// Read up to `out.len()` bytes, refilling the look-ahead at page boundaries
    fn read_buffered(&mut self, out: &mut [u8]) -> Result<usize> {
        if !self.object.complete {
            return Err(LobError::invariant(format!(
                "Read from incomplete object {} through stream",
                self.object.id
            )));
        }

        let total = self.len();
        let mut copied = 0;

        while copied < out.len() && self.position < total {
            let origin = self.position - self.position % PAGE_SIZE as u64;
            if self.read_origin != Some(origin) {
                self.fill(origin, total)?;
            }

            let start = (self.position - origin) as usize;
            let available = &self.read_buf[start..];
            let n = available.len().min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&available[..n]);

            copied += n;
            self.position += n as u64;
        }

        Ok(copied)
    }

    /// Load the page starting at `origin`
    fn fill(&mut self, origin: u64, total: u64) -> Result<()> {
        let len = (total - origin).min(PAGE_SIZE as u64) as usize;
        self.read_origin = None;
        self.read_buf.resize(len, 0);
        self.store
            .read_object_part(&self.object, origin, &mut self.read_buf)?;
        self.read_origin = Some(origin);
        Ok(())
    }
}

impl Write for ObjectStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_pages()?)
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_buffered(buf)?)
    }
}

impl Seek for ObjectStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}

impl Drop for ObjectStream {
    fn drop(&mut self) {
        if !self.write_buf.is_empty() {
            warn!(
                id = self.object.id,
                pending = self.write_buf.len(),
                "object stream dropped with unflushed data"
            );
        }
    }
}
