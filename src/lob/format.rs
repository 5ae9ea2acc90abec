//! Binary layouts shared by the store and its readers
//!
//! All integers are little-endian.
//!
//! ```text
//! Store Header   magic:i32 | version:i32 | directoryRootId:i64
//! Object Header  reserved:i32 | type:i32 | declaredSize:i64 | currentSize:i64
//!                | pageCount:i64 | pagePointer[pageCount]:i64
//! Page           written:i32 | payloadLength:i32 | payload
//! ```

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::block::{AreaId, NULL_AREA};
use crate::error::Result;
use crate::LobError;

// =============================================================================
// Constants
// =============================================================================

/// Bytes of object content per page (64 KiB)
pub const PAGE_SIZE: usize = 64 * 1024;

/// Largest declared object size (1 TiB)
///
/// Keeps the page table of one header at 128 MiB, well inside the
/// `u32` length limit of a file-backed area.
pub const MAX_OBJECT_SIZE: i64 = 1 << 40;

/// Page table length of an object of `MAX_OBJECT_SIZE` bytes
pub const MAX_PAGE_COUNT: usize = (MAX_OBJECT_SIZE / PAGE_SIZE as i64) as usize;

/// Magic number at the start of the store header ("LOBS")
pub const STORE_MAGIC: i32 = 0x4C4F_4253;

/// Current store format version
pub const STORE_VERSION: i32 = 1;

/// Store header size: magic (4) + version (4) + root (8)
pub const STORE_HEADER_SIZE: usize = 16;

/// Type bit: page payloads are DEFLATE-compressed
pub const TYPE_COMPRESSED: i32 = 0x010;

/// Object kind stored in the low bits of the type field
pub const KIND_LARGE_OBJECT: i32 = 0x001;

const KIND_MASK: i32 = 0x00F;

/// Fixed part of the object header, before the page pointers
pub const OBJECT_HEADER_FIXED_SIZE: usize = 32;

/// Offset of `currentSize` inside the object header
pub const OBJECT_CURRENT_SIZE_OFFSET: usize = 16;

/// Page header: written (4) + payload length (4)
pub const PAGE_HEADER_SIZE: usize = 8;

const PAGE_WRITTEN: i32 = 1;

// =============================================================================
// Store Header
// =============================================================================

/// Root record of a store, written once by `create`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub directory_root: AreaId,
}

impl StoreHeader {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(STORE_HEADER_SIZE);
        buf.put_i32_le(STORE_MAGIC);
        buf.put_i32_le(STORE_VERSION);
        buf.put_i64_le(self.directory_root);
        buf
    }

    /// Decode and validate magic/version
    pub fn decode(mut raw: &[u8]) -> Result<Self> {
        if raw.len() < STORE_HEADER_SIZE {
            return Err(LobError::Format(format!(
                "Store header too short: {} bytes",
                raw.len()
            )));
        }

        let magic = raw.get_i32_le();
        if magic != STORE_MAGIC {
            return Err(LobError::Format(format!(
                "Invalid store magic: expected {:#x}, got {:#x}",
                STORE_MAGIC, magic
            )));
        }

        let version = raw.get_i32_le();
        if version != STORE_VERSION {
            return Err(LobError::Format(format!(
                "Unsupported store version: {}",
                version
            )));
        }

        Ok(Self {
            directory_root: raw.get_i64_le(),
        })
    }
}

// =============================================================================
// Object Header
// =============================================================================

/// Per-object header: sizes plus one pointer per page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub compressed: bool,
    pub declared_size: i64,
    pub current_size: i64,
    /// Area id of each page, `NULL_AREA` until written
    pub pages: Vec<AreaId>,
}

impl ObjectHeader {
    /// Fresh header for an object of `declared_size` bytes
    pub fn new(declared_size: i64, compressed: bool) -> Self {
        let page_count = page_count(declared_size);
        Self {
            compressed,
            declared_size,
            current_size: 0,
            pages: vec![NULL_AREA; page_count],
        }
    }

    /// Encoded size for an object with `page_count` pages
    pub fn encoded_len(page_count: usize) -> usize {
        OBJECT_HEADER_FIXED_SIZE + page_count * 8
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::encoded_len(self.pages.len()));
        let mut kind = KIND_LARGE_OBJECT;
        if self.compressed {
            kind |= TYPE_COMPRESSED;
        }

        buf.put_i32_le(0); // reserved
        buf.put_i32_le(kind);
        buf.put_i64_le(self.declared_size);
        buf.put_i64_le(self.current_size);
        buf.put_i64_le(self.pages.len() as i64);
        for &page in &self.pages {
            buf.put_i64_le(page);
        }
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        let summary = ObjectSummary::decode(raw)?;
        let page_count = summary.page_count;
        let mut raw = &raw[OBJECT_HEADER_FIXED_SIZE..];

        if raw.remaining() < page_count * 8 {
            return Err(LobError::Format(format!(
                "Object header truncated: {} page pointers, {} bytes left",
                page_count,
                raw.remaining()
            )));
        }

        let pages = (0..page_count).map(|_| raw.get_i64_le()).collect();

        Ok(Self {
            compressed: summary.compressed,
            declared_size: summary.declared_size,
            current_size: summary.current_size,
            pages,
        })
    }

    /// Offset of a page pointer inside the encoded header
    pub fn page_pointer_offset(page_index: usize) -> usize {
        OBJECT_HEADER_FIXED_SIZE + page_index * 8
    }
}

/// Fixed fields of an object header, without the page pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSummary {
    pub compressed: bool,
    pub declared_size: i64,
    pub current_size: i64,
    pub page_count: usize,
}

impl ObjectSummary {
    /// Decode the first `OBJECT_HEADER_FIXED_SIZE` bytes of an object header
    pub fn decode(mut raw: &[u8]) -> Result<Self> {
        if raw.len() < OBJECT_HEADER_FIXED_SIZE {
            return Err(LobError::Format(format!(
                "Object header too short: {} bytes",
                raw.len()
            )));
        }

        let _reserved = raw.get_i32_le();
        let kind = raw.get_i32_le();
        if kind & KIND_MASK != KIND_LARGE_OBJECT {
            return Err(LobError::Format(format!(
                "Unknown object kind: {:#x}",
                kind & KIND_MASK
            )));
        }

        let declared_size = raw.get_i64_le();
        let current_size = raw.get_i64_le();
        let page_count = usize::try_from(raw.get_i64_le())
            .map_err(|_| LobError::Format("Negative page count".to_string()))?;
        if page_count > MAX_PAGE_COUNT {
            return Err(LobError::Format(format!(
                "Page count {} exceeds limit {}",
                page_count, MAX_PAGE_COUNT
            )));
        }

        Ok(Self {
            compressed: kind & TYPE_COMPRESSED != 0,
            declared_size,
            current_size,
            page_count,
        })
    }
}

/// Pages needed for `size` bytes: ceil(size / PAGE_SIZE)
pub fn page_count(size: i64) -> usize {
    let size = size.max(0) as usize;
    size.div_ceil(PAGE_SIZE)
}

// =============================================================================
// Pages
// =============================================================================

/// Encode a page area: written flag, payload length, payload
pub fn encode_page(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(PAGE_HEADER_SIZE + payload.len());
    buf.put_i32_le(PAGE_WRITTEN);
    buf.put_i32_le(payload.len() as i32);
    buf.put_slice(payload);
    buf
}

/// Borrow the payload of a page area
pub fn decode_page(raw: &[u8]) -> Result<&[u8]> {
    if raw.len() < PAGE_HEADER_SIZE {
        return Err(LobError::Content(format!(
            "Page too short: {} bytes",
            raw.len()
        )));
    }

    let mut header = &raw[..PAGE_HEADER_SIZE];
    let written = header.get_i32_le();
    let len = header.get_i32_le();

    if written != PAGE_WRITTEN {
        return Err(LobError::Content("Page was never written".to_string()));
    }

    let len = usize::try_from(len)
        .map_err(|_| LobError::Content(format!("Negative page length {}", len)))?;
    raw.get(PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + len)
        .ok_or_else(|| LobError::Content(format!("Page payload truncated: {} bytes", len)))
}

// =============================================================================
// Compression
// =============================================================================

/// DEFLATE-compress one page worth of bytes
pub fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(data.len() / 2),
        Compression::new(level),
    );
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a page payload, requiring exactly `expected_len` bytes of output
pub fn inflate(payload: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    // One byte of slack so an over-long page is detected without inflating it all
    DeflateDecoder::new(payload)
        .take(PAGE_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| LobError::Content(format!("Failed to inflate page: {}", e)))?;

    if out.len() != expected_len {
        return Err(LobError::Content(format!(
            "Inflated page length mismatch: expected {}, got {}",
            expected_len,
            out.len()
        )));
    }
    Ok(out)
}
