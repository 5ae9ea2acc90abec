//! File-backed block store
//!
//! One file per area, named `area_{id:08}.blk`.
//!
//! ## Area File Format
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Header (12 bytes)                                    │
//! │   Magic: "LBAR" (4) | Len: u32 (4) | DataCRC: u32 (4) │
//! ├──────────────────────────────────────────────────────┤
//! │ Data (Len bytes)                                     │
//! └──────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::SyncStrategy;
use crate::error::Result;
use crate::LobError;

use super::{check_range, AreaId, BlockStore, CheckpointGuard};

/// Magic bytes identifying an area file
const AREA_MAGIC: &[u8; 4] = b"LBAR";

/// Header size: Magic (4) + Len (4) + CRC (4) = 12 bytes
const AREA_HEADER_SIZE: usize = 12;

/// Block store persisting each area as its own checksummed file
///
/// ## Concurrency:
/// - `live`: RwLock over the set of existing area ids
/// - `write_lock`: serializes read-modify-write of area files
/// - `next_area_id`: atomic counter (lock-free)
pub struct FileBlockStore {
    /// Directory holding the area files
    data_dir: PathBuf,

    /// When to fsync
    sync_strategy: SyncStrategy,

    /// Ids of existing areas
    live: RwLock<HashSet<AreaId>>,

    /// Areas written since the last sync (OnCheckpoint only)
    dirty: Mutex<HashSet<AreaId>>,

    /// Next id to hand out
    next_area_id: AtomicI64,

    /// Serializes area file rewrites
    write_lock: Mutex<()>,

    /// Checkpoint lock
    checkpoint: Mutex<()>,
}

impl FileBlockStore {
    /// Open or create a block store in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing area files
    /// 3. Next id = max existing id + 1
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut live = HashSet::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();

            if file_path.is_file() {
                if let Some(id) = Self::parse_area_id(&file_path) {
                    live.insert(id);
                }
            }
        }

        let next_id = live.iter().max().map(|&id| id + 1).unwrap_or(1);
        info!(dir = %path.display(), areas = live.len(), next_id, "opened file block store");

        Ok(Self {
            data_dir: path.to_path_buf(),
            sync_strategy,
            live: RwLock::new(live),
            dirty: Mutex::new(HashSet::new()),
            next_area_id: AtomicI64::new(next_id),
            write_lock: Mutex::new(()),
            checkpoint: Mutex::new(()),
        })
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next area ID (for testing/debugging)
    pub fn next_area_id(&self) -> AreaId {
        self.next_area_id.load(Ordering::SeqCst)
    }

    /// File path of an area (exposed for corruption tests and tooling)
    pub fn area_path(&self, id: AreaId) -> PathBuf {
        self.data_dir.join(format!("area_{:08}.blk", id))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Parse area ID from filename
    /// "area_00000042.blk" → Some(42)
    fn parse_area_id(path: &Path) -> Option<AreaId> {
        if path.extension()? != "blk" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("area_")?;
        id_str.parse().ok()
    }

    fn ensure_live(&self, id: AreaId) -> Result<()> {
        if self.live.read().contains(&id) {
            Ok(())
        } else {
            Err(LobError::Storage(format!("Area {} does not exist", id)))
        }
    }

    /// Read and verify an area file, returning its data section
    fn load(&self, id: AreaId) -> Result<Vec<u8>> {
        self.ensure_live(id)?;

        let mut file = File::open(self.area_path(id))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        if raw.len() < AREA_HEADER_SIZE || &raw[0..4] != AREA_MAGIC {
            return Err(LobError::Format(format!(
                "Area {} has an invalid header",
                id
            )));
        }

        let len = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
        let crc = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);

        let data = raw.split_off(AREA_HEADER_SIZE);
        if data.len() != len {
            return Err(LobError::Content(format!(
                "Area {} truncated: expected {} bytes, found {}",
                id,
                len,
                data.len()
            )));
        }
        if crc32fast::hash(&data) != crc {
            return Err(LobError::Content(format!("Area {} checksum mismatch", id)));
        }

        Ok(data)
    }

    /// Write a full area file (header + data)
    fn store(&self, id: AreaId, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| {
            LobError::Storage(format!("Area {} too large: {} bytes", id, data.len()))
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.area_path(id))?;

        file.write_all(AREA_MAGIC)?;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&crc32fast::hash(data).to_le_bytes())?;
        file.write_all(data)?;

        match self.sync_strategy {
            SyncStrategy::EveryWrite => file.sync_all()?,
            SyncStrategy::OnCheckpoint => {
                self.dirty.lock().insert(id);
            }
        }
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn create_area(&self, size: usize) -> Result<AreaId> {
        let id = self.next_area_id.fetch_add(1, Ordering::SeqCst);
        {
            let _write_guard = self.write_lock.lock();
            self.store(id, &vec![0u8; size])?;
        }
        self.live.write().insert(id);
        debug!(area = id, size, "created area");
        Ok(id)
    }

    fn read_area(&self, id: AreaId) -> Result<Vec<u8>> {
        self.load(id)
    }

    fn read_at(&self, id: AreaId, offset: usize, len: usize) -> Result<Vec<u8>> {
        let data = self.load(id)?;
        check_range(id, data.len(), offset, len)?;
        Ok(data[offset..offset + len].to_vec())
    }

    fn write_at(&self, id: AreaId, offset: usize, data: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let mut current = self.load(id)?;
        check_range(id, current.len(), offset, data.len())?;
        current[offset..offset + data.len()].copy_from_slice(data);
        self.store(id, &current)
    }

    fn area_size(&self, id: AreaId) -> Result<usize> {
        self.load(id).map(|data| data.len())
    }

    fn delete_area(&self, id: AreaId) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_live(id)?;
        fs::remove_file(self.area_path(id))?;
        self.live.write().remove(&id);
        self.dirty.lock().remove(&id);
        debug!(area = id, "deleted area");
        Ok(())
    }

    fn contains(&self, id: AreaId) -> bool {
        self.live.read().contains(&id)
    }

    fn area_count(&self) -> usize {
        self.live.read().len()
    }

    fn lock(&self) -> CheckpointGuard<'_> {
        CheckpointGuard::new(self.checkpoint.lock())
    }

    fn sync(&self) -> Result<()> {
        let dirty: Vec<AreaId> = self.dirty.lock().drain().collect();
        for id in &dirty {
            File::open(self.area_path(*id))?.sync_all()?;
        }
        debug!(areas = dirty.len(), "synced block store");
        Ok(())
    }
}
