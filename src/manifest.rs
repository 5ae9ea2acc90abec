//! Store manifest
//!
//! A file-backed store is reopened from its header area id. The manifest
//! keeps that id next to the area files so a data directory is
//! self-describing.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::block::{AreaId, BlockStore, FileBlockStore};
use crate::config::Config;
use crate::error::Result;
use crate::lob::LargeObjectStore;
use crate::LobError;

/// Manifest file name inside the data directory
pub const MANIFEST_FILENAME: &str = "lobstore.meta";

/// Contents of `lobstore.meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the crate that created the store
    pub created_by: String,

    /// Area id of the store header
    pub header_id: AreaId,
}

impl Manifest {
    /// Load the manifest from a data directory, `None` if absent
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    /// Write the manifest into a data directory
    pub fn save(&self, dir: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILENAME));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, dir.join(MANIFEST_FILENAME))?;
        Ok(())
    }
}

/// Open the file-backed store in `config.data_dir`, creating it if needed
///
/// On startup:
/// 1. Open the block store (discovers existing areas)
/// 2. If a manifest exists, open the store from its header id
/// 3. Otherwise create a store and write the manifest
pub fn open_file_store(config: &Config) -> Result<Arc<LargeObjectStore>> {
    config.validate()?;

    let blocks: Arc<dyn BlockStore> =
        Arc::new(FileBlockStore::open(&config.data_dir, config.sync_strategy)?);

    let store = match Manifest::load(&config.data_dir)? {
        Some(manifest) => LargeObjectStore::open(blocks, manifest.header_id, config)?,
        None => {
            if blocks.area_count() > 0 {
                return Err(LobError::Format(format!(
                    "{} holds areas but no {}",
                    config.data_dir.display(),
                    MANIFEST_FILENAME
                )));
            }
            let (store, header_id) = LargeObjectStore::create(blocks, config)?;
            store.sync()?;
            Manifest {
                created_by: crate::VERSION.to_string(),
                header_id,
            }
            .save(&config.data_dir)?;
            info!(dir = %config.data_dir.display(), header_id, "initialized new store");
            store
        }
    };

    Ok(Arc::new(store))
}
