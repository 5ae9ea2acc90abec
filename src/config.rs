//! Configuration for lobstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LobError, Result};

/// Main configuration for a lobstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the file-backed block store
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── area_00000001.blk   (one file per area)
    ///     └── lobstore.meta       (CLI manifest, header id)
    pub data_dir: PathBuf,

    /// Sync strategy: when the file-backed block store fsyncs
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Directory Configuration
    // -------------------------------------------------------------------------
    /// Descriptor slots added each time the directory grows.
    /// Only used when creating a store; an opened store keeps its own value.
    pub slots_per_block: u32,

    // -------------------------------------------------------------------------
    // Compression Configuration
    // -------------------------------------------------------------------------
    /// DEFLATE level (0-9) for objects created with compression
    pub compression_level: u32,
}

/// Block store sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every area write (safest, slowest)
    EveryWrite,

    /// fsync only on explicit `sync()` (checkpoints)
    OnCheckpoint,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lobstore_data"),
            sync_strategy: SyncStrategy::OnCheckpoint,
            slots_per_block: 64,
            compression_level: 6,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would break the store's algorithms
    pub fn validate(&self) -> Result<()> {
        if self.slots_per_block < 2 {
            return Err(LobError::Config(format!(
                "slots_per_block must be at least 2, got {}",
                self.slots_per_block
            )));
        }
        if self.compression_level > 9 {
            return Err(LobError::Config(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for the file-backed block store)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the block store sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the number of slots per directory block
    pub fn slots_per_block(mut self, slots: u32) -> Self {
        self.config.slots_per_block = slots;
        self
    }

    /// Set the DEFLATE compression level
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
