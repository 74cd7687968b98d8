//! Configuration for the collection store
//!
//! Centralized configuration with sensible defaults. The store reads no
//! config file or environment variables; callers decide the location.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::planner::MAX_KEYS_PER_LOOKUP;
use crate::storage::StorageLocation;

/// Default number of keys per lookup when listing
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Main configuration for a collection store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing file or in-process table
    pub location: StorageLocation,

    /// How often appended records are fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Query Configuration
    // -------------------------------------------------------------------------
    /// Max keys per lookup, and page size for unfiltered listing
    pub batch_size: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Fraction of dead bytes in the file that triggers a rewrite
    pub compaction_threshold: f64,

    /// Files smaller than this are never compacted
    pub compaction_min_bytes: u64,
}

/// Sync strategy for the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// Leave flushing to the OS
    OsManaged,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: StorageLocation::InMemory,
            sync_strategy: SyncStrategy::EveryWrite,
            batch_size: DEFAULT_BATCH_SIZE,
            compaction_threshold: 0.5,
            compaction_min_bytes: 64 * 1024, // 64 KiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values a store can actually run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_KEYS_PER_LOOKUP {
            return Err(StoreError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_KEYS_PER_LOOKUP, self.batch_size
            )));
        }

        if !(self.compaction_threshold > 0.0 && self.compaction_threshold <= 1.0) {
            return Err(StoreError::Config(format!(
                "compaction_threshold must be in (0, 1], got {}",
                self.compaction_threshold
            )));
        }

        if let StorageLocation::OnDisk(path) = &self.location {
            if path.as_os_str().is_empty() {
                return Err(StoreError::Config("on-disk path is empty".to_string()));
            }
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
    /// Set the storage location
    pub fn location(mut self, location: StorageLocation) -> Self {
        self.config.location = location;
        self
    }

    /// Store in a file at `path`
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.location = StorageLocation::OnDisk(path.into());
        self
    }

    /// Keep everything in process memory
    pub fn in_memory(mut self) -> Self {
        self.config.location = StorageLocation::InMemory;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the number of keys per lookup
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the dead-byte fraction that triggers compaction
    pub fn compaction_threshold(mut self, threshold: f64) -> Self {
        self.config.compaction_threshold = threshold;
        self
    }

    /// Set the minimum file size for compaction (in bytes)
    pub fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.config.compaction_min_bytes = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
