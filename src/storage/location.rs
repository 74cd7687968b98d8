//! Storage location

use std::fmt;
use std::path::{Path, PathBuf};

/// Where a store keeps its table. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Durable file at the given path
    OnDisk(PathBuf),

    /// Private in-process table; leaves nothing on the filesystem
    InMemory,
}

impl StorageLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageLocation::OnDisk(path) => Some(path),
            StorageLocation::InMemory => None,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self, StorageLocation::InMemory)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::OnDisk(path) => write!(f, "{}", path.display()),
            StorageLocation::InMemory => f.write_str(":memory:"),
        }
    }
}
