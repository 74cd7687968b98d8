//! Storage Module
//!
//! Backing tables for the collection store: one logical table mapping an
//! identifier key to an opaque payload.
//!
//! ## Responsibilities
//! - Resolve the storage location (file vs. process memory)
//! - Lazily create the backing file and its schema header
//! - Detect deletion and corruption of the file between operations
//! - Enforce the per-lookup key ceiling
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (32 bytes)                                            │
//! │   Magic "PKGCOLDB" (8) | Version u16 (2) | Reserved (2)      │
//! │   Generation u64 (8) | Created millis u64 (8) | CRC32 (4)    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Records (append-only)                                        │
//! │   [Kind u8][KeyLen u32][ValLen u32][CRC32][Key][Value]       │
//! │   ... repeated; the last record for a key wins ...           │
//! │   (Kind 1 = put, Kind 2 = remove with empty value)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod connection;
mod file;
mod format;
mod location;
mod memory;

pub use backend::{Row, Table, TableStats};
pub use connection::{Access, Connection};
pub use file::{FileOptions, FileTable, Fingerprint, FileState};
pub use format::{
    Header, RecordKind, HEADER_SIZE, MAGIC, MAX_KEY_LEN, RECORD_HEADER_SIZE, SCHEMA_VERSION,
};
pub use location::StorageLocation;
pub use memory::MemoryTable;
