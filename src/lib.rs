//! # collection-store
//!
//! Local persistence layer of a package-manager client: a durable,
//! queryable cache of package-collection metadata.
//! - Single-file store with checksummed, append-only records
//! - Transparent re-creation when the file is deleted
//! - Fail-closed `CorruptStore` errors when the file is not a valid store
//! - Batched identifier lookups under a fixed per-lookup key ceiling
//! - Non-blocking API serialized onto one worker thread per store
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CollectionsStorage                        │
//! │           (Pending<T> / callback, any thread)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ crossbeam channel
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Worker thread                           │
//! │               (one request at a time)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Engine (CRUD) ── Planner (batching)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Connection                              │
//! │        (lazy open, revalidate, recreate on delete)          │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            ▼                              ▼
//!     ┌─────────────┐                ┌─────────────┐
//!     │  FileTable  │                │ MemoryTable │
//!     │  (OnDisk)   │                │ (InMemory)  │
//!     └─────────────┘                └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod model;
pub mod storage;
pub mod planner;
pub mod engine;
pub mod worker;
pub mod collections;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use collections::CollectionsStorage;
pub use config::{Config, SyncStrategy};
pub use error::{Result, StoreError};
pub use model::{CollectionIdentifier, CollectionSource, PackageCollection};
pub use storage::StorageLocation;
pub use worker::Pending;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of collection-store
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
