//! Error types for the collection store
//!
//! Every operation reports failure through `StoreError`, delivered over the
//! same channel as its success value.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::CollectionIdentifier;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for collection store operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Collection not found: {0}")]
    NotFound(CollectionIdentifier),

    // -------------------------------------------------------------------------
    // Backing File Errors
    // -------------------------------------------------------------------------
    #[error("{} is not a valid collection store: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Too many keys in one lookup: {requested} (limit {limit})")]
    TooManyKeys { requested: usize, limit: usize },

    #[error("Invalid identifier key length {len} (must be 1 to {limit} bytes)")]
    InvalidKey { len: usize, limit: usize },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Collection store is closed")]
    Closed,

    #[error("Cannot block on a collection store result from its own worker thread")]
    WouldDeadlock,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Build a corruption error for the file at `path`
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True if the requested identifier has no current entry
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// True if the backing file exists but cannot be used as a store
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::CorruptStore { .. })
    }

    /// True if the identifier cannot be stored as a table key
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, StoreError::InvalidKey { .. })
    }

    /// True if a callback tried to wait on its own store
    pub fn is_would_deadlock(&self) -> bool {
        matches!(self, StoreError::WouldDeadlock)
    }

    /// True if the operation was issued after `close()`
    pub fn is_closed(&self) -> bool {
        matches!(self, StoreError::Closed)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
