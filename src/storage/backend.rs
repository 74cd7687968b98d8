//! Table abstraction shared by the file and memory backends

use crate::error::{Result, StoreError};
use crate::planner::MAX_KEYS_PER_LOOKUP;

use super::format::MAX_KEY_LEN;

/// A stored `(key, payload)` pair
pub type Row = (Vec<u8>, Vec<u8>);

/// One logical key → payload table
///
/// Implementations hold at most one payload per key. Keys are ordered
/// bytewise; `scan` pages through them in that order.
pub trait Table: Send {
    /// Fetch the rows for `keys`. Keys with no row are skipped.
    ///
    /// Fails with `TooManyKeys` when more than `MAX_KEYS_PER_LOOKUP` keys
    /// are passed in one call.
    fn lookup(&mut self, keys: &[&[u8]]) -> Result<Vec<Row>>;

    /// Up to `limit` rows with keys strictly greater than `after`
    fn scan(&mut self, after: Option<&[u8]>, limit: usize) -> Result<Vec<Row>>;

    /// Insert or replace the payload for `key`
    ///
    /// Fails with `InvalidKey`, writing nothing, when `key` is empty or
    /// longer than `MAX_KEY_LEN`.
    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Returns whether a row existed.
    fn delete(&mut self, key: &[u8]) -> Result<bool>;

    /// Number of live rows
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> TableStats;
}

/// Size information about a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Live rows
    pub entry_count: usize,
    /// Bytes taken by live rows (keys + payloads, plus framing on disk)
    pub live_bytes: u64,
    /// Total bytes including superseded records (equals live for memory)
    pub total_bytes: u64,
    /// Rewrite counter of the backing file (0 for memory)
    pub generation: u64,
}

/// Reject lookups above the engine's key ceiling
pub(crate) fn check_lookup_size(keys: usize) -> Result<()> {
    if keys > MAX_KEYS_PER_LOOKUP {
        return Err(StoreError::TooManyKeys {
            requested: keys,
            limit: MAX_KEYS_PER_LOOKUP,
        });
    }
    Ok(())
}

/// Refuse keys the file format cannot read back
pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN as usize {
        return Err(StoreError::InvalidKey {
            len: key.len(),
            limit: MAX_KEY_LEN as usize,
        });
    }
    Ok(())
}
