//! In-memory table
//!
//! BTreeMap-backed table used for `StorageLocation::InMemory`.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::Result;

use super::backend::{check_key, check_lookup_size, Row, Table, TableStats};

/// Private, non-shared table living in process memory
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Sum of key + payload lengths
    bytes: u64,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Table for MemoryTable {
    fn lookup(&mut self, keys: &[&[u8]]) -> Result<Vec<Row>> {
        check_lookup_size(keys.len())?;

        Ok(keys
            .iter()
            .filter_map(|key| {
                self.rows
                    .get_key_value(*key)
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect())
    }

    fn scan(&mut self, after: Option<&[u8]>, limit: usize) -> Result<Vec<Row>> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        Ok(self
            .rows
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;

        if let Some(old) = self.rows.insert(key.to_vec(), value.to_vec()) {
            self.bytes -= (key.len() + old.len()) as u64;
        }
        self.bytes += (key.len() + value.len()) as u64;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        match self.rows.remove(key) {
            Some(old) => {
                self.bytes -= (key.len() + old.len()) as u64;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn stats(&self) -> TableStats {
        TableStats {
            entry_count: self.rows.len(),
            live_bytes: self.bytes,
            total_bytes: self.bytes,
            generation: 0,
        }
    }
}
