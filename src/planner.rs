//! Batching Query Planner
//!
//! Splits a key set into contiguous chunks small enough for one lookup.
//!
//! The backing tables refuse a lookup with more than `MAX_KEYS_PER_LOOKUP`
//! keys. This module is the only place that decides how many keys go into
//! one round trip; the CRUD layer just iterates the plan.

use crate::error::{Result, StoreError};

/// Hard ceiling on keys per lookup enforced by the backing tables
pub const MAX_KEYS_PER_LOOKUP: usize = 999;

/// Ordered, non-overlapping chunks covering every key exactly once
#[derive(Debug, Clone)]
pub struct BatchPlan<'a, T> {
    remaining: &'a [T],
    batch_size: usize,
}

impl<'a, T> BatchPlan<'a, T> {
    /// Plan lookups of at most `batch_size` keys
    ///
    /// Fails with `Config` if `batch_size` is zero or above the lookup
    /// ceiling.
    pub fn new(keys: &'a [T], batch_size: usize) -> Result<Self> {
        if batch_size == 0 || batch_size > MAX_KEYS_PER_LOOKUP {
            return Err(StoreError::Config(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_KEYS_PER_LOOKUP, batch_size
            )));
        }

        Ok(Self {
            remaining: keys,
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<'a, T> Iterator for BatchPlan<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let take = self.remaining.len().min(self.batch_size);
        let (chunk, rest) = self.remaining.split_at(take);
        self.remaining = rest;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chunks = self.remaining.len().div_ceil(self.batch_size);
        (chunks, Some(chunks))
    }
}

impl<'a, T> ExactSizeIterator for BatchPlan<'a, T> {}

/// Plan `keys` into chunks of at most `batch_size`
pub fn plan<T>(keys: &[T], batch_size: usize) -> Result<BatchPlan<'_, T>> {
    BatchPlan::new(keys, batch_size)
}
