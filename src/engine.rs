//! Engine Module
//!
//! CRUD operations over the connection, run one at a time on the worker.
//!
//! ## Responsibilities
//! - Encode collections into opaque payloads and decode them back
//! - Map missing rows to `NotFound`
//! - Page through the table for unfiltered listing
//! - Batch identifier lookups through the planner

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::model::{CollectionIdentifier, PackageCollection};
use crate::planner;
use crate::storage::{Access, Connection, StorageLocation, TableStats};

/// Synchronous CRUD layer
///
/// Not thread-safe on its own: `CollectionsStorage` owns exactly one
/// `Engine` and only touches it from its worker thread.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Lazily opened handle to the backing table
    connection: Connection,
}

impl Engine {
    /// Create an engine with the given config
    ///
    /// The config is validated here; the backing table is not opened until
    /// the first operation.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let connection = Connection::new(&config);
        tracing::debug!(
            location = %config.location,
            batch_size = config.batch_size,
            "collection store engine created"
        );

        Ok(Self { config, connection })
    }

    /// Look up one collection
    pub fn get(&mut self, identifier: &CollectionIdentifier) -> Result<PackageCollection> {
        tracing::trace!(%identifier, "get");

        let table = self.connection.table(Access::Read)?;
        let mut rows = table.lookup(&[identifier.as_bytes()])?;

        match rows.pop() {
            Some((_, payload)) => decode_payload(&self.config.location, identifier, &payload),
            None => Err(StoreError::NotFound(identifier.clone())),
        }
    }

    /// Insert or replace a collection, returning the stored value
    pub fn put(&mut self, collection: PackageCollection) -> Result<PackageCollection> {
        tracing::trace!(identifier = %collection.identifier, "put");

        let payload = collection.encode()?;
        let table = self.connection.table(Access::Write)?;
        table.upsert(collection.identifier.as_bytes(), &payload)?;

        Ok(collection)
    }

    /// Make sure no entry exists for `identifier`
    pub fn remove(&mut self, identifier: &CollectionIdentifier) -> Result<()> {
        // Removing from a missing file has nothing to do; never create it
        let table = self.connection.table(Access::Read)?;
        let existed = table.delete(identifier.as_bytes())?;

        tracing::trace!(%identifier, existed, "remove");
        Ok(())
    }

    /// Every stored collection, ordered by identifier
    ///
    /// Reads the table one page of `batch_size` rows at a time.
    pub fn list(&mut self) -> Result<Vec<PackageCollection>> {
        let batch_size = self.config.batch_size;
        let table = self.connection.table(Access::Read)?;

        let mut collections = Vec::with_capacity(table.len());
        let mut after: Option<Vec<u8>> = None;
        let mut pages = 0usize;

        loop {
            let page = table.scan(after.as_deref(), batch_size)?;
            let exhausted = page.len() < batch_size;
            pages += 1;

            after = page.last().map(|(key, _)| key.clone());
            for (key, payload) in page {
                let identifier = identifier_from_key(&self.config.location, key)?;
                collections.push(decode_payload(&self.config.location, &identifier, &payload)?);
            }

            if exhausted {
                break;
            }
        }

        tracing::trace!(count = collections.len(), pages, "list");
        Ok(collections)
    }

    /// Stored collections whose identifier is in `identifiers`
    ///
    /// Unknown identifiers are skipped. Duplicates in the input are
    /// collapsed; lookups are issued in chunks of `batch_size`.
    pub fn list_by_ids(
        &mut self,
        identifiers: &[CollectionIdentifier],
    ) -> Result<Vec<PackageCollection>> {
        let unique: BTreeSet<&CollectionIdentifier> = identifiers.iter().collect();
        let keys: Vec<&[u8]> = unique.iter().map(|id| id.as_bytes()).collect();

        let plan = planner::plan(&keys, self.config.batch_size)?;
        let lookups = plan.len();
        let table = self.connection.table(Access::Read)?;

        let mut collections = Vec::with_capacity(keys.len());
        for chunk in plan {
            for (key, payload) in table.lookup(chunk)? {
                let identifier = identifier_from_key(&self.config.location, key)?;
                collections.push(decode_payload(&self.config.location, &identifier, &payload)?);
            }
        }

        tracing::trace!(
            requested = keys.len(),
            found = collections.len(),
            lookups,
            "list by identifiers"
        );
        Ok(collections)
    }

    /// Number of stored collections
    pub fn count(&mut self) -> Result<usize> {
        Ok(self.connection.table(Access::Read)?.len())
    }

    /// Size information about the backing table
    pub fn stats(&mut self) -> Result<TableStats> {
        Ok(self.connection.table(Access::Read)?.stats())
    }

    /// Release the backing handle; later operations fail with `Closed`
    pub fn close(&mut self) {
        self.connection.close();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn location(&self) -> &StorageLocation {
        &self.config.location
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

/// Path to report in a corruption error
fn store_path(location: &StorageLocation) -> PathBuf {
    match location {
        StorageLocation::OnDisk(path) => path.clone(),
        StorageLocation::InMemory => PathBuf::from(":memory:"),
    }
}

/// A payload that passed its checksum but does not decode was written by an
/// incompatible version; that makes the store unusable, not just the row.
fn decode_payload(
    location: &StorageLocation,
    identifier: &CollectionIdentifier,
    payload: &[u8],
) -> Result<PackageCollection> {
    PackageCollection::decode(payload).map_err(|e| {
        StoreError::corrupt(
            store_path(location),
            format!("undecodable payload for {}: {}", identifier, e),
        )
    })
}

fn identifier_from_key(location: &StorageLocation, key: Vec<u8>) -> Result<CollectionIdentifier> {
    String::from_utf8(key)
        .map(CollectionIdentifier::from_key)
        .map_err(|_| StoreError::corrupt(store_path(location), "identifier key is not valid UTF-8"))
}
