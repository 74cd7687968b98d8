//! Collections storage
//!
//! Public, thread-safe entry point. Every operation is queued onto the
//! store's worker and returns immediately; the result arrives later through
//! a `Pending` handle or a callback.
//!
//! ```no_run
//! use collection_store::{CollectionSource, CollectionsStorage, PackageCollection};
//!
//! # fn main() -> collection_store::Result<()> {
//! let storage = CollectionsStorage::on_disk("/tmp/collections.db")?;
//!
//! let source = CollectionSource::json("https://example.com/collection.json");
//! let collection = PackageCollection::new(source.clone(), "Example");
//! storage.put(collection).wait()?;
//!
//! let stored = storage.get(&source.identifier()).wait()?;
//! assert_eq!(stored.name, "Example");
//!
//! storage.close()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{CollectionIdentifier, PackageCollection};
use crate::storage::{StorageLocation, TableStats};
use crate::worker::{Completer, Pending, Request, Worker};

/// Name of the worker thread
const WORKER_THREAD_NAME: &str = "collection-store";

/// Durable (or in-memory) cache of package collections
///
/// All requests against one instance run one at a time on a dedicated
/// worker thread. Callers on any number of threads may issue operations
/// concurrently; each operation is applied atomically and completes
/// exactly once.
///
/// Callbacks passed to the `*_with` methods never run on the calling
/// thread. They run on the worker, or on a short-lived thread when the
/// store is already closed. A callback may issue further operations on the
/// same store, but waiting on their `Pending` from inside it fails with
/// `WouldDeadlock`; chain another `*_with` call instead.
pub struct CollectionsStorage {
    config: Config,
    worker: Worker,
}

impl CollectionsStorage {
    /// Create a store with the given config
    ///
    /// Nothing is opened or created on disk until the first operation.
    pub fn open(config: Config) -> Result<Self> {
        let engine = Engine::open(config.clone())?;
        let worker = Worker::spawn(engine, WORKER_THREAD_NAME)?;

        Ok(Self { config, worker })
    }

    /// Store backed by the file at `path`, default settings otherwise
    pub fn on_disk(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }

    /// Private in-memory store, default settings otherwise
    pub fn in_memory() -> Result<Self> {
        Self::open(Config::builder().in_memory().build())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Look up one collection; fails with `NotFound` if it is not stored
    pub fn get(&self, identifier: &CollectionIdentifier) -> Pending<PackageCollection> {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.get_with(identifier, complete_with(completer));
        pending
    }

    pub fn get_with<F>(&self, identifier: &CollectionIdentifier, callback: F)
    where
        F: FnOnce(Result<PackageCollection>) + Send + 'static,
    {
        let identifier = identifier.clone();
        self.dispatch(move |engine| engine.get(&identifier), callback);
    }

    /// Insert or replace a collection; resolves to the stored value
    pub fn put(&self, collection: PackageCollection) -> Pending<PackageCollection> {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.put_with(collection, complete_with(completer));
        pending
    }

    pub fn put_with<F>(&self, collection: PackageCollection, callback: F)
    where
        F: FnOnce(Result<PackageCollection>) + Send + 'static,
    {
        self.dispatch(move |engine| engine.put(collection), callback);
    }

    /// Make sure no entry exists for `identifier`. Succeeds if none did.
    pub fn remove(&self, identifier: &CollectionIdentifier) -> Pending<()> {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.remove_with(identifier, complete_with(completer));
        pending
    }

    pub fn remove_with<F>(&self, identifier: &CollectionIdentifier, callback: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let identifier = identifier.clone();
        self.dispatch(move |engine| engine.remove(&identifier), callback);
    }

    /// Every stored collection
    pub fn list(&self) -> Pending<Vec<PackageCollection>> {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.list_with(complete_with(completer));
        pending
    }

    pub fn list_with<F>(&self, callback: F)
    where
        F: FnOnce(Result<Vec<PackageCollection>>) + Send + 'static,
    {
        self.dispatch(|engine| engine.list(), callback);
    }

    /// Stored collections among `identifiers`; unknown ones are skipped
    pub fn list_by_ids<I>(&self, identifiers: I) -> Pending<Vec<PackageCollection>>
    where
        I: IntoIterator<Item = CollectionIdentifier>,
    {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.list_by_ids_with(identifiers, complete_with(completer));
        pending
    }

    pub fn list_by_ids_with<I, F>(&self, identifiers: I, callback: F)
    where
        I: IntoIterator<Item = CollectionIdentifier>,
        F: FnOnce(Result<Vec<PackageCollection>>) + Send + 'static,
    {
        let identifiers: Vec<CollectionIdentifier> = identifiers.into_iter().collect();
        self.dispatch(move |engine| engine.list_by_ids(&identifiers), callback);
    }

    /// Number of stored collections
    pub fn count(&self) -> Pending<usize> {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.dispatch(|engine| engine.count(), complete_with(completer));
        pending
    }

    /// Size information about the backing table
    pub fn stats(&self) -> Pending<TableStats> {
        let (completer, pending) = Pending::channel(self.worker.thread_id());
        self.dispatch(|engine| engine.stats(), complete_with(completer));
        pending
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Finish queued operations, then release the backing handle
    ///
    /// Idempotent. Operations issued afterwards fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        self.worker.shutdown()
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_shut_down()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn location(&self) -> &StorageLocation {
        &self.config.location
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn dispatch<T, Op, F>(&self, op: Op, callback: F)
    where
        T: Send + 'static,
        Op: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        self.worker.submit(Box::new(Request::new(op, callback)));
    }
}

impl Drop for CollectionsStorage {
    fn drop(&mut self) {
        if let Err(e) = self.worker.shutdown() {
            tracing::warn!(error = %e, "failed to shut down collection store worker");
        }
    }
}

fn complete_with<T>(completer: Completer<T>) -> impl FnOnce(Result<T>) + Send + 'static
where
    T: Send + 'static,
{
    move |result| completer.complete(result)
}
