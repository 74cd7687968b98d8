//! Worker Module
//!
//! One dedicated thread per store that owns the `Engine` and runs queued
//! requests one at a time.
//!
//! ## Concurrency Model
//! - Any number of threads may submit requests concurrently
//! - Requests run strictly one after another on the worker thread, so no
//!   two operations ever touch the backing file at the same time
//! - No ordering is promised between requests from different callers
//! - Shutdown drops the sender: the worker finishes everything already
//!   queued, closes the engine and exits
//! - Requests made after shutdown are completed with `Closed` on a
//!   short-lived thread, never on the caller's
//! - Callbacks run on the worker; a `Pending` waited on from there fails
//!   with `WouldDeadlock` rather than blocking the queue

mod pending;

use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Receiver, SendError, Sender};
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{Result, StoreError};

/// Name of the short-lived thread that completes requests made after close
const REJECT_THREAD_NAME: &str = "collection-store-closed";

pub use pending::Pending;
pub(crate) use pending::Completer;

/// A queued request
///
/// Exactly one of `run` or `reject` is called for every job.
pub(crate) trait Job: Send {
    fn run(self: Box<Self>, engine: &mut Engine);

    fn reject(self: Box<Self>, error: StoreError);
}

/// Operation plus the callback that receives its result
pub(crate) struct Request<T, Op, F> {
    op: Op,
    callback: F,
    _result: PhantomData<fn() -> T>,
}

impl<T, Op, F> Request<T, Op, F>
where
    Op: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
    F: FnOnce(Result<T>) + Send + 'static,
{
    pub(crate) fn new(op: Op, callback: F) -> Self {
        Self {
            op,
            callback,
            _result: PhantomData,
        }
    }
}

impl<T, Op, F> Job for Request<T, Op, F>
where
    Op: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
    F: FnOnce(Result<T>) + Send + 'static,
{
    fn run(self: Box<Self>, engine: &mut Engine) {
        let Request { op, callback, .. } = *self;

        let result = panic::catch_unwind(AssertUnwindSafe(|| op(engine)))
            .unwrap_or_else(|_| Err(StoreError::Internal("operation panicked".to_string())));

        callback(result);
    }

    fn reject(self: Box<Self>, error: StoreError) {
        let Request { callback, .. } = *self;
        callback(Err(error));
    }
}

/// Serialized executor for one `Engine`
pub struct Worker {
    /// `None` once shutdown has started
    sender: Mutex<Option<Sender<Box<dyn Job>>>>,

    /// Taken by whoever joins the thread
    handle: Mutex<Option<JoinHandle<()>>>,

    thread_id: ThreadId,
}

impl Worker {
    /// Move `engine` onto a new named thread
    pub fn spawn(engine: Engine, name: impl Into<String>) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Box<dyn Job>>();

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || run(engine, rx))?;
        let thread_id = handle.thread().id();

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Thread that runs the jobs and their callbacks
    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Queue a job; if the worker is shut down the job is rejected with
    /// `Closed`
    pub(crate) fn submit(&self, job: Box<dyn Job>) {
        let rejected = {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(tx) => tx.send(job).err().map(|SendError(job)| job),
                None => Some(job),
            }
        };

        if let Some(job) = rejected {
            reject_off_thread(job);
        }
    }

    /// True once `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting jobs, drain the queue and join the thread
    ///
    /// Safe to call more than once and from any thread. Called from a
    /// callback running on the worker itself it only stops intake; the
    /// thread exits once the current job returns.
    pub fn shutdown(&self) -> Result<()> {
        drop(self.sender.lock().take());

        if thread::current().id() == self.thread_id {
            return Ok(());
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| StoreError::Internal("collection store worker panicked".to_string()))?;
        }

        Ok(())
    }
}

/// Complete a job refused after shutdown without running its callback on
/// the submitting thread
fn reject_off_thread(job: Box<dyn Job>) {
    let slot = Arc::new(Mutex::new(Some(job)));
    let theirs = Arc::clone(&slot);

    let spawned = thread::Builder::new()
        .name(REJECT_THREAD_NAME.to_string())
        .spawn(move || {
            let job = theirs.lock().take();
            if let Some(job) = job {
                job.reject(StoreError::Closed);
            }
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "no thread for rejected request; completing it inline");
        let job = slot.lock().take();
        if let Some(job) = job {
            job.reject(StoreError::Closed);
        }
    }
}

/// Worker loop: run every job until all senders are gone
fn run(mut engine: Engine, rx: Receiver<Box<dyn Job>>) {
    tracing::debug!(location = %engine.location(), "collection store worker started");

    for job in rx.iter() {
        // A panicking callback must not take the queue down with it
        if panic::catch_unwind(AssertUnwindSafe(|| job.run(&mut engine))).is_err() {
            tracing::error!("collection store callback panicked");
        }
    }

    engine.close();
    tracing::debug!(location = %engine.location(), "collection store worker stopped");
}
