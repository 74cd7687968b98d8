//! Pending results
//!
//! One-shot handle for a result produced on the worker thread.

use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{Result, StoreError};

/// Result of an operation that has been queued but may not have run yet
///
/// Dropping a `Pending` does not cancel the operation; it still runs and its
/// result is discarded.
#[must_use = "the operation runs regardless; wait on it to observe the result"]
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<Result<T>>,
    /// Thread that will produce the result; blocking on it would never end
    worker: ThreadId,
}

/// Sending half of a `Pending`; consumed by completion
#[derive(Debug)]
pub(crate) struct Completer<T> {
    tx: Sender<Result<T>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(self, result: Result<T>) {
        // The receiver may already be gone; nobody is waiting then
        let _ = self.tx.send(result);
    }
}

impl<T> Pending<T> {
    pub(crate) fn channel(worker: ThreadId) -> (Completer<T>, Pending<T>) {
        let (tx, rx) = channel::bounded(1);
        (Completer { tx }, Pending { rx, worker })
    }

    /// Block until the operation completes
    ///
    /// Fails with `WouldDeadlock` instead of blocking when called from a
    /// callback running on the store's own worker.
    pub fn wait(self) -> Result<T> {
        if let Some(result) = self.refuse_self_wait() {
            return result;
        }
        self.rx.recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// Block for at most `timeout`
    ///
    /// On timeout the handle is returned so the caller can keep waiting.
    /// Like `wait`, fails at once with `WouldDeadlock` on the worker thread.
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        if let Some(result) = self.refuse_self_wait() {
            return Ok(result);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(abandoned())),
        }
    }

    /// Take the result if it is already there
    pub fn try_take(self) -> std::result::Result<Result<T>, Self> {
        match self.rx.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(abandoned())),
        }
    }

    /// True once the result is available
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    /// A result that is already there is handed out even on the worker;
    /// anything else would wait on the thread doing the waiting.
    fn refuse_self_wait(&self) -> Option<Result<T>> {
        if thread::current().id() != self.worker {
            return None;
        }
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => Some(Err(StoreError::WouldDeadlock)),
            Err(TryRecvError::Disconnected) => Some(Err(abandoned())),
        }
    }
}

/// The worker went away without completing the request
fn abandoned() -> StoreError {
    StoreError::Closed
}
