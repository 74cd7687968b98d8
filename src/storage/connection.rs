//! Connection / schema manager
//!
//! Owns the single handle to the backing table and decides, before every
//! operation, whether that handle is still valid.
//!
//! ## State machine
//! ```text
//!   Unopened ──first use──▶ Open ──close()──▶ Closed
//!      ▲                     │
//!      └──file deleted───────┘
//! ```
//! For on-disk locations the file is revalidated at the start of each
//! operation: a missing file reads as an empty table and is recreated by the
//! next write, a file changed by someone else is reloaded, and a file that
//! is not a valid store fails the operation with `CorruptStore` without
//! being touched.

use std::path::Path;

use crate::config::Config;
use crate::error::{Result, StoreError};

use super::backend::Table;
use super::file::{FileOptions, FileTable, FileState};
use super::location::StorageLocation;
use super::memory::MemoryTable;

/// What an operation needs from a missing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Serve a missing file as an empty table; create nothing
    Read,
    /// Create a missing file before handing out the table
    Write,
}

/// Live handle to one of the backends
enum Handle {
    Memory(MemoryTable),
    File(FileTable),
    /// Stand-in for an on-disk file that does not exist yet; always empty
    Absent(MemoryTable),
}

impl Handle {
    fn table(&mut self) -> &mut dyn Table {
        match self {
            Handle::Memory(table) | Handle::Absent(table) => table,
            Handle::File(table) => table,
        }
    }
}

enum State {
    Unopened,
    Open(Handle),
    Closed,
}

/// Lazily opened connection to a storage location
pub struct Connection {
    location: StorageLocation,
    options: FileOptions,
    state: State,
}

impl Connection {
    /// Create a connection; nothing is opened until first use
    pub fn new(config: &Config) -> Self {
        Self {
            location: config.location.clone(),
            options: FileOptions::from(config),
            state: State::Unopened,
        }
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// True while holding a real table; a missing file read as empty does
    /// not count
    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(Handle::File(_) | Handle::Memory(_)))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Get the table, opening, creating or reloading it as needed
    ///
    /// With `Access::Read` a missing file is not created; callers must then
    /// only read from the returned table.
    pub fn table(&mut self, access: Access) -> Result<&mut dyn Table> {
        if let State::Closed = self.state {
            return Err(StoreError::Closed);
        }

        let refreshed = match self.location.path().map(Path::to_path_buf) {
            None => match self.state {
                State::Unopened => Some(Handle::Memory(MemoryTable::new())),
                _ => None,
            },
            Some(path) => self.revalidate_file(&path, access)?,
        };

        if let Some(handle) = refreshed {
            self.state = State::Open(handle);
        }

        match &mut self.state {
            State::Open(handle) => Ok(handle.table()),
            _ => Err(StoreError::Closed),
        }
    }

    /// Release the handle. Later calls to `table()` fail with `Closed`.
    pub fn close(&mut self) {
        if let State::Open(_) = self.state {
            tracing::debug!(location = %self.location, "closing collection store connection");
        }
        self.state = State::Closed;
    }

    /// Decide whether the open file handle still reflects the file on disk
    ///
    /// Returns a replacement handle, or `None` to keep the current one.
    fn revalidate_file(&mut self, path: &Path, access: Access) -> Result<Option<Handle>> {
        let state = match FileTable::inspect(path) {
            Ok(state) => state,
            Err(e) => {
                if e.is_corrupt() {
                    tracing::warn!(path = %path.display(), error = %e, "collection store file is corrupt");
                    self.state = State::Unopened;
                }
                return Err(e);
            }
        };

        let current = match &self.state {
            State::Open(Handle::File(table)) => Some(table.fingerprint()),
            _ => None,
        };

        match state {
            FileState::Missing | FileState::Empty => {
                if current.is_some() {
                    tracing::warn!(
                        path = %path.display(),
                        "collection store file disappeared; store is empty"
                    );
                }

                match access {
                    Access::Read => match self.state {
                        State::Open(Handle::Absent(_)) => Ok(None),
                        _ => Ok(Some(Handle::Absent(MemoryTable::new()))),
                    },
                    Access::Write => {
                        // Drop the old handle before the path is recreated
                        self.state = State::Unopened;
                        FileTable::create(path, self.options)
                            .map(|table| Some(Handle::File(table)))
                    }
                }
            }
            FileState::Present(fingerprint) if current == Some(fingerprint) => Ok(None),
            FileState::Present(_) => {
                self.state = State::Unopened;
                match FileTable::load(path, self.options) {
                    Ok(table) => Ok(Some(Handle::File(table))),
                    Err(e) => {
                        if e.is_corrupt() {
                            tracing::warn!(path = %path.display(), error = %e, "collection store file is corrupt");
                        }
                        Err(e)
                    }
                }
            }
        }
    }
}
