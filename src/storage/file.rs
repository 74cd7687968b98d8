//! File-backed table
//!
//! Append-only record log with an in-memory index of record offsets.
//! Payloads stay on disk and are read back (and re-verified) on every
//! lookup; the index only says where to look.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{Config, SyncStrategy};
use crate::error::{Result, StoreError};

use super::backend::{check_key, check_lookup_size, Row, Table, TableStats};
use super::format::{
    encode_record, Header, RecordHeader, RecordKind, HEADER_SIZE, RECORD_HEADER_SIZE,
};

/// Tunables the file table needs from the store config
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    pub sync_strategy: SyncStrategy,
    pub compaction_threshold: f64,
    pub compaction_min_bytes: u64,
}

impl From<&Config> for FileOptions {
    fn from(config: &Config) -> Self {
        Self {
            sync_strategy: config.sync_strategy,
            compaction_threshold: config.compaction_threshold,
            compaction_min_bytes: config.compaction_min_bytes,
        }
    }
}

impl Default for FileOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Identity of the file contents as last seen by this table
///
/// Any change made by someone else shows up as a different length or
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub generation: u64,
}

/// What is currently at the table's path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No file
    Missing,
    /// Zero-length file, treated like a missing one
    Empty,
    /// File with a valid header
    Present(Fingerprint),
}

/// Location of a live put record
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    key_len: u32,
    val_len: u32,
}

impl Slot {
    fn record_len(&self) -> u64 {
        RECORD_HEADER_SIZE + self.key_len as u64 + self.val_len as u64
    }
}

/// Table stored in a single file
pub struct FileTable {
    path: PathBuf,
    file: File,
    header: Header,
    /// key → offset of its latest put record
    index: BTreeMap<Vec<u8>, Slot>,
    /// Bytes of the file this table has written or verified
    file_len: u64,
    /// Bytes taken by live put records
    live_bytes: u64,
    options: FileOptions,
}

impl FileTable {
    // =========================================================================
    // Open / Create
    // =========================================================================

    /// Look at the path without opening a table
    ///
    /// Only the header is read. A header that does not parse is reported
    /// as `CorruptStore`.
    pub fn inspect(path: &Path) -> Result<FileState> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileState::Missing),
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Err(StoreError::corrupt(path, "not a regular file"));
        }
        if metadata.len() == 0 {
            return Ok(FileState::Empty);
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileState::Missing),
            Err(e) => return Err(e.into()),
        };

        let mut header_bytes = Vec::with_capacity(HEADER_SIZE as usize);
        file.take(HEADER_SIZE).read_to_end(&mut header_bytes)?;
        let header = Header::decode(&header_bytes).map_err(|reason| StoreError::corrupt(path, reason))?;

        Ok(FileState::Present(Fingerprint {
            len: metadata.len(),
            generation: header.generation,
        }))
    }

    /// Create a fresh file at `path`, replacing whatever is there
    pub fn create(path: &Path, options: FileOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = Header::new(0, unix_millis());
        file.write_all(&header.encode())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), "created collection store file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            index: BTreeMap::new(),
            file_len: HEADER_SIZE,
            live_bytes: 0,
            options,
        })
    }

    /// Open an existing file and rebuild the index by replaying every record
    ///
    /// Every record's checksum is verified. Anything that does not parse,
    /// including a record cut short at the end of the file, fails the whole
    /// load with `CorruptStore`; the file is left untouched.
    pub fn load(path: &Path, options: FileOptions) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(&file);

        let mut header_bytes = [0u8; HEADER_SIZE as usize];
        read_exact_or_corrupt(&mut reader, &mut header_bytes, path, 0)?;
        let header =
            Header::decode(&header_bytes).map_err(|reason| StoreError::corrupt(path, reason))?;

        let mut index = BTreeMap::new();
        let mut live_bytes = 0u64;
        let mut offset = HEADER_SIZE;
        let mut records = 0u64;

        while offset < file_len {
            if file_len - offset < RECORD_HEADER_SIZE {
                return Err(StoreError::corrupt(
                    path,
                    format!("truncated record at offset {}", offset),
                ));
            }

            let mut record_header = [0u8; RECORD_HEADER_SIZE as usize];
            read_exact_or_corrupt(&mut reader, &mut record_header, path, offset)?;
            let record = RecordHeader::decode(&record_header).map_err(|reason| {
                StoreError::corrupt(path, format!("{} at offset {}", reason, offset))
            })?;

            if record.record_len() > file_len - offset {
                return Err(StoreError::corrupt(
                    path,
                    format!("truncated record at offset {}", offset),
                ));
            }

            let mut key = vec![0u8; record.key_len as usize];
            let mut value = vec![0u8; record.val_len as usize];
            read_exact_or_corrupt(&mut reader, &mut key, path, offset)?;
            read_exact_or_corrupt(&mut reader, &mut value, path, offset)?;
            record.verify(&key, &value).map_err(|reason| {
                StoreError::corrupt(path, format!("{} at offset {}", reason, offset))
            })?;

            match record.kind {
                RecordKind::Put => {
                    let slot = Slot {
                        offset,
                        key_len: record.key_len,
                        val_len: record.val_len,
                    };
                    if let Some(old) = index.insert(key, slot) {
                        live_bytes -= old.record_len();
                    }
                    live_bytes += slot.record_len();
                }
                RecordKind::Remove => {
                    if let Some(old) = index.remove(&key) {
                        live_bytes -= old.record_len();
                    }
                }
            }

            offset += record.record_len();
            records += 1;
        }

        drop(reader);

        tracing::debug!(
            path = %path.display(),
            records,
            entries = index.len(),
            generation = header.generation,
            "loaded collection store file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            index,
            file_len,
            live_bytes,
            options,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            len: self.file_len,
            generation: self.header.generation,
        }
    }

    pub fn header(&self) -> Header {
        self.header
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append one record; on failure the file is cut back to its old length
    fn append(&mut self, kind: RecordKind, key: &[u8], value: &[u8]) -> Result<Slot> {
        let record = encode_record(kind, key, value);
        let offset = self.file_len;

        let written = self
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(&record))
            .and_then(|_| match self.options.sync_strategy {
                SyncStrategy::EveryWrite => self.file.sync_data(),
                SyncStrategy::OsManaged => Ok(()),
            });

        if let Err(e) = written {
            if let Err(rollback) = self.file.set_len(offset) {
                tracing::warn!(
                    path = %self.path.display(),
                    offset,
                    error = %rollback,
                    "failed to cut back partial record"
                );
            }
            return Err(e.into());
        }

        self.file_len += record.len() as u64;

        Ok(Slot {
            offset,
            key_len: key.len() as u32,
            val_len: value.len() as u32,
        })
    }

    /// Compact once enough of the file is dead
    ///
    /// Runs after a write has already landed, so a failure is logged and
    /// left for the next write to retry rather than reported to the caller.
    fn maybe_compact(&mut self) {
        if self.file_len < self.options.compaction_min_bytes {
            return;
        }

        let dead = self.file_len - HEADER_SIZE - self.live_bytes;
        if (dead as f64) / (self.file_len as f64) < self.options.compaction_threshold {
            return;
        }

        if let Err(e) = self.compact() {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "compaction failed; keeping the uncompacted file"
            );
        }
    }

    /// Rewrite the file with only live records
    ///
    /// The new contents go to a sibling temp file that is renamed over the
    /// original, so the path always holds either the old or the new file.
    pub fn compact(&mut self) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".compact");
        let tmp_path = PathBuf::from(tmp_name);

        let header = Header::new(self.header.generation + 1, self.header.created_at);
        let previous_len = self.file_len;

        let renamed = self.write_compacted(&tmp_path, header).and_then(|written| {
            fs::rename(&tmp_path, &self.path)?;
            Ok(written)
        });

        let (file, index) = match renamed {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        // The handle follows the renamed file
        self.file = file;

        let live_bytes: u64 = index.values().map(Slot::record_len).sum();
        self.index = index;
        self.live_bytes = live_bytes;
        self.file_len = HEADER_SIZE + live_bytes;
        self.header = header;

        tracing::debug!(
            path = %self.path.display(),
            generation = header.generation,
            before = previous_len,
            after = self.file_len,
            "compacted collection store file"
        );

        Ok(())
    }

    fn write_compacted(
        &mut self,
        tmp_path: &Path,
        header: Header,
    ) -> Result<(File, BTreeMap<Vec<u8>, Slot>)> {
        let tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut out = BufWriter::new(tmp);
        out.write_all(&header.encode())?;

        let mut index = BTreeMap::new();
        let mut offset = HEADER_SIZE;

        for (key, slot) in &self.index {
            let value = read_value(&mut self.file, &self.path, key, slot)?;
            let record = encode_record(RecordKind::Put, key, &value);
            out.write_all(&record)?;

            index.insert(key.clone(), Slot { offset, ..*slot });
            offset += record.len() as u64;
        }

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok((file, index))
    }
}

impl Table for FileTable {
    fn lookup(&mut self, keys: &[&[u8]]) -> Result<Vec<Row>> {
        check_lookup_size(keys.len())?;

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(slot) = self.index.get(*key) {
                let value = read_value(&mut self.file, &self.path, key, slot)?;
                rows.push((key.to_vec(), value));
            }
        }
        Ok(rows)
    }

    fn scan(&mut self, after: Option<&[u8]>, limit: usize) -> Result<Vec<Row>> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut rows = Vec::with_capacity(limit.min(self.index.len()));
        for (key, slot) in self
            .index
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take(limit)
        {
            let value = read_value(&mut self.file, &self.path, key, slot)?;
            rows.push((key.clone(), value));
        }
        Ok(rows)
    }

    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;
        let slot = self.append(RecordKind::Put, key, value)?;

        if let Some(old) = self.index.insert(key.to_vec(), slot) {
            self.live_bytes -= old.record_len();
        }
        self.live_bytes += slot.record_len();

        self.maybe_compact();
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if !self.index.contains_key(key) {
            return Ok(false);
        }

        self.append(RecordKind::Remove, key, &[])?;
        if let Some(old) = self.index.remove(key) {
            self.live_bytes -= old.record_len();
        }

        self.maybe_compact();
        Ok(true)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn stats(&self) -> TableStats {
        TableStats {
            entry_count: self.index.len(),
            live_bytes: self.live_bytes,
            total_bytes: self.file_len,
            generation: self.header.generation,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Read and verify the put record at `slot`, returning its value
fn read_value(file: &mut File, path: &Path, key: &[u8], slot: &Slot) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(slot.offset))?;

    let mut header_bytes = [0u8; RECORD_HEADER_SIZE as usize];
    read_exact_or_corrupt(file, &mut header_bytes, path, slot.offset)?;
    let record = RecordHeader::decode(&header_bytes).map_err(|reason| {
        StoreError::corrupt(path, format!("{} at offset {}", reason, slot.offset))
    })?;

    if record.kind != RecordKind::Put
        || record.key_len != slot.key_len
        || record.val_len != slot.val_len
    {
        return Err(StoreError::corrupt(
            path,
            format!("record at offset {} no longer matches the index", slot.offset),
        ));
    }

    let mut body = vec![0u8; slot.key_len as usize + slot.val_len as usize];
    read_exact_or_corrupt(file, &mut body, path, slot.offset)?;

    let value = body.split_off(slot.key_len as usize);
    if body != key {
        return Err(StoreError::corrupt(
            path,
            format!("record at offset {} holds a different key", slot.offset),
        ));
    }
    record.verify(&body, &value).map_err(|reason| {
        StoreError::corrupt(path, format!("{} at offset {}", reason, slot.offset))
    })?;

    Ok(value)
}

/// `read_exact` that reports a short read as corruption
fn read_exact_or_corrupt(
    reader: &mut impl Read,
    buf: &mut [u8],
    path: &Path,
    offset: u64,
) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(StoreError::corrupt(
            path,
            format!("truncated record at offset {}", offset),
        )),
        Err(e) => Err(e.into()),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
