//! File format
//!
//! Header and record framing for the backing file. All integers are
//! little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// =============================================================================
// Shared Constants (used by the file table and its loader)
// =============================================================================

/// Magic bytes identifying a collection store file
pub const MAGIC: &[u8; 8] = b"PKGCOLDB";

/// Current schema version
pub const SCHEMA_VERSION: u16 = 1;

/// Header size: Magic (8) + Version (2) + Reserved (2) + Generation (8)
/// + Created (8) + CRC (4) = 32 bytes
pub const HEADER_SIZE: u64 = 32;

/// Record header size: Kind (1) + KeyLen (4) + ValLen (4) + CRC (4) = 13 bytes
pub const RECORD_HEADER_SIZE: u64 = 13;

/// Longest key a record may carry; writes above it are refused and reads
/// above it are treated as corruption
pub const MAX_KEY_LEN: u32 = 64 * 1024;

/// Bytes covered by the header CRC
const HEADER_CRC_OFFSET: usize = 28;

// =============================================================================
// Header
// =============================================================================

/// File header, written once on creation and again on every compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Bumped each time the file is rewritten
    pub generation: u64,
    /// Unix millis the store was first created
    pub created_at: u64,
}

impl Header {
    pub fn new(generation: u64, created_at: u64) -> Self {
        Self {
            generation,
            created_at,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_slice(MAGIC);
        buf.put_u16_le(SCHEMA_VERSION);
        buf.put_u16_le(0);
        buf.put_u64_le(self.generation);
        buf.put_u64_le(self.created_at);

        let crc = crc32fast::hash(&buf[..HEADER_CRC_OFFSET]);
        buf.put_u32_le(crc);

        let mut out = [0u8; HEADER_SIZE as usize];
        out.copy_from_slice(&buf);
        out
    }

    /// Parse and verify a header
    ///
    /// The error is a human-readable reason; callers attach the path.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(format!(
                "truncated header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            ));
        }

        if &bytes[0..8] != MAGIC {
            return Err("bad magic bytes".to_string());
        }

        let mut buf = &bytes[8..HEADER_SIZE as usize];
        let version = buf.get_u16_le();
        let _reserved = buf.get_u16_le();
        let generation = buf.get_u64_le();
        let created_at = buf.get_u64_le();
        let stored_crc = buf.get_u32_le();

        let computed_crc = crc32fast::hash(&bytes[..HEADER_CRC_OFFSET]);
        if stored_crc != computed_crc {
            return Err(format!(
                "header checksum mismatch: stored {:08x}, computed {:08x}",
                stored_crc, computed_crc
            ));
        }

        if version != SCHEMA_VERSION {
            return Err(format!("unsupported schema version {}", version));
        }

        Ok(Self {
            generation,
            created_at,
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// What a record does to its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Put = 1,
    Remove = 2,
}

impl RecordKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(RecordKind::Put),
            2 => Some(RecordKind::Remove),
            _ => None,
        }
    }
}

/// Parsed record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    pub key_len: u32,
    pub val_len: u32,
    pub crc: u32,
}

impl RecordHeader {
    /// Size of the whole record including this header
    pub fn record_len(&self) -> u64 {
        RECORD_HEADER_SIZE + self.key_len as u64 + self.val_len as u64
    }

    pub fn decode(bytes: &[u8; RECORD_HEADER_SIZE as usize]) -> std::result::Result<Self, String> {
        let mut buf = &bytes[..];
        let kind_byte = buf.get_u8();
        let kind = RecordKind::from_u8(kind_byte)
            .ok_or_else(|| format!("unknown record kind 0x{:02x}", kind_byte))?;
        let key_len = buf.get_u32_le();
        let val_len = buf.get_u32_le();
        let crc = buf.get_u32_le();

        if key_len == 0 || key_len > MAX_KEY_LEN {
            return Err(format!("invalid key length {}", key_len));
        }
        if kind == RecordKind::Remove && val_len != 0 {
            return Err("remove record carries a value".to_string());
        }

        Ok(Self {
            kind,
            key_len,
            val_len,
            crc,
        })
    }

    /// Check the body (key followed by value) against the stored CRC
    pub fn verify(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), String> {
        let computed = record_crc(self.kind, key, value);
        if computed != self.crc {
            return Err(format!(
                "record checksum mismatch: stored {:08x}, computed {:08x}",
                self.crc, computed
            ));
        }
        Ok(())
    }
}

/// CRC over kind, lengths, key and value
pub fn record_crc(kind: RecordKind, key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[kind as u8]);
    hasher.update(&(key.len() as u32).to_le_bytes());
    hasher.update(&(value.len() as u32).to_le_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Frame one record: `[kind][key_len][val_len][crc][key][value]`
pub fn encode_record(kind: RecordKind, key: &[u8], value: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE as usize + key.len() + value.len());
    buf.put_u8(kind as u8);
    buf.put_u32_le(key.len() as u32);
    buf.put_u32_le(value.len() as u32);
    buf.put_u32_le(record_crc(kind, key, value));
    buf.put_slice(key);
    buf.put_slice(value);
    buf.freeze()
}
