//! # Record - On-Disk Record Codec
//!
//! The single unit of storage in a SiltKV segment file. A segment is a plain
//! concatenation of records with no file header, trailer, or padding; every
//! record is self-delimiting through its leading size field.
//!
//! ## Binary Record Format
//!
//! ```text
//! [size: u32 LE][key_len: u32 LE][key ...][value_len: u32 LE][value_type: u16 LE][value ...]
//! ```
//!
//! `size` counts the **entire** record, itself included, so
//! `size = 14 + key_len + value_len`. Two value types exist: `0` is a UTF-8
//! string payload, `1` is an 8-byte little-endian signed integer.
//!
//! ## Example
//!
//! ```rust
//! use record::{read_string_value, Record, Value};
//! use std::io::Cursor;
//!
//! let rec = Record {
//!     key: "hello".to_string(),
//!     value: Value::Str("world".to_string()),
//! };
//! let bytes = rec.encode();
//!
//! let mut cursor = Cursor::new(bytes);
//! assert_eq!(read_string_value(&mut cursor).unwrap(), "world");
//! ```

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};
use thiserror::Error;

/// Value-type tag for a UTF-8 string payload.
pub const TYPE_STRING: u16 = 0;
/// Value-type tag for an 8-byte little-endian signed integer payload.
pub const TYPE_INT64: u16 = 1;

/// Fixed per-record overhead in bytes:
/// size (4) + key_len (4) + value_len (4) + value_type (2).
pub const RECORD_OVERHEAD: usize = 14;

/// A typed record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// UTF-8 string, stored verbatim.
    Str(String),
    /// Signed 64-bit integer, stored as 8 little-endian bytes.
    Int(i64),
}

impl Value {
    fn type_tag(&self) -> u16 {
        match self {
            Value::Str(_) => TYPE_STRING,
            Value::Int(_) => TYPE_INT64,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Int(_) => 8,
        }
    }
}

/// One key/value binding as it appears on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The lookup key (UTF-8).
    pub key: String,
    /// The typed payload.
    pub value: Value,
}

/// Errors produced while encoding, decoding, or streaming records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error. Reading past end-of-file surfaces here as
    /// `UnexpectedEof`.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The record at the read position holds a different value type than the
    /// caller asked for.
    #[error("wrong value type")]
    WrongType,

    /// The buffer is not a well-formed record: inconsistent length fields,
    /// an unknown type tag, or invalid UTF-8 where a string was declared.
    #[error("corrupt record")]
    Corrupt,
}

impl Record {
    /// Total encoded size of this record in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.key.len() + self.value.payload_len()
    }

    /// Serializes the record into a fresh buffer laid out per the crate docs.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let size = self.encoded_len();
        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&(self.value.payload_len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value.type_tag().to_le_bytes());
        match &self.value {
            Value::Str(s) => buf.extend_from_slice(s.as_bytes()),
            Value::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
        }
        buf
    }

    /// Parses one complete record from `buf`.
    ///
    /// `buf` must contain exactly the record: the declared size field has to
    /// match `buf.len()`. Every length field is bounds-checked before use, so
    /// a mangled buffer yields [`RecordError::Corrupt`] rather than a panic.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < RECORD_OVERHEAD {
            return Err(RecordError::Corrupt);
        }

        let mut r = buf;
        let size = r.read_u32::<LittleEndian>()? as usize;
        if size != buf.len() {
            return Err(RecordError::Corrupt);
        }

        let key_len = r.read_u32::<LittleEndian>()? as usize;
        if RECORD_OVERHEAD + key_len > buf.len() {
            return Err(RecordError::Corrupt);
        }
        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key)?;

        let value_len = r.read_u32::<LittleEndian>()? as usize;
        let value_type = r.read_u16::<LittleEndian>()?;
        if RECORD_OVERHEAD + key_len + value_len != buf.len() {
            return Err(RecordError::Corrupt);
        }

        let value = match value_type {
            TYPE_STRING => {
                let mut payload = vec![0u8; value_len];
                r.read_exact(&mut payload)?;
                Value::Str(String::from_utf8(payload).map_err(|_| RecordError::Corrupt)?)
            }
            TYPE_INT64 => {
                if value_len != 8 {
                    return Err(RecordError::Corrupt);
                }
                Value::Int(r.read_i64::<LittleEndian>()?)
            }
            _ => return Err(RecordError::Corrupt),
        };

        Ok(Record {
            key: String::from_utf8(key).map_err(|_| RecordError::Corrupt)?,
            value,
        })
    }
}

/// Reads one record from `r` (positioned at a record boundary) and returns
/// its string payload.
///
/// Fails with [`RecordError::WrongType`] if the stored type tag is not
/// [`TYPE_STRING`]. A stream that ends inside the record yields an
/// `UnexpectedEof` I/O error, never a silently short value.
pub fn read_string_value<R: Read>(r: &mut R) -> Result<String, RecordError> {
    let payload = read_payload(r, TYPE_STRING)?;
    String::from_utf8(payload).map_err(|_| RecordError::Corrupt)
}

/// Reads one record from `r` (positioned at a record boundary) and returns
/// its int64 payload.
///
/// Fails with [`RecordError::WrongType`] if the stored type tag is not
/// [`TYPE_INT64`].
pub fn read_i64_value<R: Read>(r: &mut R) -> Result<i64, RecordError> {
    let payload = read_payload(r, TYPE_INT64)?;
    if payload.len() != 8 {
        return Err(RecordError::Corrupt);
    }
    let mut p = &payload[..];
    Ok(p.read_i64::<LittleEndian>()?)
}

/// Walks one record's header, skips the key, verifies the type tag, and
/// returns the raw payload bytes.
fn read_payload<R: Read>(r: &mut R, expected_type: u16) -> Result<Vec<u8>, RecordError> {
    let _size = r.read_u32::<LittleEndian>()?;

    let key_len = r.read_u32::<LittleEndian>()? as u64;
    let skipped = io::copy(&mut r.by_ref().take(key_len), &mut io::sink())?;
    if skipped != key_len {
        return Err(RecordError::Io(io::ErrorKind::UnexpectedEof.into()));
    }

    let value_len = r.read_u32::<LittleEndian>()? as usize;
    let value_type = r.read_u16::<LittleEndian>()?;
    if value_type != expected_type {
        return Err(RecordError::WrongType);
    }

    let mut payload = vec![0u8; value_len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}
