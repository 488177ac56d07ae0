//! # Segment - Append-Only Log File
//!
//! One segment is one append-only file of [`record`] entries plus an
//! in-memory **hash index** mapping each key to the byte offset of its most
//! recent record within the file. The newest appearance of a key wins.
//!
//! Segments never cache values: `get` seeks into the file and streams a
//! single record through the codec on every call. The index holds offsets
//! only, so its memory footprint is one map entry per distinct key.
//!
//! ## Naming
//!
//! Active segment files are named `segment-<N>` where `<N>` is the decimal
//! ordinal assigned at creation. The name `segment-merged` is reserved as
//! compaction staging and must never appear among active segments.
//!
//! ## Recovery
//!
//! [`Segment::open`] rebuilds the index by scanning the file record by
//! record: read the leading size field, read exactly that many bytes, decode,
//! index the key at the record's starting offset. A file that ends in the
//! middle of a record (a torn append) fails the scan with
//! [`SegmentError::Corrupt`]; a zero-length file recovers to an empty
//! segment.

use parking_lot::{Mutex, RwLock};
use record::{read_i64_value, read_string_value, Record, RecordError, Value, RECORD_OVERHEAD};
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Filename prefix shared by every segment file.
pub const SEGMENT_PREFIX: &str = "segment-";

/// Reserved staging filename used while a merge is being written out.
pub const MERGED_SEGMENT: &str = "segment-merged";

/// Errors surfaced by segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The key is absent from this segment's index.
    #[error("record does not exist")]
    NotFound,

    /// The file is not a well-formed segment: a record's declared size does
    /// not match the bytes present, or the filename does not carry the
    /// `segment-<N>` shape.
    #[error("segment corrupted")]
    Corrupt,

    /// A codec-level failure (wrong value type, malformed record).
    #[error(transparent)]
    Record(#[from] RecordError),

    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// An append-only segment file and its in-memory key index.
///
/// All methods take `&self`: the write handle sits behind a `Mutex` and the
/// index behind an `RwLock`, so a segment can be shared across the engine's
/// reader, writer, and merger threads through an `Arc`. Appends are expected
/// to come from a single writer at a time; the lock makes that safe, not
/// concurrent.
pub struct Segment {
    path: PathBuf,
    /// Append-mode write handle.
    file: Mutex<File>,
    /// Logical file length in bytes; the offset the next record lands at.
    offset: AtomicU64,
    /// key -> byte offset of the latest record for that key.
    index: RwLock<HashMap<String, u64>>,
}

impl Segment {
    /// Opens (or creates) the segment file at `path` in append mode and
    /// rebuilds the index from its contents.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let segment = Self {
            path,
            file: Mutex::new(file),
            offset: AtomicU64::new(0),
            index: RwLock::new(HashMap::new()),
        };
        segment.recover()?;
        Ok(segment)
    }

    /// Creates an **empty** segment at `path`, truncating any existing file.
    ///
    /// This is the merge-staging constructor: compaction must start from a
    /// clean file even if a previous merge left one behind. Active segments
    /// use [`Segment::open`] instead.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            offset: AtomicU64::new(0),
            index: RwLock::new(HashMap::new()),
        })
    }

    /// Consumes this segment and re-attaches it at `path`, keeping the index
    /// and offset but opening a fresh append-mode handle there.
    ///
    /// Used by merge finalization: the staging file is renamed onto its final
    /// ordinal path, and the offsets in the index stay valid because a rename
    /// does not move bytes within the file.
    pub fn reopen_at<P: AsRef<Path>>(self, path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            offset: self.offset,
            index: self.index,
        })
    }

    /// Rebuilds the index by scanning the file sequentially.
    fn recover(&self) -> Result<(), SegmentError> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut index = self.index.write();
        let mut offset = 0u64;

        while let Some(buf) = read_record_bytes(&mut reader)? {
            let entry = Record::decode(&buf).map_err(|_| SegmentError::Corrupt)?;
            index.insert(entry.key, offset);
            offset += buf.len() as u64;
        }

        self.offset.store(offset, Ordering::Release);
        Ok(())
    }

    /// Appends one string record and indexes it.
    ///
    /// On success the index points at the new record and `len()` has advanced
    /// by the record's encoded size. On a write error nothing in memory is
    /// updated; the failed bytes (if any) stay invisible.
    pub fn put(&self, key: &str, value: &str) -> Result<(), SegmentError> {
        self.append(Record {
            key: key.to_string(),
            value: Value::Str(value.to_string()),
        })
    }

    /// Appends one int64 record and indexes it.
    pub fn put_i64(&self, key: &str, value: i64) -> Result<(), SegmentError> {
        self.append(Record {
            key: key.to_string(),
            value: Value::Int(value),
        })
    }

    fn append(&self, entry: Record) -> Result<(), SegmentError> {
        let bytes = entry.encode();
        let mut file = self.file.lock();
        file.write_all(&bytes)?;
        file.flush()?;

        // Index only after the bytes are fully handed to the file.
        let offset = self.offset.load(Ordering::Acquire);
        self.index.write().insert(entry.key, offset);
        self.offset
            .store(offset + bytes.len() as u64, Ordering::Release);
        Ok(())
    }

    /// Looks up the string value for `key`.
    ///
    /// Opens the file read-only, seeks to the indexed offset, and streams one
    /// record through the codec. [`SegmentError::NotFound`] when the key was
    /// never written to this segment.
    pub fn get(&self, key: &str) -> Result<String, SegmentError> {
        let offset = self.lookup(key)?;
        let mut reader = self.reader_at(offset)?;
        Ok(read_string_value(&mut reader)?)
    }

    /// Looks up the int64 value for `key`.
    pub fn get_i64(&self, key: &str) -> Result<i64, SegmentError> {
        let offset = self.lookup(key)?;
        let mut reader = self.reader_at(offset)?;
        Ok(read_i64_value(&mut reader)?)
    }

    fn lookup(&self, key: &str) -> Result<u64, SegmentError> {
        self.index
            .read()
            .get(key)
            .copied()
            .ok_or(SegmentError::NotFound)
    }

    fn reader_at(&self, offset: u64) -> Result<BufReader<File>, SegmentError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(BufReader::new(file))
    }

    /// Parses the numeric ordinal out of this segment's filename.
    pub fn ordinal(&self) -> Result<u64, SegmentError> {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(SegmentError::Corrupt)?;
        ordinal_from_name(name)
    }

    /// Current logical file length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Returns `true` if no record has ever been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every key present in the index.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.index.read().keys().cloned().collect()
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("offset", &self.len())
            .field("keys", &self.index.read().len())
            .finish()
    }
}

/// Parses the ordinal from a `segment-<N>` filename.
///
/// [`SegmentError::Corrupt`] when the prefix is missing or the suffix is not
/// a decimal number (which also covers the reserved `segment-merged` name).
pub fn ordinal_from_name(name: &str) -> Result<u64, SegmentError> {
    let digits = name
        .strip_prefix(SEGMENT_PREFIX)
        .ok_or(SegmentError::Corrupt)?;
    digits.parse::<u64>().map_err(|_| SegmentError::Corrupt)
}

/// Builds the `segment-<N>` filename for an ordinal.
#[must_use]
pub fn file_name(ordinal: u64) -> String {
    format!("{}{}", SEGMENT_PREFIX, ordinal)
}

/// Reads the next complete record from `reader`, returning its raw bytes
/// (size field included), or `None` at a clean end-of-file.
///
/// EOF is only clean at a record boundary: a partial size header or a body
/// shorter than the declared size is a torn append and fails with
/// [`SegmentError::Corrupt`].
fn read_record_bytes<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, SegmentError> {
    let mut size_buf = [0u8; 4];

    // First byte decides between clean EOF and a torn header.
    if reader.read(&mut size_buf[..1])? == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut size_buf[1..])
        .map_err(corrupt_on_eof)?;

    let size = u32::from_le_bytes(size_buf) as usize;
    if size < RECORD_OVERHEAD {
        return Err(SegmentError::Corrupt);
    }

    let mut buf = vec![0u8; size];
    buf[..4].copy_from_slice(&size_buf);
    reader.read_exact(&mut buf[4..]).map_err(corrupt_on_eof)?;
    Ok(Some(buf))
}

fn corrupt_on_eof(e: io::Error) -> SegmentError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SegmentError::Corrupt
    } else {
        SegmentError::Io(e)
    }
}
