//! # Engine - SiltKV Storage Engine
//!
//! The central orchestrator that ties the record codec and [`segment`]
//! files into a durable, crash-recoverable key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller threads                    Worker threads
//!   |                                 |
//!   | put(k,v) ---> write channel --> writer: append to tail segment,
//!   |                                 |       roll over at size threshold,
//!   |                                 |       signal merge at >2 segments
//!   | get(k) --\                      |
//!   |           \                     merger: compact the read-only prefix
//!   v            v                    v       into one segment, swap it in
//! ┌───────────────────────────────────────────────┐
//! │ RwLock<Vec<Arc<Segment>>>  (oldest -> newest) │
//! │                                               │
//! │  segment-0    segment-1   ...   segment-N     │
//! │  (read-only)  (read-only)       (tail)        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `lib.rs`     | `Db` struct, open/close, accessors, `Debug`, `Drop`  |
//! | [`recovery`] | Directory scan, ordinal sort, stray staging cleanup  |
//! | [`write`]    | Writer thread, `put()`, rollover                     |
//! | [`read`]     | `get()` walking segments newest to oldest            |
//! | [`merge`]    | Merger thread, prefix compaction, atomic list swap   |
//!
//! ## Concurrency
//!
//! All appends funnel through a single writer thread fed by an mpsc channel,
//! so writes are totally ordered without any file-level locking on the tail.
//! The segment list sits behind a readers-writer lock that protects segment
//! *identity* (which files the list names), not file bytes: `get` holds
//! shared mode while it reads, and exclusive mode is taken only for the two
//! structural mutations, rollover and the merge swap. A merge is invisible
//! to readers: they observe the pre-swap list or the post-swap list, never a
//! partial state.

mod merge;
mod read;
mod recovery;
mod write;

use merge::MergeSignal;
use parking_lot::{Mutex, RwLock};
use segment::{Segment, SegmentError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use write::WriteRequest;

/// Default maximum segment size before rollover: 10 MiB.
pub const DEFAULT_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Errors surfaced by database operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is absent from every segment.
    #[error("record does not exist")]
    NotFound,

    /// The database has been closed; no further operations are served.
    #[error("database is closed")]
    Closed,

    /// A segment-level failure (corruption, wrong value type, I/O).
    #[error(transparent)]
    Segment(#[from] SegmentError),

    /// A filesystem error outside any one segment (directory scan, rename,
    /// unlink).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared between callers and the two worker threads.
pub(crate) struct Shared {
    dir: PathBuf,
    max_segment_size: u64,
    /// Oldest first; the last element is the write-active tail.
    segments: RwLock<Vec<Arc<Segment>>>,
    merge_tx: Sender<MergeSignal>,
    auto_merge: AtomicBool,
}

/// A persistent, append-only, log-structured key-value store.
///
/// One `Db` owns one directory of `segment-<N>` files. Opening two databases
/// on the same directory is not supported.
pub struct Db {
    shared: Arc<Shared>,
    write_tx: Sender<WriteRequest>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Db {
    /// Opens the database in `dir` with the default segment size.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        Self::open_sized(dir, DEFAULT_SEGMENT_SIZE)
    }

    /// Opens the database in `dir`, rolling segments over once they reach
    /// `max_segment_size` bytes.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the directory if it does not exist.
    /// 2. Delete a stray `segment-merged` left by an interrupted merge.
    /// 3. Open every `segment-<N>` file, sorted by numeric ordinal, and
    ///    rebuild each one's index.
    /// 4. If no segments exist, create an empty `segment-0`.
    /// 5. Start the writer and merger threads.
    pub fn open_sized<P: AsRef<Path>>(dir: P, max_segment_size: u64) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let segments = recovery::discover_segments(&dir)?;

        let (write_tx, write_rx) = mpsc::channel();
        let (merge_tx, merge_rx) = mpsc::channel();

        let shared = Arc::new(Shared {
            dir,
            max_segment_size,
            segments: RwLock::new(segments),
            merge_tx,
            auto_merge: AtomicBool::new(true),
        });

        let writer = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("siltkv-writer".to_string())
                .spawn(move || write::write_loop(&shared, write_rx))?
        };
        let merger = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("siltkv-merger".to_string())
                .spawn(move || merge::merge_loop(&shared, merge_rx))?
        };

        Ok(Self {
            shared,
            write_tx,
            workers: Mutex::new(vec![writer, merger]),
            closed: AtomicBool::new(false),
        })
    }

    /// Shuts the database down: stops the writer and merger threads, waits
    /// for them, and closes every segment file.
    ///
    /// Idempotent. Operations issued after `close` return
    /// [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // The workers exit on their shutdown message; a send failure means
        // that worker is already gone.
        let _ = self.write_tx.send(WriteRequest::Shutdown);
        let _ = self.shared.merge_tx.send(MergeSignal::Shutdown);

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }

        // Dropping the segments closes their file handles.
        self.shared.segments.write().clear();
        Ok(())
    }

    /// Enables or disables background merging. Rollover stops signaling the
    /// merger while disabled; segments keep accumulating until it is turned
    /// back on.
    pub fn set_auto_merge(&self, enabled: bool) {
        self.shared.auto_merge.store(enabled, Ordering::Relaxed);
    }

    /// Number of segments currently in the list (including the tail).
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.shared.segments.read().len()
    }

    /// The database directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// The rollover threshold in bytes.
    #[must_use]
    pub fn max_segment_size(&self) -> u64 {
        self.shared.max_segment_size
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("dir", &self.shared.dir)
            .field("max_segment_size", &self.shared.max_segment_size)
            .field("segment_count", &self.segment_count())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Best-effort shutdown on drop, so the worker threads never outlive the
/// handle.
impl Drop for Db {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
