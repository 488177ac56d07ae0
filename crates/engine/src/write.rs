//! Write path: the writer thread, `put()`, and rollover.
//!
//! Every mutation flows through one mpsc channel into one thread, so appends
//! to the tail are totally ordered and the tail's index is always updated by
//! the same thread that wrote the bytes. Callers block until their request
//! has been applied (or failed) and get the result back over a per-request
//! reply channel.

use crate::merge::MergeSignal;
use crate::{Db, Shared, StoreError};
use segment::Segment;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::debug;

pub(crate) enum WriteRequest {
    Put {
        key: String,
        value: String,
        reply: Sender<Result<(), StoreError>>,
    },
    Shutdown,
}

/// Body of the writer thread: applies requests serially until shutdown.
pub(crate) fn write_loop(shared: &Shared, requests: Receiver<WriteRequest>) {
    while let Ok(request) = requests.recv() {
        match request {
            WriteRequest::Put { key, value, reply } => {
                // The caller may have given up (dropped the receiver);
                // nothing to do about it.
                let _ = reply.send(shared.append(&key, &value));
            }
            WriteRequest::Shutdown => return,
        }
    }
}

impl Db {
    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// Blocks until the writer thread has appended the record to the tail
    /// segment and updated its index. On success the write is immediately
    /// visible to `get`; on failure nothing was committed.
    pub fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        self.write_tx
            .send(WriteRequest::Put {
                key: key.to_string(),
                value: value.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Closed)?;

        reply_rx.recv().map_err(|_| StoreError::Closed)?
    }
}

impl Shared {
    /// Appends one record to the tail, then checks the rollover threshold.
    ///
    /// The append itself runs without the list lock held: only the writer
    /// thread ever appends, so cloning the tail `Arc` under a brief shared
    /// lock is enough to keep it alive across the write.
    fn append(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let tail = self
            .segments
            .read()
            .last()
            .cloned()
            .ok_or(StoreError::Closed)?;

        tail.put(key, value)?;

        if tail.len() >= self.max_segment_size {
            self.roll_over(&tail)?;
        }
        Ok(())
    }

    /// Creates `segment-(N+1)` after the tail `segment-N` and appends it to
    /// the list. When the list grows past two segments, nudges the merger
    /// (non-blocking; the write path never waits for compaction).
    fn roll_over(&self, tail: &Arc<Segment>) -> Result<(), StoreError> {
        let next = tail.ordinal()? + 1;
        let seg = Arc::new(Segment::open(self.dir.join(segment::file_name(next)))?);
        debug!(ordinal = next, "rolled over to new tail segment");

        let mut segments = self.segments.write();
        segments.push(seg);
        if segments.len() > 2 && self.auto_merge.load(std::sync::atomic::Ordering::Relaxed) {
            let _ = self.merge_tx.send(MergeSignal::Merge);
        }
        Ok(())
    }
}
