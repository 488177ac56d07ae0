//! Compaction: merge every segment except the tail into a single segment
//! holding exactly one (latest) record per key, then atomically swap it into
//! the head of the list and delete the obsoleted files.
//!
//! The merger runs on its own thread and consumes a signal channel fed by
//! rollover. Signals are best-effort nudges: the thread re-checks the
//! segment count on every wakeup, so spurious signals are harmless, and only
//! one merge can ever be in flight.
//!
//! ## Crash safety
//!
//! The staged output is written under the reserved name `segment-merged` and
//! only becomes visible through a rename performed under the exclusive list
//! lock. A crash before the rename leaves a staging file that the next open
//! deletes. A crash after it can leave obsolete files behind, but never a
//! stale read: leftovers are unlinked oldest first, so any surviving
//! leftover still holds the newest prefix occurrence of every key it
//! contains, and the ordinal sort at the next open scans it before the
//! merged segment. At no point can a previously-committed key read back
//! missing or stale.

use crate::{Shared, StoreError};
use segment::{Segment, MERGED_SEGMENT};
use std::collections::HashSet;
use std::fs;
use std::sync::mpsc::Receiver;
use tracing::{debug, warn};

pub(crate) enum MergeSignal {
    Merge,
    Shutdown,
}

/// Body of the merger thread: one merge per signal, errors logged and
/// dropped (the database stays usable with the un-merged segments).
pub(crate) fn merge_loop(shared: &Shared, signals: Receiver<MergeSignal>) {
    while let Ok(signal) = signals.recv() {
        match signal {
            MergeSignal::Shutdown => return,
            MergeSignal::Merge => {
                if shared.segments.read().len() > 2 {
                    if let Err(err) = shared.merge() {
                        warn!(error = %err, "merge failed");
                    }
                }
            }
        }
    }
}

impl Shared {
    /// Compacts all segments except the tail into one.
    ///
    /// # Steps
    ///
    /// 1. Snapshot the read-only prefix (everything but the tail).
    /// 2. Stage a fresh `segment-merged` file and copy the latest record of
    ///    every key in the prefix into it, walking newest to oldest with a
    ///    seen-set so older occurrences are skipped.
    /// 3. Under the exclusive lock: rename the staging file onto the oldest
    ///    snapshotted path, reopen it there in append mode, and install
    ///    `[merged] + everything from the tail position onward` as the new
    ///    list. Tails that appeared while the merge was running are kept
    ///    verbatim.
    /// 4. After the lock: unlink the remaining obsoleted files.
    ///
    /// Any failure before the swap leaves the database untouched; the
    /// staging file is removed on the way out.
    pub(crate) fn merge(&self) -> Result<(), StoreError> {
        let (sources, snapshot_len) = {
            let segments = self.segments.read();
            if segments.len() < 2 {
                return Ok(());
            }
            let len = segments.len() - 1;
            (segments[..len].to_vec(), len)
        };

        let staging_path = self.dir.join(MERGED_SEGMENT);
        let staging = Segment::create(&staging_path)?;

        let mut seen: HashSet<String> = HashSet::new();
        for source in sources.iter().rev() {
            for key in source.keys() {
                if seen.contains(&key) {
                    continue;
                }
                let copied = source
                    .get(&key)
                    .and_then(|value| staging.put(&key, &value));
                if let Err(err) = copied {
                    drop(staging);
                    let _ = fs::remove_file(&staging_path);
                    return Err(err.into());
                }
                seen.insert(key);
            }
        }

        let target = sources[0].path().to_path_buf();

        // Swap. Everything from the rename to the list update happens under
        // the exclusive lock so readers see the old list or the new one,
        // never a renamed file behind a stale list.
        let mut segments = self.segments.write();
        if let Err(err) = fs::rename(&staging_path, &target) {
            let _ = fs::remove_file(&staging_path);
            return Err(err.into());
        }
        let merged = match staging.reopen_at(&target) {
            Ok(merged) => std::sync::Arc::new(merged),
            Err(err) => {
                // The previous list stays installed.
                let _ = fs::remove_file(&staging_path);
                return Err(err.into());
            }
        };

        let mut rebuilt = Vec::with_capacity(1 + segments.len() - snapshot_len);
        rebuilt.push(merged);
        rebuilt.extend(segments[snapshot_len..].iter().cloned());
        *segments = rebuilt;
        drop(segments);

        // The oldest path was reused by the rename; the rest are garbage
        // now. Dropping the snapshot Arcs closes the old handles.
        for source in &sources[1..] {
            let _ = fs::remove_file(source.path());
        }
        debug!(compacted = sources.len(), "merged read-only segments");
        Ok(())
    }
}
