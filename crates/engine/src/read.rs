//! Read path: `get()` walks the segment list newest to oldest and returns
//! the first hit. The shared lock is held for the whole call, so one `get`
//! observes one consistent snapshot of the list even while the merger swaps
//! segments underneath other callers.

use crate::{Db, StoreError};
use segment::SegmentError;

impl Db {
    /// Looks up the latest value written for `key`.
    ///
    /// [`StoreError::NotFound`] when no segment has ever indexed the key.
    /// A segment that does not know the key just passes the walk on to the
    /// next-older one; any other segment failure aborts the lookup.
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let segments = self.shared.segments.read();
        for segment in segments.iter().rev() {
            match segment.get(key) {
                Ok(value) => return Ok(value),
                Err(SegmentError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::NotFound)
    }
}
