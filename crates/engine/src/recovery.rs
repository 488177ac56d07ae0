//! Cold-start discovery: turn a database directory into the in-memory
//! segment list.

use crate::StoreError;
use segment::{ordinal_from_name, Segment, MERGED_SEGMENT, SEGMENT_PREFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Scans `dir` for `segment-<N>` files and opens them oldest first.
///
/// A leftover `segment-merged` staging file (from a merge interrupted by a
/// crash) is deleted before the list is built; its contents are a subset of
/// what the surviving segments already hold. Discovered segments are sorted
/// by numeric ordinal so that list order matches write recency regardless of
/// the order the filesystem yields entries in. An empty directory gets a
/// fresh `segment-0`.
pub(crate) fn discover_segments(dir: &Path) -> Result<Vec<Arc<Segment>>, StoreError> {
    let mut found: Vec<(u64, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(SEGMENT_PREFIX) {
            continue;
        }
        if name == MERGED_SEGMENT {
            warn!("removing stray merge staging file");
            std::fs::remove_file(entry.path())?;
            continue;
        }
        found.push((ordinal_from_name(name)?, entry.path()));
    }

    found.sort_by_key(|(ordinal, _)| *ordinal);

    let mut segments = Vec::with_capacity(found.len().max(1));
    for (_, path) in found {
        segments.push(Arc::new(Segment::open(path)?));
    }

    if segments.is_empty() {
        let path = dir.join(segment::file_name(0));
        segments.push(Arc::new(Segment::open(path)?));
    }

    Ok(segments)
}
