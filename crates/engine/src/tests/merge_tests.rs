use super::helpers::segment_files;
use crate::*;
use anyhow::Result;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Writes two rounds of three 24/25-byte records under a 64-byte threshold,
/// leaving exactly three segments: two full read-only ones and an empty tail.
fn build_three_segments(db: &Db) -> Result<()> {
    for (key, value) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
        db.put(key, value)?;
    }
    for (key, value) in [("key1", "value1x"), ("key2", "value2x"), ("key3", "value3x")] {
        db.put(key, value)?;
    }
    assert_eq!(db.segment_count(), 3);
    Ok(())
}

#[test]
fn merge_compacts_prefix_into_oldest_path() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open_sized(dir.path(), 64)?;
    db.set_auto_merge(false);

    build_three_segments(&db)?;
    assert_eq!(
        segment_files(dir.path()),
        ["segment-0", "segment-1", "segment-2"]
    );

    db.shared.merge()?;

    // The merged output reuses the oldest ordinal; the middle segment is
    // gone; the tail is untouched.
    assert_eq!(segment_files(dir.path()), ["segment-0", "segment-2"]);
    assert_eq!(db.segment_count(), 2);

    for (key, value) in [("key1", "value1x"), ("key2", "value2x"), ("key3", "value3x")] {
        assert_eq!(db.get(key)?, value);
    }
    Ok(())
}

#[test]
fn merge_keeps_latest_value_per_key() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open_sized(dir.path(), 64)?;
    db.set_auto_merge(false);

    build_three_segments(&db)?;
    db.shared.merge()?;

    // One record per key in the merged segment: three 25-byte records.
    let merged = std::fs::metadata(dir.path().join("segment-0"))?.len();
    assert_eq!(merged, 3 * 25);
    Ok(())
}

#[test]
fn writes_keep_working_after_merge() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open_sized(dir.path(), 64)?;
    db.set_auto_merge(false);

    build_three_segments(&db)?;
    db.shared.merge()?;

    db.put("key1", "after-merge")?;
    assert_eq!(db.get("key1")?, "after-merge");
    assert_eq!(db.get("key2")?, "value2x");
    Ok(())
}

#[test]
fn merged_data_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = Db::open_sized(dir.path(), 64)?;
        db.set_auto_merge(false);
        build_three_segments(&db)?;
        db.shared.merge()?;
        db.close()?;
    }

    let db = Db::open_sized(dir.path(), 64)?;
    for (key, value) in [("key1", "value1x"), ("key2", "value2x"), ("key3", "value3x")] {
        assert_eq!(db.get(key)?, value);
    }
    Ok(())
}

#[test]
fn merge_with_single_segment_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open_sized(dir.path(), 64)?;
    db.set_auto_merge(false);

    db.put("k", "v")?;
    db.shared.merge()?;

    assert_eq!(db.segment_count(), 1);
    assert_eq!(db.get("k")?, "v");
    Ok(())
}

#[test]
fn background_merge_compacts_automatically() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open_sized(dir.path(), 64)?;

    // Enough distinct keys to roll through several segments and trip the
    // merge signal at least once.
    for i in 0..12 {
        db.put(&format!("key{}", i), "value-")?;
    }

    // The merger runs asynchronously; give it a moment.
    let deadline = Instant::now() + Duration::from_secs(5);
    while db.segment_count() > 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(db.segment_count() <= 2, "merge never caught up");

    for i in 0..12 {
        assert_eq!(db.get(&format!("key{}", i))?, "value-");
    }
    Ok(())
}
