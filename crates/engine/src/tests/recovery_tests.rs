use super::helpers::segment_files;
use crate::*;
use anyhow::Result;
use segment::{Segment, SegmentError};
use std::fs;
use tempfile::tempdir;

#[test]
fn open_on_empty_dir_creates_segment_zero() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(dir.path())?;

    assert_eq!(db.segment_count(), 1);
    assert_eq!(segment_files(dir.path()), ["segment-0"]);
    Ok(())
}

#[test]
fn open_creates_missing_directory() -> Result<()> {
    let dir = tempdir()?;
    let nested = dir.path().join("data").join("db");
    let db = Db::open(&nested)?;

    db.put("k", "v")?;
    assert_eq!(db.get("k")?, "v");
    Ok(())
}

#[test]
fn data_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let pairs = [
        ("key1", "value1"),
        ("key2", "value2"),
        ("key3", "value3"),
    ];

    {
        let db = Db::open_sized(dir.path(), 128)?;
        for (key, value) in pairs {
            db.put(key, value)?;
        }
        db.close()?;
    }

    let db = Db::open_sized(dir.path(), 128)?;
    for (key, value) in pairs {
        assert_eq!(db.get(key)?, value);
    }
    Ok(())
}

#[test]
fn data_survives_drop_without_close() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = Db::open(dir.path())?;
        db.put("k", "v")?;
        // Dropped here without an explicit close.
    }

    let db = Db::open(dir.path())?;
    assert_eq!(db.get("k")?, "v");
    Ok(())
}

#[test]
fn discovery_orders_segments_numerically() -> Result<()> {
    let dir = tempdir()?;

    // segment-10 is newer than segment-2 even though it sorts earlier
    // lexically; a correctly ordered scan must prefer its value.
    {
        let old = Segment::open(dir.path().join("segment-2"))?;
        old.put("k", "stale")?;
        let new = Segment::open(dir.path().join("segment-10"))?;
        new.put("k", "fresh")?;
    }

    let db = Db::open(dir.path())?;
    assert_eq!(db.get("k")?, "fresh");
    Ok(())
}

#[test]
fn stray_staging_file_is_deleted_on_open() -> Result<()> {
    let dir = tempdir()?;
    let stray = dir.path().join("segment-merged");
    fs::write(&stray, b"half-written merge output")?;

    let db = Db::open(dir.path())?;
    assert!(!stray.exists());
    db.put("k", "v")?;
    assert_eq!(db.get("k")?, "v");
    Ok(())
}

#[test]
fn torn_trailing_record_aborts_open() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = Db::open(dir.path())?;
        db.put("k", "v")?;
        db.close()?;
    }

    // Simulate a crash mid-append on the tail segment.
    let path = dir.path().join("segment-0");
    let mut bytes = fs::read(&path)?;
    bytes.extend_from_slice(&200u32.to_le_bytes());
    bytes.extend_from_slice(b"torn");
    fs::write(&path, &bytes)?;

    assert!(matches!(
        Db::open(dir.path()),
        Err(StoreError::Segment(SegmentError::Corrupt))
    ));
    Ok(())
}

#[test]
fn non_numeric_segment_name_aborts_open() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("segment-abc"), b"")?;

    assert!(matches!(
        Db::open(dir.path()),
        Err(StoreError::Segment(SegmentError::Corrupt))
    ));
    Ok(())
}

#[test]
fn unrelated_files_are_ignored() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("LOCK"), b"")?;
    fs::write(dir.path().join("notes.txt"), b"not a segment")?;

    let db = Db::open(dir.path())?;
    assert_eq!(db.segment_count(), 1);
    Ok(())
}
