use record::{Record, Value};
use segment::SEGMENT_PREFIX;
use std::fs;
use std::path::Path;

/// Sorted list of segment filenames present in `dir`.
pub fn segment_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
        .filter(|name| name.starts_with(SEGMENT_PREFIX))
        .collect();
    names.sort();
    names
}

/// Encoded on-disk size of one string record.
pub fn record_len(key: &str, value: &str) -> u64 {
    Record {
        key: key.to_string(),
        value: Value::Str(value.to_string()),
    }
    .encoded_len() as u64
}
