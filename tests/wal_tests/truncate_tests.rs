//! Tests for WAL truncation
//!
//! These tests verify:
//! - truncate_after keeps exactly the records before the cut
//! - truncate_before keeps exactly the records at or after the cut,
//!   with their positions unchanged
//! - Both survive close/reopen
//! - Appends continue correctly after truncation
//! - Out-of-range positions are rejected and temp files cleaned up

use std::fs;
use std::path::{Path, PathBuf};

use atlaswal::wal::{encoded_len, HEADER_SIZE};
use atlaswal::{Wal, WalError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn write_records(wal: &Wal, count: usize) -> Vec<(u64, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let data = format!("record{}", i).into_bytes();
            (wal.write(&data).unwrap().unwrap(), data)
        })
        .collect()
}

fn read_all(wal: &Wal) -> Vec<(u64, Vec<u8>)> {
    wal.new_reader(0)
        .unwrap()
        .map(|r| {
            let r = r.unwrap();
            (r.position, r.data.to_vec())
        })
        .collect()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", path.display(), suffix))
}

// =============================================================================
// truncate_after Tests
// =============================================================================

#[test]
fn test_truncate_after_keeps_prefix() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 10);

    wal.truncate_after(records[8].0).unwrap();

    assert_eq!(read_all(&wal), records[..8].to_vec());
}

#[test]
fn test_truncate_after_writes_sync_marker() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 3);

    wal.truncate_after(records[1].0).unwrap();

    assert_eq!(wal.position(), records[1].0 + HEADER_SIZE as u64);
    assert_eq!(
        fs::metadata(&wal_path).unwrap().len(),
        records[1].0 + HEADER_SIZE as u64
    );
}

#[test]
fn test_truncate_after_survives_reopen() {
    let (_temp, wal_path) = setup_temp_wal();
    let records = {
        let wal = Wal::open(&wal_path, 0o664).unwrap();
        let records = write_records(&wal, 5);
        wal.truncate_after(records[3].0).unwrap();
        wal.close().unwrap();
        records
    };

    let wal = Wal::open(&wal_path, 0o664).unwrap();

    assert!(!wal.recovery_report().was_truncated);
    assert_eq!(read_all(&wal), records[..3].to_vec());
}

#[test]
fn test_truncate_after_zero_empties_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    write_records(&wal, 4);

    wal.truncate_after(0).unwrap();

    assert!(read_all(&wal).is_empty());
    assert_eq!(wal.position(), HEADER_SIZE as u64);
}

#[test]
fn test_write_after_truncate_after() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 4);

    wal.truncate_after(records[2].0).unwrap();
    let pos = wal.write(b"replacement").unwrap().unwrap();

    assert_eq!(pos, records[2].0 + HEADER_SIZE as u64);
    let mut expected = records[..2].to_vec();
    expected.push((pos, b"replacement".to_vec()));
    assert_eq!(read_all(&wal), expected);
}

#[test]
fn test_truncate_after_past_end_is_rejected() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    write_records(&wal, 2);
    let end = wal.position();

    let result = wal.truncate_after(end + 1);

    assert!(matches!(result, Err(WalError::InvalidPosition { .. })));
    assert_eq!(wal.position(), end);
    assert_eq!(read_all(&wal).len(), 2);
}

// =============================================================================
// truncate_before Tests
// =============================================================================

#[test]
fn test_truncate_before_keeps_suffix_with_positions() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 10);
    let end = wal.position();

    wal.truncate_before(records[3].0).unwrap();

    assert_eq!(wal.base(), records[3].0);
    assert_eq!(wal.position(), end);
    assert_eq!(read_all(&wal), records[3..].to_vec());
}

#[test]
fn test_truncate_before_shrinks_file() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 6);
    let end = wal.position();

    wal.truncate_before(records[4].0).unwrap();

    assert_eq!(fs::metadata(&wal_path).unwrap().len(), end - records[4].0);
}

#[test]
fn test_truncate_before_survives_reopen() {
    let (_temp, wal_path) = setup_temp_wal();
    let records = {
        let wal = Wal::open(&wal_path, 0o664).unwrap();
        let records = write_records(&wal, 6);
        wal.truncate_before(records[2].0).unwrap();
        wal.close().unwrap();
        records
    };

    let wal = Wal::open(&wal_path, 0o664).unwrap();

    assert_eq!(wal.base(), records[2].0);
    assert_eq!(read_all(&wal), records[2..].to_vec());
}

#[test]
fn test_write_after_truncate_before_continues_positions() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 3);
    let end = wal.position();

    wal.truncate_before(records[1].0).unwrap();
    let pos = wal.write(b"next").unwrap().unwrap();

    assert_eq!(pos, end);
    let mut expected = records[1..].to_vec();
    expected.push((pos, b"next".to_vec()));
    assert_eq!(read_all(&wal), expected);
}

#[test]
fn test_reader_below_base_starts_at_base() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 4);

    wal.truncate_before(records[2].0).unwrap();

    let reader = wal.new_reader(records[0].0).unwrap();
    assert_eq!(reader.position(), records[2].0);
    assert_eq!(reader.count(), 2);
}

#[test]
fn test_truncate_before_base_is_noop() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 3);

    wal.truncate_before(0).unwrap();

    assert_eq!(wal.base(), 0);
    assert_eq!(read_all(&wal), records);
}

#[test]
fn test_truncate_before_below_base_is_rejected() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 3);
    wal.truncate_before(records[1].0).unwrap();

    let result = wal.truncate_before(records[0].0);

    assert!(matches!(result, Err(WalError::InvalidPosition { .. })));
}

#[test]
fn test_truncate_before_end_leaves_empty_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    write_records(&wal, 3);
    let end = wal.position();

    wal.truncate_before(end).unwrap();

    assert!(read_all(&wal).is_empty());
    assert_eq!(wal.base(), end);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    let pos = wal.write(b"fresh").unwrap().unwrap();
    assert_eq!(pos, end);
}

// =============================================================================
// Record Boundary Tests
// =============================================================================

#[test]
fn test_truncate_after_mid_record_is_rejected() {
    let (_temp, wal_path) = setup_temp_wal();
    let written = {
        let wal = Wal::open(&wal_path, 0o664).unwrap();
        let mut written = write_records(&wal, 3);

        let result = wal.truncate_after(written[1].0 + 3);
        assert!(matches!(result, Err(WalError::InvalidPosition { .. })));
        assert_eq!(read_all(&wal), written);

        let pos = wal.write(b"d").unwrap().unwrap();
        written.push((pos, b"d".to_vec()));
        wal.close().unwrap();
        written
    };

    let wal = Wal::open(&wal_path, 0o664).unwrap();
    assert_eq!(read_all(&wal), written);
}

#[test]
fn test_truncate_before_mid_record_is_rejected() {
    let (_temp, wal_path) = setup_temp_wal();
    let written = {
        let wal = Wal::open(&wal_path, 0o664).unwrap();
        let written = write_records(&wal, 3);

        let result = wal.truncate_before(written[1].0 + 1);
        assert!(matches!(result, Err(WalError::InvalidPosition { .. })));
        assert_eq!(wal.base(), 0);
        wal.close().unwrap();
        written
    };

    let wal = Wal::open(&wal_path, 0o664).unwrap();
    assert!(!wal.recovery_report().was_truncated);
    assert_eq!(read_all(&wal), written);
}

#[test]
fn test_mid_record_rejected_after_base_moves() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 5);
    wal.truncate_before(records[2].0).unwrap();

    assert!(matches!(
        wal.truncate_after(records[3].0 + 1),
        Err(WalError::InvalidPosition { .. })
    ));
    assert!(matches!(
        wal.truncate_before(records[4].0 - 1),
        Err(WalError::InvalidPosition { .. })
    ));
    assert_eq!(read_all(&wal), records[2..].to_vec());
}

#[test]
fn test_truncate_at_sync_marker_is_accepted() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 4);

    // Each single write ends with its own marker right before the next record
    let marker_before_second = records[1].0 - HEADER_SIZE as u64;
    let marker_before_fourth = records[3].0 - HEADER_SIZE as u64;

    wal.truncate_after(marker_before_fourth).unwrap();
    wal.truncate_before(marker_before_second).unwrap();

    assert_eq!(wal.base(), marker_before_second);
    assert_eq!(read_all(&wal), records[1..3].to_vec());
}

// =============================================================================
// Combined Tests
// =============================================================================

#[test]
fn test_truncate_both_ends() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 10);

    wal.truncate_after(records[8].0).unwrap();
    wal.truncate_before(records[3].0).unwrap();

    assert_eq!(read_all(&wal), records[3..8].to_vec());

    // truncate_after works with logical positions once a base is set
    wal.truncate_after(records[5].0).unwrap();
    assert_eq!(read_all(&wal), records[3..5].to_vec());
    assert_eq!(
        fs::metadata(&wal_path).unwrap().len(),
        records[5].0 - records[3].0 + HEADER_SIZE as u64
    );
}

#[test]
fn test_truncation_leaves_no_temp_files() {
    let (temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 5);

    wal.truncate_after(records[4].0).unwrap();
    wal.truncate_before(records[1].0).unwrap();

    assert!(!sibling(&wal_path, "back").exists());
    assert!(!sibling(&wal_path, "temp").exists());

    let mut names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["test.wal".to_string(), "test.wal.meta".to_string()]);
}

#[test]
fn test_record_sizes_line_up_with_positions() {
    let (_temp, wal_path) = setup_temp_wal();
    let wal = Wal::open(&wal_path, 0o664).unwrap();
    let records = write_records(&wal, 3);

    // Each single write is its own batch: record followed by a marker
    for pair in records.windows(2) {
        let (pos, data) = &pair[0];
        assert_eq!(pair[1].0, pos + encoded_len(data.len()) + HEADER_SIZE as u64);
    }
}
