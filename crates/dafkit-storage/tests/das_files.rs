//! End-to-end DAS tests through the public API.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use dafkit_storage::{DataKind, ErrorKind, HandleManager, ManagerConfig, StorageError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tempfile::TempDir;

fn manager() -> HandleManager {
    HandleManager::new(ManagerConfig::default().with_sync_on_close(false)).expect("manager")
}

#[test]
fn test_append_read_update_and_reopen() {
    let dir = TempDir::new().expect("dir");
    let path = dir.path().join("table.das");
    let mut manager = manager();
    let handle = manager
        .das()
        .open_new(&path, "EK", "TABLE", 0)
        .expect("create");

    let names = b"EARTH     MOON      MARS      ";
    let times: Vec<f64> = (0..500).map(|i| f64::from(i) * 60.0).collect();
    let ids: Vec<i32> = vec![399, 301, 499];

    let mut das = manager.das();
    das.add_chars(handle, names).expect("chars");
    das.add_doubles(handle, &times).expect("doubles");
    das.add_ints(handle, &ids).expect("ints");
    das.update_ints(handle, 2, &[302]).expect("update");
    das.update_chars(handle, 11, b"LUNA").expect("update");
    assert_eq!(das.last_addresses(handle).expect("last"), [30, 500, 3]);
    manager.close(handle).expect("close");

    let handle = manager.das().open_read(&path).expect("reopen");
    let mut das = manager.das();
    assert_eq!(
        das.read_chars(handle, 1, 30).expect("chars"),
        b"EARTH     LUNA      MARS      ".to_vec()
    );
    assert_eq!(das.read_doubles(handle, 1, 500).expect("doubles"), times);
    assert_eq!(das.read_ints(handle, 1, 3).expect("ints"), vec![399, 302, 499]);

    let summary = das.file_summary(handle).expect("summary");
    assert_eq!(summary.last_word, [30, 116, 3]);
    assert!(summary.last_record.iter().all(|recno| *recno > 2));
}

#[test]
fn test_past_end_access_is_usage_error() {
    let dir = TempDir::new().expect("dir");
    let mut manager = manager();
    let handle = manager
        .das()
        .open_new(dir.path().join("end.das"), "EK", "END", 0)
        .expect("create");
    let mut das = manager.das();
    das.add_doubles(handle, &[1.0, 2.0]).expect("add");

    let err = das.read_doubles(handle, 1, 3).expect_err("past end");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(matches!(
        err,
        StorageError::AddressOutOfRange {
            kind: DataKind::Double,
            limit: 2,
            ..
        }
    ));

    // Updates never extend the address space.
    assert!(das.update_doubles(handle, 2, &[5.0, 6.0]).is_err());
    assert_eq!(das.last_addresses(handle).expect("last"), [0, 2, 0]);
    assert_eq!(das.read_doubles(handle, 1, 2).expect("read"), vec![1.0, 2.0]);
}

#[test]
fn test_comments_and_optimize_keep_data() {
    let dir = TempDir::new().expect("dir");
    let path = dir.path().join("notes.das");
    let mut manager = manager();
    let handle = manager
        .das()
        .open_new(&path, "EK", "NOTES", 0)
        .expect("create");

    let mut expected_ints = Vec::new();
    let mut expected_chars = Vec::new();
    for i in 0..50 {
        let ints: Vec<i32> = (0..40).map(|j| i * 40 + j).collect();
        let chars = vec![b'a' + (i % 26) as u8; 70];
        manager.das().add_ints(handle, &ints).expect("ints");
        manager.das().add_chars(handle, &chars).expect("chars");
        expected_ints.extend(ints);
        expected_chars.extend(chars);
    }

    let lines = ["Segment table", "generated for tests"];
    manager.das().add_comments(handle, &lines).expect("comments");
    assert_eq!(manager.das().comments(handle).expect("comments"), lines);
    manager.das().close_optimized(handle).expect("optimize");

    let handle = manager.das().open_write(&path).expect("reopen");
    let mut das = manager.das();
    assert_eq!(das.comments(handle).expect("comments"), lines);
    assert_eq!(das.read_ints(handle, 1, 2000).expect("ints"), expected_ints);
    assert_eq!(das.read_chars(handle, 1, 3500).expect("chars"), expected_chars);

    das.delete_comments(handle).expect("delete");
    assert!(das.comments(handle).expect("comments").is_empty());
    assert_eq!(das.read_ints(handle, 1999, 2000).expect("ints"), vec![1998, 1999]);
}

#[test]
fn test_daf_comment_api_rejects_das_handles() {
    let dir = TempDir::new().expect("dir");
    let mut manager = manager();
    let handle = manager
        .das()
        .open_new(dir.path().join("kind.das"), "EK", "KIND", 0)
        .expect("create");
    assert!(matches!(
        manager.daf().comments(handle),
        Err(StorageError::WrongArchitecture { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_chunked_appends_match_single_buffer(
        chunks in prop::collection::vec(prop::collection::vec(any::<i32>(), 1..400), 1..8)
    ) {
        let dir = TempDir::new().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut manager = manager();
        let handle = manager
            .das()
            .open_new(dir.path().join("p.das"), "EK", "P", 0)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut das = manager.das();
        let mut all = Vec::new();
        for chunk in &chunks {
            das.add_ints(handle, chunk).map_err(|e| TestCaseError::fail(e.to_string()))?;
            das.add_doubles(handle, &[0.5]).map_err(|e| TestCaseError::fail(e.to_string()))?;
            all.extend_from_slice(chunk);
        }

        let read = das
            .read_ints(handle, 1, all.len() as u64)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(read, all);
    }
}
