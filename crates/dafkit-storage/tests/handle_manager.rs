//! Handle table behaviour across both architectures.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use dafkit_storage::{
    AccessMode, ErrorKind, Handle, HandleManager, ManagerConfig, OpenMode, StorageError,
};
use dafkit_formats::Architecture;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tempfile::TempDir;

fn create_dafs(dir: &TempDir, count: usize) -> Vec<PathBuf> {
    let mut manager = HandleManager::default();
    (0..count)
        .map(|i| {
            let path = dir.path().join(format!("file{i}.bsp"));
            let handle = manager
                .daf()
                .open_new(&path, "SPK", 2, 6, &format!("FILE {i}"), 0)
                .expect("create");
            manager.close(handle).expect("close");
            path
        })
        .collect()
}

fn small_pool(max_units: usize) -> HandleManager {
    HandleManager::new(
        ManagerConfig::default()
            .with_max_files(64)
            .with_max_units(max_units)
            .with_sync_on_close(false),
    )
    .expect("manager")
}

#[test]
fn test_reopen_counts_links_and_third_close_fails() {
    let dir = TempDir::new().expect("dir");
    let paths = create_dafs(&dir, 1);
    let mut manager = small_pool(4);

    let first = manager.daf().open_read(&paths[0]).expect("open");
    let second = manager.daf().open_read(&paths[0]).expect("open again");
    assert_eq!(first, second);

    let info = manager.info(first).expect("info");
    assert_eq!(info.links, 2);
    assert_eq!(info.access, AccessMode::Read);
    assert_eq!(info.architecture, Architecture::Daf);

    manager.close(first).expect("first close");
    manager.close(first).expect("second close");
    assert!(matches!(
        manager.close(first),
        Err(StorageError::InvalidHandle(_))
    ));
}

#[test]
fn test_eviction_lets_handles_outnumber_units() {
    let dir = TempDir::new().expect("dir");
    let paths = create_dafs(&dir, 8);
    let mut manager = small_pool(3);

    let handles: Vec<Handle> = paths
        .iter()
        .map(|path| manager.daf().open_read(path).expect("open"))
        .collect();
    assert_eq!(manager.handles().len(), 8);
    assert_eq!(manager.connected_units(), 3);

    // Every handle still answers, reconnecting as needed.
    for (i, handle) in handles.iter().enumerate() {
        let record = manager.daf().file_record(*handle).expect("record");
        assert_eq!(record.internal_name(), format!("FILE {i}"));
        assert!(manager.daf().arrays(*handle).expect("arrays").is_empty());
    }
    assert!(manager.connected_units() <= 3);
}

#[test]
fn test_locked_handles_exhaust_units() {
    let dir = TempDir::new().expect("dir");
    let paths = create_dafs(&dir, 3);
    let mut manager = small_pool(2);

    for path in &paths[..2] {
        let handle = manager.daf().open_read(path).expect("open");
        manager.daf().begin_forward_search(handle).expect("search locks");
    }

    let err = manager.daf().open_read(&paths[2]).expect_err("exhausted");
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    // Ending one search frees a unit for eviction.
    let locked = manager.handles()[0];
    manager.daf().end_search(locked).expect("end search");
    manager.daf().open_read(&paths[2]).expect("open after unlock");
}

#[test]
fn test_mode_conflicts() {
    let dir = TempDir::new().expect("dir");
    let paths = create_dafs(&dir, 1);
    let mut manager = small_pool(4);

    let handle = manager.daf().open_write(&paths[0]).expect("open write");
    assert!(matches!(
        manager.daf().open_read(&paths[0]),
        Err(StorageError::OpenConflict { .. })
    ));
    assert!(matches!(
        manager.open(&paths[0], OpenMode::New, Architecture::Daf),
        Err(StorageError::FileExists(_))
    ));
    assert!(matches!(
        manager.das().open_read(&paths[0]),
        Err(StorageError::WrongArchitecture { .. })
    ));
    manager.close(handle).expect("close");
    assert!(manager.handles().is_empty());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().expect("dir");
    let mut manager = small_pool(4);
    let err = manager
        .daf()
        .open_read(dir.path().join("absent.bsp"))
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_config_file_drives_capacities() {
    let dir = TempDir::new().expect("dir");
    let config_path = dir.path().join("dafkit.json");
    std::fs::write(&config_path, r#"{ "max_files": 2, "max_units": 1 }"#).expect("write");

    let config = ManagerConfig::from_json_file(&config_path).expect("config");
    assert!(config.sync_on_close);
    let mut manager = HandleManager::new(config).expect("manager");

    let paths = create_dafs(&dir, 3);
    manager.daf().open_read(&paths[0]).expect("open");
    manager.daf().open_read(&paths[1]).expect("open");
    let err = manager.daf().open_read(&paths[2]).expect_err("table full");
    assert!(matches!(
        err,
        StorageError::TooManyOpenFiles {
            resource: "files",
            limit: 2
        }
    ));
}
