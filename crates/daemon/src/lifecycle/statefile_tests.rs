// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::os::unix::fs::PermissionsExt;

use super::*;

#[test]
fn write_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prox.state");

    let state = new_state("127.0.0.1", 4777, PathBuf::from("/work/prox.toml"));
    write_state(&state, &path).unwrap();

    let loaded = load_state(&path).unwrap().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.pid, std::process::id());
    assert_eq!(loaded.api_url(), "http://127.0.0.1:4777");
    assert!(!path.with_extension("state.tmp").exists());
}

#[test]
fn state_file_is_0600() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prox.state");

    write_state(&new_state("127.0.0.1", 4777, PathBuf::from("/w/p.toml")), &path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn load_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_state(&dir.path().join("prox.state")).unwrap().is_none());
}

#[test]
fn load_corrupt_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prox.state");
    std::fs::write(&path, "not json").unwrap();

    assert!(matches!(load_state(&path), Err(LifecycleError::StateParse(..))));
}

#[test]
fn remove_tolerates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prox.state");

    write_state(&new_state("h", 1, PathBuf::new()), &path).unwrap();
    remove_state(&path);
    assert!(!path.exists());
    remove_state(&path);
}
