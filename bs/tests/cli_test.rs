//! CLI tests for the anchorstore binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use anchorstore::AnchorStore;

fn store_cmd(db: &std::path::Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("anchorstore").unwrap();
    cmd.arg("--path").arg(db);
    cmd.args(args);
    cmd
}

#[test]
fn test_list_empty_store() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("anchors.db");

    store_cmd(&db, &["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached anchors"));
}

#[test]
fn test_list_shows_saved_anchor() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("anchors.db");

    let store = AnchorStore::open(&db).unwrap();
    store.save("anchor-1", &vec![1u8; 2048]).unwrap();
    drop(store);

    store_cmd(&db, &["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("anchor-1"));

    store_cmd(&db, &["list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"size\": 2048"));
}

#[test]
fn test_show_missing_anchor_fails() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("anchors.db");

    store_cmd(&db, &["show", "nope"]).assert().failure();
}

#[test]
fn test_clear_reports_count() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("anchors.db");

    let store = AnchorStore::open(&db).unwrap();
    store.save("a", b"1").unwrap();
    store.save("b", b"2").unwrap();
    drop(store);

    store_cmd(&db, &["clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 cached anchor(s)"));

    let store = AnchorStore::open(&db).unwrap();
    assert!(store.is_empty().unwrap());
}
