//! Integration tests for result links

use std::fs;

use nixkernel_store::{link_name, replace_symlink};

#[test]
fn links_follow_the_latest_target() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::write(&first, "1").unwrap();
    fs::write(&second, "2").unwrap();

    let link = dir.path().join(link_name("out"));
    replace_symlink(&first, &link).unwrap();
    assert_eq!(fs::read_to_string(&link).unwrap(), "1");
    replace_symlink(&second, &link).unwrap();
    assert_eq!(fs::read_to_string(&link).unwrap(), "2");

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn directories_are_not_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target");
    fs::write(&target, "x").unwrap();
    let link = dir.path().join("result-out");
    fs::create_dir(&link).unwrap();
    fs::write(link.join("keep"), "kept").unwrap();

    assert!(replace_symlink(&target, &link).is_err());
    assert_eq!(fs::read_to_string(link.join("keep")).unwrap(), "kept");
}
