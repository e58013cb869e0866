use relink::actions::{atomic_link, safe_temp_path, same_inode, LinkStep};
use std::fs::{self, File};
use std::io::Write;
use tempfile::tempdir;

#[test]
fn test_link_into_nested_directory() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("a/b/source.bin");
    let target = dir.path().join("x/y/z/target.bin");
    fs::create_dir_all(source.parent().unwrap()).unwrap();
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    File::create(&source)
        .unwrap()
        .write_all(b"identical content")
        .unwrap();
    File::create(&target)
        .unwrap()
        .write_all(b"identical content")
        .unwrap();

    atomic_link(&source, &target).unwrap();

    assert_eq!(fs::read(&target).unwrap(), b"identical content");
    if cfg!(unix) {
        assert!(same_inode(&source, &target));
    }
}

#[test]
#[cfg(unix)]
fn test_linked_files_share_writes() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.txt");
    let target = dir.path().join("target.txt");
    fs::write(&source, b"v1").unwrap();
    fs::write(&target, b"v1").unwrap();

    atomic_link(&source, &target).unwrap();
    fs::write(&source, b"v2").unwrap();

    assert_eq!(fs::read(&target).unwrap(), b"v2");
}

#[test]
fn test_no_temp_names_left_behind() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.txt");
    fs::write(&source, b"content").unwrap();
    for i in 0..10 {
        let target = dir.path().join(format!("t{i}.txt"));
        fs::write(&target, b"content").unwrap();
        atomic_link(&source, &target).unwrap();
    }

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 11);
    assert!(names.iter().all(|n| !n.starts_with(".relink-")));
}

#[test]
fn test_failed_link_reports_step_and_paths() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let target = dir.path().join("target.txt");
    fs::write(&target, b"keep").unwrap();

    let err = atomic_link(&missing, &target).unwrap_err();

    assert_eq!(err.step, LinkStep::HardLink);
    assert_eq!(err.source_path, missing);
    assert_eq!(err.target_path, target);
    let msg = err.to_string();
    assert!(msg.contains("create hardlink"));
    assert!(msg.contains("missing.txt"));
    assert_eq!(fs::read(&target).unwrap(), b"keep");
}

#[test]
fn test_safe_temp_path_is_in_requested_directory() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();

    let path = safe_temp_path(&sub, ".relink-target.txt").unwrap();

    assert_eq!(path.parent().unwrap(), sub);
    assert!(!path.exists());
    assert_eq!(fs::read_dir(&sub).unwrap().count(), 0);
}

#[test]
#[cfg(unix)]
fn test_same_inode_detects_existing_hardlink() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let c = dir.path().join("c");
    fs::write(&a, b"x").unwrap();
    fs::hard_link(&a, &b).unwrap();
    fs::write(&c, b"x").unwrap();

    assert!(same_inode(&a, &b));
    assert!(!same_inode(&a, &c));
}
