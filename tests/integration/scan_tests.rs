use blake2::{Blake2b512, Digest as _};
use relink::scanner::{digest_to_hex, Hasher, Walker};
use std::collections::BTreeSet;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_walker_counts_only_regular_files() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::create_dir_all(root.join("empty1")).unwrap();
    fs::create_dir_all(root.join("empty2/deeper")).unwrap();
    fs::write(root.join("top.txt"), b"1").unwrap();
    fs::write(root.join("a/one.txt"), b"22").unwrap();
    fs::write(root.join("a/b/two.txt"), b"333").unwrap();
    fs::write(root.join("a/b/c/three.txt"), b"4444").unwrap();
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(root.join("top.txt"), root.join("link1")).unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("a/b/dirlink")).unwrap();
    }

    let keys: BTreeSet<String> = Walker::new(root)
        .walk()
        .map(|r| r.unwrap().relative_path)
        .collect();

    let expected: BTreeSet<String> = ["top.txt", "a/one.txt", "a/b/two.txt", "a/b/c/three.txt"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(keys, expected);
    assert_eq!(Walker::new(root).tally().unwrap(), (4, 10));
}

#[test]
fn test_walk_is_restartable() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();
    fs::write(dir.path().join("b"), b"b").unwrap();
    let walker = Walker::new(dir.path());

    assert_eq!(walker.walk().count(), 2);
    assert_eq!(walker.walk().count(), 2);
}

#[test]
fn test_hello_world_reference_digest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hello.txt");
    fs::write(&path, b"Hello, World!").unwrap();

    let expected = Blake2b512::digest(b"Hello, World!");

    for size in [1, 3, 4096, 65536] {
        let digest = Hasher::new(size).hash_file(&path).unwrap();
        assert_eq!(digest.as_slice(), expected.as_slice());
    }
}

#[test]
fn test_digest_hex_is_128_chars() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x");
    fs::write(&path, b"x").unwrap();

    let hex = digest_to_hex(&Hasher::default().hash_file(&path).unwrap());

    assert_eq!(hex.len(), 128);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}
