use blake2::{Blake2b512, Digest as _};
use relink::cache::{CacheKind, ContentCache, MemoryCache, SqliteCache};
use relink::config::Config;
use relink::{run, Engine, RelinkError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    fs::create_dir(&source).unwrap();
    fs::create_dir(&target).unwrap();
    (dir, source, target)
}

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn config(source: &Path, target: &Path) -> Config {
    Config {
        source: source.to_path_buf(),
        target: target.to_path_buf(),
        ..Default::default()
    }
}

#[cfg(unix)]
fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).unwrap().ino()
}

#[cfg(unix)]
fn link_count(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).unwrap().nlink()
}

#[test]
#[cfg(unix)]
fn test_identical_file_is_linked_and_different_file_kept() {
    let (_dir, source, target) = setup();
    write(&source.join("a.txt"), b"testing");
    write(&target.join("a.txt"), b"testing");
    write(&target.join("b.txt"), b"different");
    let b_inode = inode(&target.join("b.txt"));

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(inode(&source.join("a.txt")), inode(&target.join("a.txt")));
    assert_eq!(link_count(&source.join("a.txt")), 2);
    assert_eq!(inode(&target.join("b.txt")), b_inode);
    assert_eq!(fs::read(target.join("b.txt")).unwrap(), b"different");
    assert_eq!(summary.linked, 1);
    assert_eq!(summary.unmatched, 1);
}

#[test]
#[cfg(unix)]
fn test_match_is_by_content_not_location() {
    let (_dir, source, target) = setup();
    write(&source.join("photos/2019/beach.jpg"), b"jpeg bytes");
    write(&target.join("backup/old_beach_copy.jpg"), b"jpeg bytes");

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(summary.linked, 1);
    assert_eq!(
        inode(&source.join("photos/2019/beach.jpg")),
        inode(&target.join("backup/old_beach_copy.jpg"))
    );
}

#[test]
#[cfg(unix)]
fn test_nested_trees() {
    let (_dir, source, target) = setup();
    for i in 0..20 {
        let content = format!("file number {i}");
        write(
            &source.join(format!("d{}/sub{}/f{}.txt", i % 3, i % 2, i)),
            content.as_bytes(),
        );
        if i % 2 == 0 {
            write(&target.join(format!("t{i}.txt")), content.as_bytes());
        }
    }

    let summary = run(&Config {
        hash_jobs: 3,
        buffer_size: 7,
        ..config(&source, &target)
    })
    .unwrap();

    assert_eq!(summary.source_files, 20);
    assert_eq!(summary.source_hashed, 20);
    assert_eq!(summary.target_files, 10);
    assert_eq!(summary.linked, 10);
    for i in (0..20).step_by(2) {
        assert_eq!(
            inode(&source.join(format!("d{}/sub{}/f{}.txt", i % 3, i % 2, i))),
            inode(&target.join(format!("t{i}.txt")))
        );
    }
}

#[test]
#[cfg(unix)]
fn test_differing_content_is_left_alone() {
    let (_dir, source, target) = setup();
    write(&source.join("a.txt"), b"one");
    write(&target.join("a.txt"), b"two");
    let before = inode(&target.join("a.txt"));

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(summary.linked, 0);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(inode(&target.join("a.txt")), before);
    assert_ne!(inode(&source.join("a.txt")), before);
}

#[test]
#[cfg(unix)]
fn test_symlink_in_target_is_not_replaced() {
    let (dir, source, target) = setup();
    write(&source.join("a.txt"), b"testing");
    let elsewhere = dir.path().join("elsewhere.txt");
    write(&elsewhere, b"testing");
    let link = target.join("link.txt");
    std::os::unix::fs::symlink(&elsewhere, &link).unwrap();

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(summary.target_files, 0);
    assert_eq!(summary.linked, 0);
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), elsewhere);
}

#[test]
#[cfg(unix)]
fn test_symlink_in_source_is_not_indexed() {
    let (dir, source, target) = setup();
    let outside = dir.path().join("outside.txt");
    write(&outside, b"testing");
    std::os::unix::fs::symlink(&outside, source.join("link.txt")).unwrap();
    write(&target.join("a.txt"), b"testing");
    let cache: Arc<dyn ContentCache> = Arc::new(MemoryCache::new());

    let summary = Engine::new(config(&source, &target))
        .with_cache(Arc::clone(&cache))
        .run()
        .unwrap();

    assert_eq!(summary.source_files, 0);
    assert!(!cache.exists("link.txt").unwrap());
    assert_eq!(summary.linked, 0);
}

#[test]
fn test_empty_trees() {
    let (_dir, source, target) = setup();

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(summary, relink::RunSummary::default());
}

#[test]
fn test_empty_source_links_nothing() {
    let (_dir, source, target) = setup();
    write(&target.join("a.txt"), b"testing");

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(summary.target_files, 1);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(summary.linked, 0);
}

#[test]
fn test_missing_target_root_is_empty() {
    let (dir, source, _) = setup();
    write(&source.join("a.txt"), b"testing");

    let summary = run(&config(&source, &dir.path().join("nope"))).unwrap();

    assert_eq!(summary.source_files, 1);
    assert_eq!(summary.target_files, 0);
}

#[test]
fn test_empty_files_match_each_other() {
    let (_dir, source, target) = setup();
    write(&source.join("empty"), b"");
    write(&target.join("also_empty"), b"");

    let summary = run(&config(&source, &target)).unwrap();

    assert_eq!(summary.linked, 1);
    assert_eq!(summary.linked_bytes, 0);
}

#[test]
fn test_sqlite_reindex_is_idempotent() {
    let (dir, source, target) = setup();
    write(&source.join("a.txt"), b"alpha");
    write(&source.join("sub/b.txt"), b"beta");
    write(&target.join("a.txt"), b"alpha");
    let db = dir.path().join("cache.db");
    let config = Config {
        cache_type: CacheKind::Sqlite,
        cache_path: db.to_string_lossy().into_owned(),
        ..config(&source, &target)
    };

    let stored = || {
        let cache = SqliteCache::open(&db.to_string_lossy()).unwrap();
        let entries = (
            cache.len().unwrap(),
            cache.get("a.txt").unwrap(),
            cache.get("sub/b.txt").unwrap(),
        );
        cache.close().unwrap();
        entries
    };

    let first = run(&config).unwrap();
    let after_first = stored();
    let second = run(&config).unwrap();
    let after_second = stored();

    assert_eq!(first.source_hashed, 2);
    assert_eq!(second.source_hashed, 0);
    assert_eq!(second.source_skipped, 2);

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.0, 2);
    assert_eq!(
        after_second.1.map(|d| d.to_vec()),
        Some(Blake2b512::digest(b"alpha").to_vec())
    );
    assert_eq!(
        after_second.2.map(|d| d.to_vec()),
        Some(Blake2b512::digest(b"beta").to_vec())
    );
}

#[test]
#[cfg(unix)]
fn test_second_run_does_not_relink() {
    let (_dir, source, target) = setup();
    write(&source.join("a.txt"), b"testing");
    write(&target.join("a.txt"), b"testing");

    run(&config(&source, &target)).unwrap();
    let second = run(&config(&source, &target)).unwrap();

    assert_eq!(second.linked, 0);
    assert_eq!(second.already_linked, 1);
    assert_eq!(link_count(&source.join("a.txt")), 2);
}

#[test]
fn test_preset_shutdown_interrupts() {
    let (_dir, source, target) = setup();
    write(&source.join("a.txt"), b"testing");
    write(&target.join("a.txt"), b"testing");

    let result = Engine::new(config(&source, &target))
        .with_shutdown_flag(Arc::new(AtomicBool::new(true)))
        .run();

    assert!(matches!(result, Err(RelinkError::Interrupted)));
    assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"testing");
}

#[test]
fn test_missing_source_root_indexes_nothing() {
    let (dir, _, target) = setup();
    write(&target.join("a.txt"), b"testing");

    let summary = run(&config(&dir.path().join("gone"), &target)).unwrap();

    assert_eq!(summary.source_files, 0);
    assert_eq!(summary.unmatched, 1);
}

#[test]
#[cfg(unix)]
fn test_unreadable_source_file_aborts_run() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, source, target) = setup();
    let locked = source.join("locked.txt");
    write(&locked, b"secret");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    write(&target.join("locked.txt"), b"secret");

    // Privileged users can read anyway
    let readable = File::open(&locked).is_ok();
    let result = run(&config(&source, &target));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    if readable {
        return;
    }

    assert!(matches!(result, Err(RelinkError::Hash(_))));
    assert_ne!(inode(&locked), inode(&target.join("locked.txt")));
}

#[test]
#[cfg(unix)]
fn test_unwritable_target_directory_aborts_with_link_error() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, source, target) = setup();
    write(&source.join("a.txt"), b"testing");
    let locked = target.join("locked");
    write(&locked.join("a.txt"), b"testing");
    let before = inode(&locked.join("a.txt"));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    let writable = File::create(locked.join("probe")).is_ok();
    let result = run(&config(&source, &target));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    if writable {
        return;
    }

    match result {
        Err(RelinkError::Link(err)) => {
            assert_eq!(err.target_path, locked.join("a.txt"));
        }
        other => panic!("Expected Link error, got {:?}", other),
    }
    assert_eq!(inode(&locked.join("a.txt")), before);
    assert_eq!(fs::read(locked.join("a.txt")).unwrap(), b"testing");
}
