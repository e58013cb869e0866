use relink::cache::{open_cache, CacheError, CacheKind, ContentCache, SqliteCache, IN_MEMORY_PATH};
use relink::scanner::{Digest, Hasher};
use std::sync::Arc;
use tempfile::tempdir;

fn digest(seed: u8) -> Digest {
    let mut d = [0u8; 64];
    for (i, b) in d.iter_mut().enumerate() {
        *b = seed.wrapping_add(i as u8);
    }
    d
}

fn backends() -> Vec<(CacheKind, Box<dyn ContentCache>)> {
    vec![
        (CacheKind::Memory, open_cache(CacheKind::Memory, IN_MEMORY_PATH).unwrap()),
        (CacheKind::Sqlite, open_cache(CacheKind::Sqlite, IN_MEMORY_PATH).unwrap()),
    ]
}

#[test]
fn test_put_then_lookup_both_ways() {
    for (kind, cache) in backends() {
        cache.put("dir/a.txt", &digest(1)).unwrap();

        assert!(cache.exists("dir/a.txt").unwrap(), "{kind}");
        assert_eq!(cache.get("dir/a.txt").unwrap(), Some(digest(1)), "{kind}");
        assert_eq!(
            cache.get_by_digest(&digest(1)).unwrap().as_deref(),
            Some("dir/a.txt"),
            "{kind}"
        );
    }
}

#[test]
fn test_misses_are_not_errors() {
    for (kind, cache) in backends() {
        assert!(!cache.exists("missing").unwrap(), "{kind}");
        assert_eq!(cache.get("missing").unwrap(), None, "{kind}");
        assert_eq!(cache.get_by_digest(&digest(9)).unwrap(), None, "{kind}");
    }
}

#[test]
fn test_put_replaces_existing_value() {
    for (kind, cache) in backends() {
        cache.put("a", &digest(1)).unwrap();
        cache.put("a", &digest(2)).unwrap();

        assert_eq!(cache.get("a").unwrap(), Some(digest(2)), "{kind}");
        assert_eq!(cache.get_by_digest(&digest(1)).unwrap(), None, "{kind}");
    }
}

#[test]
fn test_shared_digest_returns_one_of_the_keys() {
    for (kind, cache) in backends() {
        cache.put("one", &digest(5)).unwrap();
        cache.put("two", &digest(5)).unwrap();

        let found = cache.get_by_digest(&digest(5)).unwrap().unwrap();
        assert!(found == "one" || found == "two", "{kind}: {found}");
    }
}

#[test]
fn test_delete_removes_entry() {
    for (kind, cache) in backends() {
        cache.put("a", &digest(3)).unwrap();
        cache.delete("a").unwrap();
        cache.delete("never-there").unwrap();

        assert!(!cache.exists("a").unwrap(), "{kind}");
    }
}

#[test]
fn test_sqlite_close_then_use_fails() {
    let cache = open_cache(CacheKind::Sqlite, IN_MEMORY_PATH).unwrap();
    cache.close().unwrap();

    assert!(matches!(cache.exists("a"), Err(CacheError::Closed)));
    assert!(matches!(cache.put("a", &digest(1)), Err(CacheError::Closed)));
}

#[test]
fn test_memory_close_is_noop() {
    let cache = open_cache(CacheKind::Memory, IN_MEMORY_PATH).unwrap();
    cache.put("a", &digest(1)).unwrap();
    cache.close().unwrap();

    assert!(cache.exists("a").unwrap());
}

#[test]
fn test_sqlite_file_survives_reopen() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("relink.db");
    let location = location.to_string_lossy();

    {
        let cache = SqliteCache::open(&location).unwrap();
        cache.put("kept.bin", &digest(7)).unwrap();
        cache.close().unwrap();
    }

    let cache = SqliteCache::open(&location).unwrap();
    assert_eq!(cache.get_by_digest(&digest(7)).unwrap().as_deref(), Some("kept.bin"));
}

#[test]
fn test_concurrent_writers_and_readers() {
    for (kind, cache) in backends() {
        let cache: Arc<dyn ContentCache> = Arc::from(cache);
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50u8 {
                        let key = format!("t{t}/f{i}");
                        let d = digest(t.wrapping_mul(50).wrapping_add(i));
                        cache.put(&key, &d).unwrap();
                        assert!(cache.exists(&key).unwrap());
                        cache.get_by_digest(&d).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for t in 0..4u8 {
            for i in 0..50u8 {
                assert!(cache.exists(&format!("t{t}/f{i}")).unwrap(), "{kind}");
            }
        }
    }
}

#[test]
fn test_real_file_digest_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    std::fs::write(&path, b"some file content").unwrap();
    let d = Hasher::default().hash_file(&path).unwrap();

    for (kind, cache) in backends() {
        cache.put("data.bin", &d).unwrap();
        assert_eq!(
            cache.get_by_digest(&d).unwrap().as_deref(),
            Some("data.bin"),
            "{kind}"
        );
    }
}
