//! SQLite-backed content cache.
//!
//! Schema: a single table `cache(key TEXT PRIMARY KEY, value BLOB)`, one row
//! per indexed source path, value = raw 64-byte digest. The table is created
//! on open if it is missing, so an existing database can be reused across
//! runs; rows already present make the next run skip those source files.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{digest_from_bytes, CacheError, CacheResult, ContentCache};
use crate::scanner::Digest;

/// Location that opens a private, non-durable database.
pub const IN_MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value BLOB
);
CREATE INDEX IF NOT EXISTS cache_value ON cache(value);
";

/// Persistent cache for file digests using SQLite.
///
/// `rusqlite::Connection` is not `Sync`, so every statement runs under one
/// mutex. The lock is held for a single statement at a time.
pub struct SqliteCache {
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache").finish_non_exhaustive()
    }
}

impl SqliteCache {
    /// Opens or creates a cache at `location`.
    ///
    /// [`IN_MEMORY_PATH`] opens an in-process database that disappears
    /// with the cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(location: &str) -> CacheResult<Self> {
        let open_err = |source| CacheError::Open {
            path: Path::new(location).to_path_buf(),
            source,
        };

        let conn = if location == IN_MEMORY_PATH {
            Connection::open_in_memory().map_err(open_err)?
        } else {
            let conn = Connection::open(location).map_err(open_err)?;
            // WAL keeps lookups from blocking behind a pending write
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(open_err)?;
            conn
        };

        migrate(&conn).map_err(open_err)?;
        log::debug!("Opened cache database {}", location);

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the cache is closed.
    pub fn len(&self) -> CacheResult<usize> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(CacheError::Closed)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Whether the cache holds no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the cache is closed.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> CacheResult<T>) -> CacheResult<T> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(CacheError::Closed)?;
        f(conn)
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

impl ContentCache for SqliteCache {
    fn put(&self, key: &str, digest: &Digest) -> CacheResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache (key, value) VALUES (?1, ?2)",
                params![key, &digest[..]],
            )?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> CacheResult<Option<Digest>> {
        self.with_conn(|conn| {
            let value: Option<Vec<u8>> = conn
                .query_row("SELECT value FROM cache WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            value.map(|bytes| digest_from_bytes(key, &bytes)).transpose()
        })
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM cache WHERE key = ?1)",
                [key],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    fn get_by_digest(&self, digest: &Digest) -> CacheResult<Option<String>> {
        self.with_conn(|conn| {
            let key = conn
                .query_row(
                    "SELECT key FROM cache WHERE value = ?1 ORDER BY rowid LIMIT 1",
                    [&digest[..]],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(key)
        })
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    fn close(&self) -> CacheResult<()> {
        let mut guard = self.lock()?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| CacheError::Database(e)),
            None => Ok(()),
        }
    }
}
