//! Content-addressed cache for source file digests.
//!
//! The cache maps a source file's path (relative to the source root) to its
//! content digest. It is read two ways: by key, to skip source files that
//! were already indexed, and by value, to find a source file whose content
//! matches a target file.
//!
//! # Architecture
//!
//! The engine is written against the [`ContentCache`] trait only. Two
//! backends implement it:
//!
//! * [`memory`]: a concurrent in-process map, gone when the process exits.
//! * [`database`]: a single SQLite table, durable across runs.
//!
//! [`open_cache`] picks one from a [`CacheKind`].
//!
//! # Reverse lookup
//!
//! When several keys share a digest, [`ContentCache::get_by_digest`] returns
//! one of them. Which one is backend-defined: the memory backend returns the
//! first match its scan reaches, the SQLite backend the earliest inserted
//! row.

pub mod database;
pub mod memory;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scanner::Digest;

pub use database::{SqliteCache, IN_MEMORY_PATH};
pub use memory::MemoryCache;

/// Errors raised by cache backends.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The SQLite store could not be opened or migrated.
    #[error("Failed to open cache database {path}: {source}")]
    Open {
        /// Location passed to the backend
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// A statement against the SQLite store failed.
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value is not a valid digest.
    #[error("Corrupt cache entry for {key}: expected 64 byte digest, found {len} bytes")]
    CorruptEntry {
        /// Key of the bad row
        key: String,
        /// Length of the stored value
        len: usize,
    },

    /// The cache was used after [`ContentCache::close`].
    #[error("Cache is closed")]
    Closed,

    /// A thread panicked while holding the cache lock.
    #[error("Cache lock poisoned")]
    Poisoned,

    /// The backend selector named no known backend.
    #[error("Unknown cache type '{0}' (expected 'memory' or 'sqlite')")]
    UnknownBackend(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Capability set shared by every cache backend.
///
/// Implementations must be safe to call from many hashing workers at once.
pub trait ContentCache: Send + Sync {
    /// Store `digest` under `key`, replacing any previous value.
    fn put(&self, key: &str, digest: &Digest) -> CacheResult<()>;

    /// Fetch the digest stored under `key`.
    fn get(&self, key: &str) -> CacheResult<Option<Digest>>;

    /// Check whether `key` has an entry.
    fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Find some key whose stored digest equals `digest`.
    fn get_by_digest(&self, digest: &Digest) -> CacheResult<Option<String>>;

    /// Remove the entry for `key`, if any.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Release backend resources. Later calls may fail with [`CacheError::Closed`].
    fn close(&self) -> CacheResult<()>;
}

/// Which cache backend to use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Concurrent in-memory map, discarded on exit
    #[default]
    Memory,
    /// SQLite table, durable across runs
    #[serde(alias = "persistent")]
    #[value(alias = "persistent")]
    Sqlite,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Memory => write!(f, "memory"),
            CacheKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for CacheKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheKind::Memory),
            "sqlite" | "persistent" => Ok(CacheKind::Sqlite),
            other => Err(CacheError::UnknownBackend(other.to_string())),
        }
    }
}

/// Open the backend selected by `kind`.
///
/// `location` is only used by the SQLite backend; [`IN_MEMORY_PATH`]
/// (`:memory:`) opens a non-durable in-process database.
///
/// # Errors
///
/// Returns [`CacheError::Open`] if the SQLite store cannot be opened or
/// migrated.
pub fn open_cache(kind: CacheKind, location: &str) -> CacheResult<Box<dyn ContentCache>> {
    match kind {
        CacheKind::Memory => {
            log::debug!("Using in-memory cache");
            Ok(Box::new(MemoryCache::new()))
        }
        CacheKind::Sqlite => {
            log::debug!("Using SQLite cache at {}", location);
            Ok(Box::new(SqliteCache::open(location)?))
        }
    }
}

/// Turn a stored blob back into a digest.
pub(crate) fn digest_from_bytes(key: &str, bytes: &[u8]) -> CacheResult<Digest> {
    Digest::try_from(bytes).map_err(|_| CacheError::CorruptEntry {
        key: key.to_string(),
        len: bytes.len(),
    })
}
