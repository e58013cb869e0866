//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Lazy directory walking using walkdir
//! - Streaming BLAKE2b-512 content hashing with byte-level progress
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: BLAKE2b-512 file hashing (streaming)
//!
//! # Example
//!
//! ```no_run
//! use relink::scanner::{Hasher, Walker};
//! use std::path::Path;
//!
//! let hasher = Hasher::new(4096);
//! for entry in Walker::new(Path::new("/srv/source")).walk() {
//!     match entry {
//!         Ok(file) => {
//!             let digest = hasher.hash_file(&file.path).unwrap();
//!             println!("{} {}", relink::scanner::digest_to_hex(&digest), file.relative_path);
//!         }
//!         Err(e) => eprintln!("Walk failed: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::path::PathBuf;

// Re-export main types
pub use hasher::{digest_to_hex, Digest, Hasher, DIGEST_LEN};
pub use walker::{Walk, Walker};

/// A regular file discovered beneath a walk root.
///
/// Produced by the walker and handed straight to a hashing task;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated on Unix.
    /// This is the cache key for source files.
    pub relative_path: String,
    /// File size in bytes
    pub size: u64,
    /// Whether the entry is a symbolic link
    pub is_symlink: bool,
}

impl FileRecord {
    /// Create a new record for a regular (non-symlink) file.
    #[must_use]
    pub fn new(path: PathBuf, relative_path: String, size: u64) -> Self {
        Self {
            path,
            relative_path,
            size,
            is_symlink: false,
        }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The entry vanished between being listed and being inspected.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The path is not valid UTF-8 and cannot be used as a cache key.
    #[error("Path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    /// An I/O error occurred while traversing the tree.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Fewer bytes reached the digest than were read from the file.
    #[error("Short hash for {path}: read {read} bytes but hashed {hashed}")]
    ShortHash {
        /// File being hashed
        path: PathBuf,
        /// Bytes read from the file in the failing chunk
        read: usize,
        /// Bytes accepted by the digest
        hashed: usize,
    },

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    pub(crate) fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
