//! Directory walker implementation using walkdir for lazy traversal.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for enumerating the regular
//! files beneath a root directory. Each call to [`Walker::walk`] starts a
//! fresh traversal and returns a [`Walk`] iterator that reads directories
//! only as it is pulled, so a consumer can stop at any point without the
//! whole tree ever being listed in memory.
//!
//! # Rules
//!
//! - Only regular files are yielded; directories, symbolic links (never
//!   followed) and special files are skipped.
//! - The root itself is never yielded, even if it is a file.
//! - A root that does not exist yields nothing and no error.
//! - The first traversal error is yielded as the final item; the iterator
//!   is exhausted afterwards.
//! - Order follows directory order and is not sorted.
//!
//! # Example
//!
//! ```no_run
//! use relink::scanner::Walker;
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/srv/target"));
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} files", files.len());
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{FileRecord, ScanError};

/// Directory walker for lazy file discovery.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
}

impl Walker {
    /// Create a new walker for the given root directory.
    ///
    /// # Arguments
    ///
    /// * `root` - Root directory to scan. Relative paths in yielded records
    ///   are computed against it.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Root directory this walker enumerates.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh traversal of the tree.
    ///
    /// Returns an iterator over [`FileRecord`] results. Iteration stops
    /// after the first error, which is always the last item yielded.
    pub fn walk(&self) -> Walk {
        let inner = match std::fs::symlink_metadata(&self.root) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Walk root does not exist: {}", self.root.display());
                None
            }
            _ => Some(
                WalkDir::new(&self.root)
                    .min_depth(1)
                    .follow_links(false)
                    .into_iter(),
            ),
        };

        Walk {
            root: self.root.clone(),
            inner,
        }
    }

    /// Count the files and bytes a walk would yield.
    ///
    /// Used to size the progress totals before a phase starts.
    ///
    /// # Errors
    ///
    /// Returns the first traversal error encountered.
    pub fn tally(&self) -> Result<(u64, u64), ScanError> {
        let mut files = 0u64;
        let mut bytes = 0u64;
        for entry in self.walk() {
            let record = entry?;
            files += 1;
            bytes += record.size;
        }
        Ok((files, bytes))
    }
}

/// A single in-progress traversal started by [`Walker::walk`].
pub struct Walk {
    root: PathBuf,
    /// `None` once the walk is finished or failed.
    inner: Option<walkdir::IntoIter>,
}

impl Walk {
    fn fail(&mut self, error: ScanError) -> Option<Result<FileRecord, ScanError>> {
        self.inner = None;
        Some(Err(error))
    }

    fn relative_key(&self, path: &Path) -> Result<String, ScanError> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let key = relative
            .to_str()
            .ok_or_else(|| ScanError::InvalidPath(path.to_path_buf()))?;

        if cfg!(windows) {
            Ok(key.replace('\\', "/"))
        } else {
            Ok(key.to_string())
        }
    }
}

impl Iterator for Walk {
    type Item = Result<FileRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.inner.as_mut()?.next();
            let entry = match next {
                None => {
                    self.inner = None;
                    return None;
                }
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    let error = convert_walkdir_error(&self.root, e);
                    log::warn!("Walker error: {}", error);
                    return self.fail(error);
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() {
                log::trace!("Skipping symlink: {}", entry.path().display());
                continue;
            }
            if !file_type.is_file() {
                log::trace!("Skipping special file: {}", entry.path().display());
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    let error = convert_walkdir_error(&self.root, e);
                    return self.fail(error);
                }
            };

            let path = entry.into_path();
            return match self.relative_key(&path) {
                Ok(key) => Some(Ok(FileRecord::new(path, key, size))),
                Err(e) => self.fail(e),
            };
        }
    }
}

/// Convert a walkdir error into a [`ScanError`].
fn convert_walkdir_error(root: &Path, error: walkdir::Error) -> ScanError {
    let path = error
        .path()
        .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
    let message = error.to_string();

    match error.into_io_error() {
        Some(io) if io.kind() == ErrorKind::PermissionDenied => ScanError::PermissionDenied(path),
        Some(io) if io.kind() == ErrorKind::NotFound => ScanError::NotFound(path),
        Some(io) => ScanError::Io { path, source: io },
        // Symlink loops carry no I/O error; we never follow links, but keep
        // the message if walkdir reports one anyway.
        None => ScanError::Io {
            path,
            source: std::io::Error::other(message),
        },
    }
}
