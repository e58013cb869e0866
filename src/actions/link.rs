//! Crash-safe hardlink installation.
//!
//! # Overview
//!
//! [`atomic_link`] makes `target` a hardlink to `source` without ever
//! leaving `target` missing or half-written:
//!
//! 1. Reserve a free temporary name in the target's directory
//!    ([`safe_temp_path`]).
//! 2. Hardlink `source` to that temporary name.
//! 3. Rename the temporary name onto `target`. On one filesystem the
//!    rename replaces `target` atomically.
//!
//! If step 1 or 2 fails, `target` is untouched. The temporary name is
//! removed on every exit path.
//!
//! # Name reservation
//!
//! [`safe_temp_path`] creates a uniquely named empty file and deletes it
//! straight away, returning the now-free name. Another process could grab
//! the name in between; we accept that window to stay on portable
//! primitives.

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Prefix for temporary names created next to link targets.
pub const TEMP_PREFIX: &str = ".relink-";

/// Step of [`atomic_link`] that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStep {
    /// Reserving a temporary name in the target directory
    TempName,
    /// Creating the hardlink at the temporary name
    HardLink,
    /// Renaming the temporary link onto the target
    Rename,
}

impl fmt::Display for LinkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStep::TempName => write!(f, "create temp file"),
            LinkStep::HardLink => write!(f, "create hardlink"),
            LinkStep::Rename => write!(f, "move hardlink into place"),
        }
    }
}

/// Error type for link operations.
#[derive(Debug, Error)]
#[error("failed to {step} linking {} to {}: {source_err}", .source_path.display(), .target_path.display())]
pub struct LinkError {
    /// Step that failed
    pub step: LinkStep,
    /// File whose inode was being linked
    pub source_path: PathBuf,
    /// Path that was to be replaced
    pub target_path: PathBuf,
    /// Underlying I/O error
    #[source]
    pub source_err: io::Error,
}

impl LinkError {
    fn new(step: LinkStep, source: &Path, target: &Path, error: io::Error) -> Self {
        Self {
            step,
            source_path: source.to_path_buf(),
            target_path: target.to_path_buf(),
            source_err: error,
        }
    }
}

/// Removes the temporary name when dropped, whatever happened.
struct TempGuard(PathBuf);

impl Drop for TempGuard {
    fn drop(&mut self) {
        // Usually already gone after a successful rename
        let _ = fs::remove_file(&self.0);
    }
}

/// Reserve a name in `dir` that starts with `prefix` and does not exist.
///
/// # Errors
///
/// Returns an I/O error if the placeholder file cannot be created or removed.
///
/// # Example
///
/// ```no_run
/// use relink::actions::safe_temp_path;
/// use std::path::Path;
///
/// let free = safe_temp_path(Path::new("/tmp"), "demo-").unwrap();
/// assert!(!free.exists());
/// ```
pub fn safe_temp_path(dir: &Path, prefix: &str) -> io::Result<PathBuf> {
    let placeholder = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)?;
    let path = placeholder.path().to_path_buf();
    placeholder.close()?;
    Ok(path)
}

/// Replace `target` with a hardlink to `source`.
///
/// On success `target` refers to the same inode as `source`. On failure
/// `target` is in whatever state it was before the call.
///
/// # Errors
///
/// Returns a [`LinkError`] naming the failed [`LinkStep`] and both paths.
pub fn atomic_link(source: &Path, target: &Path) -> Result<(), LinkError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = match target.file_name() {
        Some(name) => format!("{TEMP_PREFIX}{}", name.to_string_lossy()),
        None => TEMP_PREFIX.to_string(),
    };

    let temp = safe_temp_path(dir, &prefix)
        .map_err(|e| LinkError::new(LinkStep::TempName, source, target, e))?;
    let guard = TempGuard(temp);

    fs::hard_link(source, &guard.0)
        .map_err(|e| LinkError::new(LinkStep::HardLink, source, target, e))?;
    fs::rename(&guard.0, target)
        .map_err(|e| LinkError::new(LinkStep::Rename, source, target, e))?;

    log::trace!("Linked {} -> {}", target.display(), source.display());
    Ok(())
}

/// Check whether two paths already point at the same inode.
///
/// Always `false` where inode identity is unavailable, and when either
/// path cannot be inspected.
#[must_use]
pub fn same_inode(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => match (InodeKey::from_metadata(&ma), InodeKey::from_metadata(&mb)) {
            (Some(ka), Some(kb)) => ka == kb,
            _ => false,
        },
        _ => false,
    }
}

/// Platform-specific inode identity.
///
/// On Unix, this is (device_id, inode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InodeKey {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(not(unix))]
    _phantom: (),
}

impl InodeKey {
    #[cfg(unix)]
    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}
