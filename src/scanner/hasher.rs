//! BLAKE2b-512 file hasher with streaming support.
//!
//! # Overview
//!
//! This module provides the [`Hasher`] struct for computing 64-byte BLAKE2b
//! digests of file contents. Files are read sequentially in chunks of the
//! configured buffer size and fed to the digest in file order, so the result
//! is independent of the buffer size chosen.
//!
//! Progress can be streamed to a bounded channel: after every chunk is read,
//! and before it is hashed, the number of bytes just read is sent.
//!
//! # Example
//!
//! ```no_run
//! use relink::scanner::Hasher;
//! use std::path::Path;
//!
//! let hasher = Hasher::new(64 * 1024);
//! let digest = hasher.hash_file(Path::new("movie.mkv")).unwrap();
//! println!("{}", relink::scanner::digest_to_hex(&digest));
//! ```

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use blake2::{Blake2b512, Digest as _};
use crossbeam_channel::Sender;

use super::HashError;

/// Length of a content digest in bytes.
pub const DIGEST_LEN: usize = 64;

/// Read buffer size used when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// A BLAKE2b-512 content digest.
pub type Digest = [u8; DIGEST_LEN];

/// Streaming file hasher.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl Hasher {
    /// Create a hasher that reads files `buffer_size` bytes at a time.
    ///
    /// A zero buffer size is bumped to one byte.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Configured read buffer size in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Compute the digest of a file's full contents.
    ///
    /// A zero-length file yields the digest of the empty byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::NotFound`] or [`HashError::PermissionDenied`] if
    /// the file cannot be opened, [`HashError::Io`] if a read fails and
    /// [`HashError::ShortHash`] if the digest accepted fewer bytes than were
    /// read.
    pub fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        self.hash_inner(path, None)
    }

    /// Compute the digest of a file, sending each chunk's length to `progress`.
    ///
    /// The sender is only borrowed; the channel closes when the caller
    /// drops its last sender. A disconnected receiver does not affect the
    /// digest.
    ///
    /// # Errors
    ///
    /// Same as [`Hasher::hash_file`].
    pub fn hash_file_with_progress(
        &self,
        path: &Path,
        progress: &Sender<u64>,
    ) -> Result<Digest, HashError> {
        self.hash_inner(path, Some(progress))
    }

    fn hash_inner(&self, path: &Path, progress: Option<&Sender<u64>>) -> Result<Digest, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut state = Blake2b512::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };

            if let Some(tx) = progress {
                // Progress is observational only
                let _ = tx.send(read as u64);
            }

            let hashed = state
                .write(&buffer[..read])
                .map_err(|e| HashError::from_io(path, e))?;
            if hashed != read {
                return Err(HashError::ShortHash {
                    path: path.to_path_buf(),
                    read,
                    hashed,
                });
            }
        }

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&state.finalize());
        log::trace!("Hashed {}", path.display());
        Ok(digest)
    }
}

/// Render a digest as lowercase hex.
#[must_use]
pub fn digest_to_hex(digest: &Digest) -> String {
    use std::fmt::Write as _;

    digest.iter().fold(String::with_capacity(DIGEST_LEN * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
