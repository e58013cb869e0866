//! Progress accounting for hashing phases.
//!
//! This module provides [`ProgressCounters`], a set of atomic counters that
//! hashing workers bump as they go, and [`ProgressReporter`], a background
//! thread that logs a snapshot of those counters at a fixed interval.
//!
//! Workers only ever use atomic adds; the reporter is the only reader
//! during a phase. Counters are reset between phases.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytesize::ByteSize;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Default interval between progress lines.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Format a byte count with IEC units (KiB, MiB, GiB).
///
/// # Examples
///
/// ```
/// use relink::progress::format_size;
///
/// assert_eq!(format_size(1024), "1.0 KiB");
/// assert!(format_size(3 * 1024 * 1024).contains("MiB"));
/// ```
#[must_use]
pub fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).to_string()
}

/// Phase-scoped counters shared by every hashing worker.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    files_completed: AtomicU64,
    bytes_completed: AtomicU64,
    total_files: AtomicU64,
    total_bytes: AtomicU64,
}

impl ProgressCounters {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the completion counters and set new phase totals.
    pub fn reset(&self, total_files: u64, total_bytes: u64) {
        self.files_completed.store(0, Ordering::Relaxed);
        self.bytes_completed.store(0, Ordering::Relaxed);
        self.total_files.store(total_files, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    /// Record `bytes` more bytes processed.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_completed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one more file finished.
    pub fn file_done(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_completed: self.files_completed.load(Ordering::Relaxed),
            bytes_completed: self.bytes_completed.load(Ordering::Relaxed),
            total_files: self.total_files.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProgressCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Files finished so far
    pub files_completed: u64,
    /// Bytes hashed (or skipped) so far
    pub bytes_completed: u64,
    /// Files in the phase
    pub total_files: u64,
    /// Bytes in the phase
    pub total_bytes: u64,
}

impl ProgressSnapshot {
    /// Completed share of total bytes, in percent.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_completed as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} files, {}/{} ({:.1}%)",
            self.files_completed,
            self.total_files,
            format_size(self.bytes_completed),
            format_size(self.total_bytes),
            self.percent()
        )
    }
}

/// Background thread logging counter snapshots while a phase runs.
///
/// Stops when [`ProgressReporter::stop`] is called or the reporter is dropped.
pub struct ProgressReporter {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start logging `counters` every `interval`, labelled with `phase`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reporter thread cannot be spawned.
    pub fn spawn(
        phase: &'static str,
        counters: Arc<ProgressCounters>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("relink-progress".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        log::info!("Progress [{}]: {}", phase, counters.snapshot());
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the reporter and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Progress reporter thread panicked");
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
