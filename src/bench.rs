//! Buffer-size micro-benchmark behind `relink bufferbench`.
//!
//! Writes a scratch file, hashes it once per candidate buffer size and
//! reports throughput, so `buffer_size` can be tuned for a given disk.
//! The scratch file is removed when the benchmark returns, on success or
//! failure.

use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use rand::RngCore;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::progress::format_size;
use crate::scanner::{HashError, Hasher};

/// Buffer sizes tried, 1 KiB to 64 KiB in powers of two.
pub const BENCH_BUFFER_SIZES: [usize; 7] = [1024, 2048, 4096, 8192, 16384, 32768, 65536];

/// Default scratch file size (1 GiB).
pub const DEFAULT_BENCH_SIZE: u64 = 1024 * 1024 * 1024;

const FILL_CHUNK: usize = 64 * 1024;

/// Errors raised by the benchmark.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The scratch file could not be created or written.
    #[error("failed to prepare scratch file in {}: {source}", .dir.display())]
    Scratch {
        dir: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hashing the scratch file failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Timing for one buffer size.
#[derive(Debug, Clone, Copy)]
pub struct BenchResult {
    pub buffer_size: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl BenchResult {
    /// Hashing throughput in MiB/s.
    #[must_use]
    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return f64::INFINITY;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

/// All results of one benchmark run.
#[derive(Debug, Clone, Default)]
pub struct BenchReport {
    pub results: Vec<BenchResult>,
}

impl BenchReport {
    /// Fastest buffer size measured.
    #[must_use]
    pub fn optimal(&self) -> Option<&BenchResult> {
        self.results
            .iter()
            .max_by(|a, b| a.mib_per_sec().total_cmp(&b.mib_per_sec()))
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(best) = self.optimal() {
            writeln!(f, "Optimal buffer size: {} bytes", best.buffer_size)?;
            writeln!(f, "Optimal speed: {:.2} MiB/s", best.mib_per_sec())?;
        }
        writeln!(f, "{:<10} {:<10} {:<10}", "Size", "MiB/s", "Time")?;
        for result in &self.results {
            writeln!(
                f,
                "{:<10} {:<10.2} {:<10.3?}",
                result.buffer_size,
                result.mib_per_sec(),
                result.elapsed
            )?;
        }
        Ok(())
    }
}

/// Hash a `size`-byte scratch file in `dir` with every size in
/// [`BENCH_BUFFER_SIZES`].
///
/// # Errors
///
/// Returns [`BenchError::Scratch`] if the scratch file cannot be written
/// and [`BenchError::Hash`] if hashing it fails.
pub fn run_buffer_bench(dir: &Path, size: u64) -> Result<BenchReport, BenchError> {
    run_buffer_bench_with(dir, size, &BENCH_BUFFER_SIZES)
}

/// Like [`run_buffer_bench`] with a custom list of buffer sizes.
///
/// # Errors
///
/// Same as [`run_buffer_bench`].
pub fn run_buffer_bench_with(
    dir: &Path,
    size: u64,
    buffer_sizes: &[usize],
) -> Result<BenchReport, BenchError> {
    let scratch = write_scratch(dir, size).map_err(|source| BenchError::Scratch {
        dir: dir.to_path_buf(),
        source,
    })?;
    log::info!(
        "Wrote {} scratch file {}",
        format_size(size),
        scratch.path().display()
    );

    let mut report = BenchReport::default();
    for &buffer_size in buffer_sizes {
        let hasher = Hasher::new(buffer_size);
        let start = Instant::now();
        hasher.hash_file(scratch.path())?;
        let result = BenchResult {
            buffer_size,
            bytes: size,
            elapsed: start.elapsed(),
        };
        log::debug!(
            "Buffer {} bytes: {:.2} MiB/s",
            buffer_size,
            result.mib_per_sec()
        );
        report.results.push(result);
    }

    Ok(report)
}

/// Fill a new temp file with random bytes.
fn write_scratch(dir: &Path, size: u64) -> std::io::Result<NamedTempFile> {
    let scratch = tempfile::Builder::new()
        .prefix("bufferbench-")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(scratch.as_file());
        let mut chunk = vec![0u8; FILL_CHUNK];
        let mut rng = rand::thread_rng();
        let mut remaining = size;

        while remaining > 0 {
            let n = remaining.min(FILL_CHUNK as u64) as usize;
            rng.fill_bytes(&mut chunk[..n]);
            writer.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        writer.flush()?;
    }

    scratch.as_file().sync_all()?;
    Ok(scratch)
}
