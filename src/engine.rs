//! Two-phase dedup engine.
//!
//! # Overview
//!
//! A run has two phases that never overlap:
//!
//! 1. **Index source**: every file under the source root is hashed and its
//!    digest stored in the cache under its source-relative path. Files whose
//!    key is already cached are skipped, so re-running with a persistent
//!    cache does no re-hashing.
//! 2. **Match target**: every file under the target root is hashed and
//!    looked up by digest. A hit replaces the target file with a hardlink to
//!    the matching source file; a miss leaves it alone.
//!
//! Per-file work in each phase runs on a rayon pool of `hash_jobs` threads
//! fed lazily from the walker. The first error from any file stops further
//! dispatch and fails the run; files already in flight are allowed to finish.
//!
//! While a phase runs, a [`ProgressReporter`] logs the shared
//! [`ProgressCounters`] once per interval.
//!
//! # Example
//!
//! ```no_run
//! use relink::config::Config;
//! use relink::engine::run;
//!
//! let config = Config {
//!     source: "/srv/source".into(),
//!     target: "/srv/target".into(),
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! let summary = run(&config).unwrap();
//! println!("linked {} files", summary.linked);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use rayon::prelude::*;
use serde::Serialize;

use crate::actions::{atomic_link, same_inode};
use crate::cache::{open_cache, CacheError, ContentCache};
use crate::config::Config;
use crate::error::RelinkError;
use crate::progress::{
    format_size, ProgressCounters, ProgressReporter, DEFAULT_REPORT_INTERVAL,
};
use crate::scanner::{Digest, FileRecord, Hasher, Walker};

/// Capacity of the channel between a hashing thread and its progress drain.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// What a run did, for the final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files found under the source root
    pub source_files: u64,
    /// Source files hashed and added to the cache
    pub source_hashed: u64,
    /// Source files whose key was already cached
    pub source_skipped: u64,
    /// Files found under the target root
    pub target_files: u64,
    /// Targets that already shared an inode with their match
    pub already_linked: u64,
    /// Targets replaced with a hardlink
    pub linked: u64,
    /// Bytes made shared by new links
    pub linked_bytes: u64,
    /// Targets with no matching source content
    pub unmatched: u64,
}

/// Per-run counters bumped by worker tasks.
#[derive(Debug, Default)]
struct RunStats {
    source_hashed: AtomicU64,
    source_skipped: AtomicU64,
    already_linked: AtomicU64,
    linked: AtomicU64,
    linked_bytes: AtomicU64,
    unmatched: AtomicU64,
}

impl RunStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn summary(&self, source_files: u64, target_files: u64) -> RunSummary {
        RunSummary {
            source_files,
            source_hashed: self.source_hashed.load(Ordering::Relaxed),
            source_skipped: self.source_skipped.load(Ordering::Relaxed),
            target_files,
            already_linked: self.already_linked.load(Ordering::Relaxed),
            linked: self.linked.load(Ordering::Relaxed),
            linked_bytes: self.linked_bytes.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Run the engine once with a validated configuration.
///
/// # Errors
///
/// Returns the first fatal error; see [`RelinkError`].
pub fn run(config: &Config) -> Result<RunSummary, RelinkError> {
    Engine::new(config.clone()).run()
}

/// Orchestrates one or more dedup runs over the same configuration.
pub struct Engine {
    config: Config,
    cache: Option<Arc<dyn ContentCache>>,
    counters: Arc<ProgressCounters>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    report_interval: Duration,
}

impl Engine {
    /// Create an engine that opens the configured cache backend per run.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache: None,
            counters: Arc::new(ProgressCounters::new()),
            shutdown_flag: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    /// Use `cache` instead of opening the configured backend.
    ///
    /// The engine does not close a cache it was given.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Stop dispatching new files once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Interval between progress lines.
    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Progress counters for the phase currently (or last) running.
    #[must_use]
    pub fn counters(&self) -> Arc<ProgressCounters> {
        Arc::clone(&self.counters)
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn check_shutdown(&self) -> Result<(), RelinkError> {
        if self.is_shutdown_requested() {
            Err(RelinkError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Index the source tree, then link matching target files.
    ///
    /// # Errors
    ///
    /// Fails before any work if a root cannot be made absolute, the cache
    /// cannot be opened or the pool cannot start. Afterwards, the first
    /// walk, hash, cache or link error aborts the run, as does a shutdown
    /// request.
    pub fn run(&self) -> Result<RunSummary, RelinkError> {
        let source = resolve_root("source", &self.config.source)?;
        let target = resolve_root("target", &self.config.target)?;

        let (cache, owned) = match &self.cache {
            Some(cache) => (Arc::clone(cache), false),
            None => {
                let cache = open_cache(self.config.cache_type, &self.config.cache_path)?;
                (Arc::<dyn ContentCache>::from(cache), true)
            }
        };

        let result = self.run_phases(cache.as_ref(), &source, &target);

        if owned {
            if let Err(e) = cache.close() {
                if result.is_ok() {
                    return Err(e.into());
                }
                log::warn!("Failed to close cache: {}", e);
            }
        }

        result
    }

    fn run_phases(
        &self,
        cache: &dyn ContentCache,
        source: &Path,
        target: &Path,
    ) -> Result<RunSummary, RelinkError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.hash_jobs)
            .thread_name(|i| format!("relink-hash-{i}"))
            .build()
            .map_err(|e| RelinkError::Threads(e.to_string()))?;
        let hasher = Hasher::new(self.config.buffer_size);
        let stats = RunStats::default();

        let source_files = self.index_source(&pool, cache, &hasher, &stats, source)?;
        let target_files = self.match_target(&pool, cache, &hasher, &stats, source, target)?;

        Ok(stats.summary(source_files, target_files))
    }

    fn index_source(
        &self,
        pool: &rayon::ThreadPool,
        cache: &dyn ContentCache,
        hasher: &Hasher,
        stats: &RunStats,
        source: &Path,
    ) -> Result<u64, RelinkError> {
        self.check_shutdown()?;
        let walker = Walker::new(source);
        let (files, bytes) = walker.tally()?;
        log::info!(
            "Indexing source {}: {} files, {}",
            source.display(),
            files,
            format_size(bytes)
        );

        self.run_phase("index", pool, &walker, files, bytes, |record| {
            self.index_file(cache, hasher, stats, record)
        })?;

        log::info!(
            "Indexed source: hashed={} skipped={}",
            stats.source_hashed.load(Ordering::Relaxed),
            stats.source_skipped.load(Ordering::Relaxed)
        );
        Ok(files)
    }

    fn match_target(
        &self,
        pool: &rayon::ThreadPool,
        cache: &dyn ContentCache,
        hasher: &Hasher,
        stats: &RunStats,
        source: &Path,
        target: &Path,
    ) -> Result<u64, RelinkError> {
        self.check_shutdown()?;
        let walker = Walker::new(target);
        let (files, bytes) = walker.tally()?;
        log::info!(
            "Matching target {}: {} files, {}",
            target.display(),
            files,
            format_size(bytes)
        );

        self.run_phase("match", pool, &walker, files, bytes, |record| {
            self.match_file(cache, hasher, stats, source, record)
        })?;

        log::info!(
            "Matched target: linked={} already_linked={} unmatched={}",
            stats.linked.load(Ordering::Relaxed),
            stats.already_linked.load(Ordering::Relaxed),
            stats.unmatched.load(Ordering::Relaxed)
        );
        Ok(files)
    }

    /// Feed every walked file to `task` on the pool, stopping at the first error.
    fn run_phase<F>(
        &self,
        phase: &'static str,
        pool: &rayon::ThreadPool,
        walker: &Walker,
        files: u64,
        bytes: u64,
        task: F,
    ) -> Result<(), RelinkError>
    where
        F: Fn(FileRecord) -> Result<(), RelinkError> + Sync,
    {
        self.counters.reset(files, bytes);
        let reporter =
            ProgressReporter::spawn(phase, self.counters(), self.report_interval)
                .map_err(|e| RelinkError::Threads(e.to_string()))?;

        let result = pool.install(|| {
            walker.walk().par_bridge().try_for_each(|entry| {
                if self.is_shutdown_requested() {
                    log::debug!("Shutdown requested, not dispatching more files");
                    return Err(RelinkError::Interrupted);
                }
                task(entry?)
            })
        });

        reporter.stop();
        log::debug!("Phase {} finished: {}", phase, self.counters.snapshot());
        result
    }

    fn index_file(
        &self,
        cache: &dyn ContentCache,
        hasher: &Hasher,
        stats: &RunStats,
        record: FileRecord,
    ) -> Result<(), RelinkError> {
        let key = record.relative_path.as_str();

        if cache.exists(key).map_err(|e| cache_access("exists", key, e))? {
            log::trace!("Already indexed path={}", key);
            self.counters.add_bytes(record.size);
            self.counters.file_done();
            RunStats::bump(&stats.source_skipped, 1);
            return Ok(());
        }

        let digest = self.hash_tracked(hasher, &record.path).inspect_err(|e| {
            log::error!("Failed to hash source path={}: {}", record.path.display(), e);
        })?;
        cache
            .put(key, &digest)
            .map_err(|e| cache_access("put", key, e))?;

        self.counters.file_done();
        RunStats::bump(&stats.source_hashed, 1);
        Ok(())
    }

    fn match_file(
        &self,
        cache: &dyn ContentCache,
        hasher: &Hasher,
        stats: &RunStats,
        source: &Path,
        record: FileRecord,
    ) -> Result<(), RelinkError> {
        if record.is_symlink {
            return Ok(());
        }

        let digest = self.hash_tracked(hasher, &record.path).inspect_err(|e| {
            log::error!("Failed to hash target path={}: {}", record.path.display(), e);
        })?;
        self.counters.file_done();

        let key = record.relative_path.as_str();
        let Some(source_key) = cache
            .get_by_digest(&digest)
            .map_err(|e| cache_access("lookup", key, e))?
        else {
            log::trace!("No match for path={}", key);
            RunStats::bump(&stats.unmatched, 1);
            return Ok(());
        };

        let source_path = source.join(&source_key);
        if same_inode(&source_path, &record.path) {
            log::debug!(
                "Already linked target={} source={}",
                record.path.display(),
                source_path.display()
            );
            RunStats::bump(&stats.already_linked, 1);
            return Ok(());
        }

        atomic_link(&source_path, &record.path).inspect_err(|e| {
            log::error!("{}", e);
        })?;
        log::info!(
            "Linked target={} source={}",
            record.path.display(),
            source_path.display()
        );
        RunStats::bump(&stats.linked, 1);
        RunStats::bump(&stats.linked_bytes, record.size);
        Ok(())
    }

    /// Hash `path` on a helper thread while this task drains its byte
    /// counts into the shared counters.
    fn hash_tracked(&self, hasher: &Hasher, path: &Path) -> Result<Digest, RelinkError> {
        let (tx, rx) = bounded::<u64>(PROGRESS_CHANNEL_CAPACITY);

        std::thread::scope(|scope| {
            let producer = std::thread::Builder::new()
                .name("relink-hasher".to_string())
                .spawn_scoped(scope, move || hasher.hash_file_with_progress(path, &tx))
                .map_err(|e| RelinkError::Threads(e.to_string()))?;

            // Ends when the producer drops its sender
            for bytes in &rx {
                self.counters.add_bytes(bytes);
            }

            match producer.join() {
                Ok(result) => result.map_err(RelinkError::from),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }
}

fn resolve_root(which: &'static str, path: &Path) -> Result<PathBuf, RelinkError> {
    std::path::absolute(path).map_err(|source| RelinkError::ResolvePath {
        which,
        path: path.to_path_buf(),
        source,
    })
}

fn cache_access(op: &'static str, key: &str, source: CacheError) -> RelinkError {
    log::error!("Cache {} failed for path={}: {}", op, key, source);
    RelinkError::CacheAccess {
        op,
        key: key.to_string(),
        source,
    }
}
