//! Command-line interface definitions for relink.
//!
//! Running `relink` with no subcommand performs a dedup run; every run flag
//! is optional here because values may also come from the config file or
//! `RELINK_*` environment variables.
//!
//! # Example
//!
//! ```bash
//! # Hardlink identical files in /srv/backup/target to /srv/backup/source
//! relink --source /srv/backup/source --target /srv/backup/target
//!
//! # Keep the index between runs
//! relink -s src -t dst --cache-type sqlite --cache-path relink.db
//!
//! # Find the fastest read buffer for this disk
//! relink bufferbench --size 256MiB
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::bench::DEFAULT_BENCH_SIZE;
use crate::cache::CacheKind;
use crate::config::{ConfigOverrides, LogLevel};

/// Reclaim disk space by hardlinking identical files between two trees.
///
/// Every file in TARGET whose content matches a file anywhere in SOURCE is
/// replaced, atomically, with a hardlink to that source file.
#[derive(Debug, Parser)]
#[command(name = "relink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Output errors as JSON to stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    #[command(flatten)]
    pub run: RunArgs,

    /// Optional subcommand; without one a dedup run is performed
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Measure hashing throughput for a range of buffer sizes
    Bufferbench(BufferBenchArgs),
}

/// Arguments for a dedup run.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE", env = "RELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory whose files are kept and linked to
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Directory whose duplicates are replaced by hardlinks
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Maximum number of files hashed concurrently (default: 4)
    #[arg(short = 'j', long, value_name = "N")]
    pub hash_jobs: Option<usize>,

    /// Read buffer size for hashing (e.g., 4096, 64KiB)
    #[arg(short, long, value_name = "SIZE", value_parser = parse_buffer_size)]
    pub buffer_size: Option<usize>,

    /// Cache backend (default: memory)
    #[arg(long, value_enum, value_name = "TYPE")]
    pub cache_type: Option<CacheKind>,

    /// SQLite database location, or `:memory:`
    #[arg(long, value_name = "PATH")]
    pub cache_path: Option<String>,

    /// Logging level (default: info)
    #[arg(short, long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl RunArgs {
    /// Flags given on the command line, as the top configuration layer.
    #[must_use]
    pub fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level,
            source: self.source.clone(),
            target: self.target.clone(),
            hash_jobs: self.hash_jobs,
            buffer_size: self.buffer_size,
            cache_type: self.cache_type,
            cache_path: self.cache_path.clone(),
        }
    }
}

/// Arguments for the bufferbench subcommand.
#[derive(Debug, Args)]
pub struct BufferBenchArgs {
    /// Size of the scratch file to hash (e.g., 1GiB, 512MiB)
    #[arg(long, value_name = "SIZE", default_value_t = DEFAULT_BENCH_SIZE, value_parser = parse_size)]
    pub size: u64,

    /// Directory for the scratch file
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use relink::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

/// [`parse_size`] narrowed to a buffer length.
fn parse_buffer_size(s: &str) -> Result<usize, String> {
    let bytes = parse_size(s)?;
    usize::try_from(bytes).map_err(|_| format!("Buffer size too large: {bytes} bytes"))
}
