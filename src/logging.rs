//! Logging infrastructure for relink.
//!
//! This module provides structured logging using the `log` facade and `env_logger` backend.
//! Log levels are determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. The configured `log_level` (`--log-level`, `RELINK_LOG_LEVEL`, or the config file)
//!
//! Debug and info records go to stdout; warnings and errors go to stderr.
//!
//! # Build-specific Formatting
//!
//! - **Debug builds**: Include timestamp, level, and module path for detailed debugging
//! - **Release builds**: Compact format with level and message only for cleaner output
//!
//! # Example
//!
//! ```rust,no_run
//! use relink::config::LogLevel;
//! use relink::logging::init_logging;
//!
//! init_logging(LogLevel::Info);
//! log::info!("Application started");
//! ```

use std::env;
use std::io::Write;

use env_logger::{Builder, Logger, Target};
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::config::LogLevel;

/// Initialize the logging subsystem.
///
/// Calling it again after a logger is installed has no effect.
///
/// # Arguments
///
/// * `level` - Configured level, ignored when `RUST_LOG` is set
pub fn init_logging(level: LogLevel) {
    let use_env = env::var("RUST_LOG").is_ok();
    let filter = determine_level(level, use_env);

    let stdout = build_logger(Target::Stdout, level, use_env);
    let stderr = build_logger(Target::Stderr, level, use_env);
    let max_level = stdout.filter().max(stderr.filter());

    if log::set_boxed_logger(Box::new(SplitLogger { stdout, stderr })).is_err() {
        // Already initialized (tests call run_app repeatedly)
        return;
    }
    log::set_max_level(max_level);

    if use_env {
        log::debug!(
            "Logging initialized from RUST_LOG environment variable: {:?}",
            env::var("RUST_LOG").ok()
        );
    } else {
        log::debug!("Logging initialized at level: {:?}", filter);
    }
}

/// Level filter used when `RUST_LOG` is not set.
fn determine_level(level: LogLevel, use_env: bool) -> LevelFilter {
    if use_env {
        LevelFilter::Trace
    } else {
        level.as_filter()
    }
}

fn build_logger(target: Target, level: LogLevel, use_env: bool) -> Logger {
    let mut builder = Builder::new();
    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level.as_filter());
    }
    builder.target(target);
    configure_format(&mut builder, level);
    builder.build()
}

/// Sends warnings and errors to stderr, everything else to stdout.
struct SplitLogger {
    stdout: Logger,
    stderr: Logger,
}

impl SplitLogger {
    fn route(&self, level: Level) -> &Logger {
        if level <= Level::Warn {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

impl Log for SplitLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.route(metadata.level()).enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        self.route(record.level()).log(record);
    }

    fn flush(&self) {
        self.stdout.flush();
        self.stderr.flush();
    }
}

/// Configure the log format based on build type and level.
///
/// - Debug builds: timestamp, level, module path at debug level
/// - Release builds: compact format (level + message only)
fn configure_format(builder: &mut Builder, level: LogLevel) {
    #[cfg(debug_assertions)]
    {
        let with_module = level == LogLevel::Debug;
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let level_style = buf.default_level_style(level);

            if with_module {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} {}",
                    timestamp,
                    level,
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = level;
        builder.format(|buf, record| {
            let level = record.level();
            let level_style = buf.default_level_style(level);
            writeln!(
                buf,
                "{level_style}{:<5}{level_style:#} {}",
                level,
                record.args()
            )
        });
    }
}
