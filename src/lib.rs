//! relink - hardlink identical files between two directory trees
//!
//! Every file under a target tree whose bytes match a file anywhere under a
//! source tree is replaced, atomically, with a hardlink to that source file.
//! Matching is by BLAKE2b-512 content digest, independent of names and
//! relative locations.
//!
//! The library exposes the engine ([`engine::run`]) and its building blocks;
//! the `relink` binary is a thin wrapper around [`run_app`].

pub mod actions;
pub mod bench;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod signal;

pub use engine::{run, Engine, RunSummary};
pub use error::{ExitCode, RelinkError};

use anyhow::Context;

use crate::cli::{BufferBenchArgs, Cli, Commands};
use crate::config::{Config, LogLevel};
use crate::progress::format_size;

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns configuration, engine or benchmark errors; map them to a process
/// exit status with [`ExitCode::from_error`].
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Some(Commands::Bufferbench(args)) => run_bufferbench(&args),
        None => run_relink(&cli),
    }
}

fn run_relink(cli: &Cli) -> anyhow::Result<ExitCode> {
    let overrides = cli.run.to_overrides();
    let config = Config::load(cli.run.config.as_deref(), &overrides)?;

    logging::init_logging(config.log_level);
    log::info!("relink - {}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    log::debug!("Configuration: {:?}", config);

    let handler = signal::install_handler().context("Failed to set up Ctrl+C handling")?;
    let engine = Engine::new(config).with_shutdown_flag(handler.get_flag());

    let summary = engine.run()?;
    log::info!(
        "Done: source {} files ({} hashed, {} cached), target {} files ({} linked, {} already linked, {} unmatched), {} now shared",
        summary.source_files,
        summary.source_hashed,
        summary.source_skipped,
        summary.target_files,
        summary.linked,
        summary.already_linked,
        summary.unmatched,
        format_size(summary.linked_bytes)
    );

    Ok(ExitCode::Success)
}

fn run_bufferbench(args: &BufferBenchArgs) -> anyhow::Result<ExitCode> {
    logging::init_logging(LogLevel::Info);
    log::info!("relink - {}", env!("CARGO_PKG_VERSION"));

    let report = bench::run_buffer_bench(&args.dir, args.size)?;
    print!("{report}");

    Ok(ExitCode::Success)
}
