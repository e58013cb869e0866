//! Structured error handling and exit codes.

use std::path::PathBuf;

use serde::Serialize;

use crate::actions::LinkError;
use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::scanner::{HashError, ScanError};

/// Errors that abort a relink run.
///
/// Every variant is fatal: the run stops at the first one and reports it.
#[derive(thiserror::Error, Debug)]
pub enum RelinkError {
    /// A root directory could not be made absolute.
    #[error("failed to get absolute path for {which} {}: {source}", .path.display())]
    ResolvePath {
        /// "source" or "target"
        which: &'static str,
        /// Path as configured
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The cache backend could not be opened or closed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A cache read or write failed during a phase.
    #[error("cache {op} failed for {key}: {source}")]
    CacheAccess {
        /// Operation that failed
        op: &'static str,
        /// Key (relative path) involved
        key: String,
        /// Backend error
        #[source]
        source: CacheError,
    },

    /// Directory traversal failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A file could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// A target could not be replaced with a hardlink.
    #[error("failed to create hardlink: {0}")]
    Link(#[from] LinkError),

    /// The hashing pool or progress thread could not be started.
    #[error("failed to start worker threads: {0}")]
    Threads(String),

    /// Configuration was rejected before the run started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run was stopped by Ctrl+C.
    #[error("interrupted")]
    Interrupted,
}

impl RelinkError {
    /// Exit code the binary should use for this error.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Interrupted => ExitCode::Interrupted,
            Self::Config(_) => ExitCode::ConfigError,
            _ => ExitCode::GeneralError,
        }
    }
}

/// Exit codes for the relink binary.
///
/// - 0: Success
/// - 1: General error (the run aborted)
/// - 2: Configuration error (nothing was done)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the run completed.
    Success = 0,
    /// General error: the run aborted.
    GeneralError = 1,
    /// Configuration error: invalid or unreadable configuration.
    ConfigError = 2,
    /// Interrupted: Run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RL000",
            Self::GeneralError => "RL001",
            Self::ConfigError => "RL002",
            Self::Interrupted => "RL130",
        }
    }

    /// Pick the exit code for an application error.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<RelinkError>() {
            e.exit_code()
        } else if err.downcast_ref::<ConfigError>().is_some() {
            Self::ConfigError
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "RL001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
