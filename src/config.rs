//! Application configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, or `config.toml` in the platform config
//!    directory when present)
//! 3. Environment variables prefixed `RELINK_` (e.g. `RELINK_HASH_JOBS=8`)
//! 4. Command-line flags
//!
//! [`Config::validate`] must pass before a run starts; the engine trusts a
//! validated configuration and does not check it again.
//!
//! # Example
//!
//! ```no_run
//! use relink::config::{Config, ConfigOverrides};
//!
//! let config = Config::load(None, &ConfigOverrides::default()).unwrap();
//! config.validate().unwrap();
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

pub use crate::cache::CacheKind;
use crate::cache::IN_MEMORY_PATH;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "RELINK_";

/// Logging level for the application.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-file detail
    Debug,
    /// Phase progress and created links
    #[default]
    Info,
    /// Warnings and errors only
    Warn,
    /// Errors only
    Error,
}

impl LogLevel {
    /// Matching `log` filter.
    #[must_use]
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// No source directory was given.
    #[error("no source directory provided")]
    NoSource,

    /// No target directory was given.
    #[error("no target directory provided")]
    NoTarget,

    /// Source and target name the same directory.
    #[error("source and target directories are the same")]
    SourceAndTargetSame,

    /// The source directory does not exist.
    #[error("source directory not found: {0}")]
    SourceNotFound(PathBuf),

    /// Buffer size of zero.
    #[error("buffer size must be greater than 0 bytes")]
    ZeroBufferSize,

    /// Hash job count of zero.
    #[error("hash jobs must be greater than 0")]
    ZeroHashJobs,

    /// SQLite cache selected without a location.
    #[error("cache path must be set when cache type is sqlite")]
    EmptyCachePath,

    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    /// A layer could not be parsed or had invalid values.
    #[error("invalid configuration: {0}")]
    Load(Box<figment::Error>),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level
    pub log_level: LogLevel,
    /// Directory whose files are kept and linked to
    pub source: PathBuf,
    /// Directory whose duplicate files are replaced by hardlinks
    pub target: PathBuf,
    /// Maximum number of files hashed at once
    pub hash_jobs: usize,
    /// Read buffer size for hashing, in bytes
    pub buffer_size: usize,
    /// Cache backend
    pub cache_type: CacheKind,
    /// SQLite database location; `:memory:` for a non-durable database
    pub cache_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            source: PathBuf::new(),
            target: PathBuf::new(),
            hash_jobs: 4,
            buffer_size: 4096,
            cache_type: CacheKind::Memory,
            cache_path: IN_MEMORY_PATH.to_string(),
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    /// Log level from `--log-level`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Source root from `--source`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Target root from `--target`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    /// Worker count from `--hash-jobs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_jobs: Option<usize>,
    /// Read buffer from `--buffer-size`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    /// Backend from `--cache-type`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<CacheKind>,
    /// Database location from `--cache-path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
}

impl Config {
    /// Build the configuration from every layer.
    ///
    /// # Arguments
    ///
    /// * `config_file` - Explicit TOML file; must exist when given. When
    ///   `None`, the platform default is used if it exists.
    /// * `overrides` - Command-line values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigFileNotFound`] for a missing explicit
    /// file and [`ConfigError::Load`] for unparsable or ill-typed values.
    pub fn load(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
                }
                log::debug!("Loading config file {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = Self::default_config_path().filter(|p| p.is_file()) {
                    log::debug!("Loading config file {}", path.display());
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Platform-specific default config file location.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "relink", "relink").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check the configuration before a run.
    ///
    /// # Errors
    ///
    /// Returns the first rule the configuration breaks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::NoSource);
        }

        if self.target.as_os_str().is_empty() {
            return Err(ConfigError::NoTarget);
        }

        if same_path(&self.source, &self.target) {
            return Err(ConfigError::SourceAndTargetSame);
        }

        if let Err(e) = std::fs::metadata(&self.source) {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConfigError::SourceNotFound(self.source.clone()));
            }
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }

        if self.hash_jobs == 0 {
            return Err(ConfigError::ZeroHashJobs);
        }

        if self.cache_type == CacheKind::Sqlite && self.cache_path.is_empty() {
            return Err(ConfigError::EmptyCachePath);
        }

        if self.cache_type == CacheKind::Memory && self.cache_path != IN_MEMORY_PATH {
            log::warn!(
                "cache path {} is ignored unless cache type is sqlite",
                self.cache_path
            );
        }

        Ok(())
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::path::absolute(a), std::path::absolute(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
