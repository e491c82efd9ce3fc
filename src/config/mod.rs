//! Configuration management for fastcci-stream
//!
//! This module handles loading, parsing, and managing configuration from:
//! - Configuration files (TOML format)
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values
//!
//! Database credentials are kept out of this file and read from a MySQL
//! option file instead, see [`defaults_file`].

pub mod defaults_file;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::error::{ConfigError, Result, StreamError};

pub use defaults_file::ClientOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Window and fetch sizing
    #[serde(default)]
    pub scan: ScanConfig,

    /// Downstream consumer process
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data source connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Database server port; unset falls back to the option file, then 3306
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database (schema) name
    #[serde(default = "default_database")]
    pub database: String,

    /// MySQL option file holding the `[client]` credentials
    #[serde(default = "default_defaults_file")]
    pub defaults_file: PathBuf,
}

/// Window and fetch sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Width of one page_id window
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Rows pulled from the server per fetch
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Encoded chunks allowed in flight between the scan and the consumer pipe
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Downstream consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Executable looked up on PATH
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_host() -> String {
    "commonswiki.analytics.db.svc.eqiad.wmflabs".to_string()
}

fn default_database() -> String {
    "commonswiki_p".to_string()
}

fn default_defaults_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replica.my.cnf")
}

fn default_batch_size() -> u64 {
    100_000
}

fn default_fetch_size() -> usize {
    10_000
}

fn default_channel_capacity() -> usize {
    4
}

fn default_program() -> String {
    "fastcci_build_db".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            database: default_database(),
            defaults_file: default_defaults_file(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_size: default_fetch_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file, falling back to defaults
    ///
    /// An explicitly given path must exist. The default path is optional.
    ///
    /// # Arguments
    /// * `path` - Explicit configuration file, or `None` for the default location
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `~/.fastcci/stream.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fastcci")
            .join("stream.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.scan.batch_size == 0 {
            return Err(StreamError::invalid_value("scan.batch_size", 0));
        }
        if self.scan.fetch_size == 0 {
            return Err(StreamError::invalid_value("scan.fetch_size", 0));
        }
        if self.scan.channel_capacity == 0 {
            return Err(StreamError::invalid_value("scan.channel_capacity", 0));
        }
        if self.consumer.program.trim().is_empty() {
            return Err(StreamError::invalid_value(
                "consumer.program",
                &self.consumer.program,
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    /// Filter with `level` as the default and `directives` on top
    ///
    /// # Arguments
    /// * `directives` - Extra `RUST_LOG`-style directives, e.g. `sqlx=warn`
    pub fn env_filter(&self, directives: Option<&str>) -> EnvFilter {
        let default = LevelFilter::from_level(self.level.to_tracing_level());
        EnvFilter::builder()
            .with_default_directive(default.into())
            .parse_lossy(directives.unwrap_or_default())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
