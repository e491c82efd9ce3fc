//! Command-line interface for fastcci-stream
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Turning the effective configuration into scan options
//! - The `config` subcommand

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::error::Result;
use crate::scan::ScanOptions;

/// Stream category links from the wiki replica into the fastcci database builder
#[derive(Parser, Debug)]
#[command(
    name = "fastcci-stream",
    version,
    about = "Stream category links into fastcci_build_db",
    long_about = "Scans the categorylinks table in page_id windows and pipes every link as
`from<TAB>to<TAB>type` into the database builder's stdin."
)]
pub struct CliArgs {
    /// Database host
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Database port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database name
    #[arg(long = "db", value_name = "NAME")]
    pub database: Option<String>,

    /// MySQL option file holding user and password
    #[arg(long, value_name = "FILE")]
    pub defaults_file: Option<PathBuf>,

    /// Width of one page_id window
    #[arg(long, value_name = "N")]
    pub batch_size: Option<u64>,

    /// Rows fetched from the server per round trip
    #[arg(long, value_name = "N")]
    pub fetch_size: Option<usize>,

    /// Chunks queued between the scan and the consumer pipe
    #[arg(long, value_name = "N")]
    pub channel_capacity: Option<usize>,

    /// First page_id to scan (inclusive)
    #[arg(long, value_name = "ID", default_value_t = 0, allow_negative_numbers = true)]
    pub start_id: i64,

    /// Stop before this page_id; defaults to MAX(page_id) + 1
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    pub end_id: Option<i64>,

    /// Write records to stdout instead of starting the consumer
    #[arg(long)]
    pub dry_run: bool,

    /// Consumer executable, looked up in PATH
    #[arg(long, value_name = "PROGRAM")]
    pub consumer: Option<String>,

    /// Extra argument for the consumer (repeatable)
    #[arg(long = "consumer-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub consumer_args: Vec<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Show a progress bar over the windows
    #[arg(long)]
    pub progress: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for fastcci-stream
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// Invalid effective values fail a run; the `config` subcommand still
    /// loads them so it can report them.
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        if args.command.is_none() {
            config.validate()?;
        }
        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scan options for this run
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            batch_size: self.config.scan.batch_size,
            fetch_size: self.config.scan.fetch_size,
            channel_capacity: self.config.scan.channel_capacity,
            start_id: self.args.start_id,
            end_id: self.args.end_id,
            dry_run: self.args.dry_run,
        }
    }

    /// Whether to draw the progress bar
    ///
    /// Debug output would interleave with the bar, so verbose runs skip it.
    pub fn show_progress(&self) -> bool {
        self.args.progress && !self.args.verbose && !self.args.very_verbose
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_source_args(config, args);
        Self::apply_scan_args(config, args);
        Self::apply_consumer_args(config, args);
        Self::apply_logging_args(config, args);
    }

    fn apply_source_args(config: &mut Config, args: &CliArgs) {
        if let Some(ref host) = args.host {
            config.source.host = host.clone();
        }
        if let Some(port) = args.port {
            config.source.port = Some(port);
        }
        if let Some(ref database) = args.database {
            config.source.database = database.clone();
        }
        if let Some(ref path) = args.defaults_file {
            config.source.defaults_file = path.clone();
        }
    }

    fn apply_scan_args(config: &mut Config, args: &CliArgs) {
        if let Some(batch_size) = args.batch_size {
            config.scan.batch_size = batch_size;
        }
        if let Some(fetch_size) = args.fetch_size {
            config.scan.fetch_size = fetch_size;
        }
        if let Some(capacity) = args.channel_capacity {
            config.scan.channel_capacity = capacity;
        }
    }

    fn apply_consumer_args(config: &mut Config, args: &CliArgs) {
        if let Some(ref program) = args.consumer {
            config.consumer.program = program.clone();
        }
        if !args.consumer_args.is_empty() {
            config.consumer.args = args.consumer_args.clone();
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Config { show, validate }) => {
                if *validate {
                    self.validate_config_file();
                }
                if *show || !*validate {
                    self.show_config()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return;
        }

        match Config::load_from_file(Some(path.as_path())).and_then(|c| c.validate()) {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => println!("Configuration is invalid: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("# Configuration file: {}", self.config_path().display());
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Configuration file path (from args or default)
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .as_deref()
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path)
    }
}
