//! fastcci-stream library
//!
//! Streams the category graph of a MediaWiki replica into the fastcci
//! database builder. The `categorylinks` table is scanned in ascending,
//! non-overlapping `page_id` windows over a single connection, and every
//! link is written as `from<TAB>to<TAB>type` into the builder's stdin.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration and credentials file handling
//! - `connection`: Data source traits and the MySQL implementation
//! - `error`: Error types and exit status mapping
//! - `scan`: Window planning, encoding, consumer pipe and run orchestration
//!
//! # Example
//!
//! ```no_run
//! use fastcci_stream::config::Config;
//! use fastcci_stream::connection::MySqlConnector;
//! use fastcci_stream::scan::{Orchestrator, ProgressTracker, ScanOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let options = ScanOptions {
//!         dry_run: true,
//!         end_id: Some(1_000),
//!         ..ScanOptions::default()
//!     };
//!     let orchestrator = Orchestrator::new(
//!         options,
//!         config.consumer.clone(),
//!         ProgressTracker::new(false),
//!         CancellationToken::new(),
//!     );
//!
//!     let report = orchestrator.run(&MySqlConnector::new(config.source)).await?;
//!     eprintln!("{} rows", report.totals.rows_streamed);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod scan;

// Re-export commonly used types
pub use config::Config;
pub use connection::{Connector, DataSource, MySqlConnector};
pub use error::{Result, StreamError};
pub use scan::{Orchestrator, ScanOptions, ScanReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
