//! fastcci-stream
//!
//! Streams category links from the wiki replica into `fastcci_build_db`.
//!
//! # Usage
//!
//! ```bash
//! # Full run, consumer reads the stream on stdin
//! fastcci-stream
//!
//! # Inspect a slice of the stream without building anything
//! fastcci-stream --dry-run --start-id 0 --end-id 250000
//! ```
//!
//! Exit status is 0 on success, the consumer's own status when it fails,
//! and 1 for everything else.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use fastcci_stream::cli::CliInterface;
use fastcci_stream::connection::MySqlConnector;
use fastcci_stream::error::Result;
use fastcci_stream::scan::{Orchestrator, ProgressTracker};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the stream
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));

    let orchestrator = Orchestrator::new(
        cli.scan_options(),
        cli.config().consumer.clone(),
        ProgressTracker::new(cli.show_progress()),
        cancel,
    );
    let connector = MySqlConnector::new(cli.config().source.clone());

    let result = orchestrator.run(&connector).await;
    signals.abort();
    result.map(|_| ())
}

/// Cancel the run on Ctrl+C, or SIGTERM on unix
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                return wait_for_ctrl_c(cancel).await;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("Interrupted"),
            _ = term.recv() => warn!("Terminated"),
        }
        cancel.cancel();
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c(cancel).await;
}

async fn wait_for_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted");
            cancel.cancel();
        }
        Err(err) => {
            warn!("Failed to listen for Ctrl+C: {}", err);
        }
    }
}

/// Initialize logging on stderr
///
/// stdout is reserved for records in dry-run mode. `RUST_LOG` directives
/// refine the configured level per target.
fn initialize_logging(cli: &CliInterface) {
    let directives = std::env::var("RUST_LOG").ok();
    let filter = cli.config().logging.env_filter(directives.as_deref());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
