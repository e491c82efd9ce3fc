//! Run orchestration
//!
//! Ties the pieces together for one run:
//!
//! 1. Start the consumer (or pick the stdout sink in a dry run)
//! 2. Connect and resolve the page_id range
//! 3. Stream every window in order
//! 4. Close the consumer's input and wait for it
//!
//! The whole sequence races the cancellation token. When the token fires
//! the in-flight work is dropped where it stands and the consumer is killed.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConsumerConfig;
use crate::connection::{Connector, DataSource};
use crate::error::{ConsumerError, Result, StreamError};

use super::planner::{ScanRange, plan_windows};
use super::progress::{ProgressTracker, RunningTotals};
use super::sink::{DiagnosticSink, PipeSink, Sink};
use super::supervisor::{ChildState, ChildSupervisor};
use super::window::execute_window;

/// Per-run scan settings
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Width of one page_id window
    pub batch_size: u64,
    /// Rows per fetch
    pub fetch_size: usize,
    /// Chunks queued between the scan and the consumer pipe
    pub channel_capacity: usize,
    /// Inclusive lower bound; negative values clamp to 0
    pub start_id: i64,
    /// Exclusive upper bound; `None` means `MAX(page_id) + 1`
    pub end_id: Option<i64>,
    /// Write records to stdout instead of a consumer
    pub dry_run: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 100_000,
            fetch_size: 10_000,
            channel_capacity: 4,
            start_id: 0,
            end_id: None,
            dry_run: false,
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Range that was scanned
    pub range: ScanRange,
    /// Final counters
    pub totals: RunningTotals,
    /// Consumer exit code, `None` in a dry run
    pub consumer_exit: Option<i32>,
    /// Wall time of the run
    pub elapsed_ms: u64,
}

/// Drives one streaming run
pub struct Orchestrator {
    options: ScanOptions,
    consumer: ConsumerConfig,
    tracker: ProgressTracker,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        options: ScanOptions,
        consumer: ConsumerConfig,
        tracker: ProgressTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            options,
            consumer,
            tracker,
            cancel,
        }
    }

    /// Counters so far; valid after a failed run too
    pub fn totals(&self) -> RunningTotals {
        self.tracker.totals()
    }

    /// Run against the configured consumer, or stdout in a dry run
    ///
    /// The consumer is started before the data source is opened, so a
    /// missing executable fails without touching the database.
    pub async fn run<C: Connector>(&self, connector: &C) -> Result<ScanReport> {
        self.check_options()?;

        if self.options.dry_run {
            info!(
                "Dry run: writing records to stdout, {} is not started",
                self.consumer.program
            );
            let mut sink = DiagnosticSink::stdout();
            return self.execute(connector, &mut sink, None).await;
        }

        let mut supervisor = ChildSupervisor::new(&self.consumer);
        let stdin = supervisor.spawn()?;
        let mut sink = PipeSink::new(stdin, self.options.channel_capacity);
        self.execute(connector, &mut sink, Some(&mut supervisor))
            .await
    }

    /// Run into a caller-provided sink with no consumer process
    pub async fn run_with_sink<C: Connector>(
        &self,
        connector: &C,
        sink: &mut dyn Sink,
    ) -> Result<ScanReport> {
        self.check_options()?;
        self.execute(connector, sink, None).await
    }

    fn check_options(&self) -> Result<()> {
        if self.options.batch_size == 0 {
            return Err(StreamError::invalid_value("batch_size", 0));
        }
        if self.options.fetch_size == 0 {
            return Err(StreamError::invalid_value("fetch_size", 0));
        }
        Ok(())
    }

    async fn execute<C: Connector>(
        &self,
        connector: &C,
        sink: &mut dyn Sink,
        mut supervisor: Option<&mut ChildSupervisor>,
    ) -> Result<ScanReport> {
        let started = Instant::now();

        let outcome = {
            let drive = self.drive(connector, sink, supervisor.as_deref_mut());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                res = drive => Some(res),
            }
        };

        match outcome {
            None => {
                self.tracker.finish();
                warn!(
                    "Interrupted after {} rows; aborting",
                    self.tracker.totals().rows_streamed
                );
                if let Some(sup) = supervisor {
                    stop_consumer(sup).await;
                }
                Err(StreamError::Cancelled)
            }
            Some(Err(e)) => {
                self.tracker.finish();
                if let Some(sup) = supervisor {
                    stop_consumer(sup).await;
                }
                Err(e)
            }
            Some(Ok((range, consumer_exit))) => {
                let totals = self.tracker.totals();
                if let Some(code) = consumer_exit.filter(|code| *code != 0) {
                    error!(
                        "{} exited with {} after all {} rows were sent",
                        self.consumer.program, code, totals.rows_streamed
                    );
                    return Err(ConsumerError::Exited {
                        code,
                        rows_streamed: totals.rows_streamed,
                    }
                    .into());
                }

                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Done. {} rows in {} batches, {} ms",
                    totals.rows_streamed, totals.batches_completed, elapsed_ms
                );
                Ok(ScanReport {
                    range,
                    totals,
                    consumer_exit,
                    elapsed_ms,
                })
            }
        }
    }

    /// Connect, scan, release the connection, then close out the consumer
    async fn drive<C: Connector>(
        &self,
        connector: &C,
        sink: &mut dyn Sink,
        supervisor: Option<&mut ChildSupervisor>,
    ) -> Result<(ScanRange, Option<i32>)> {
        let mut source = connector.connect().await?;
        let scanned = self.scan(&mut source, sink).await;

        // Released on both paths
        if let Err(e) = source.close().await {
            warn!("Failed to close data source connection: {}", e);
        }
        let range = scanned?;

        sink.finalize().await?;
        let consumer_exit = match supervisor {
            Some(sup) => Some(sup.wait().await?),
            None => None,
        };
        Ok((range, consumer_exit))
    }

    async fn scan<S: DataSource>(&self, source: &mut S, sink: &mut dyn Sink) -> Result<ScanRange> {
        let range = self.resolve_range(source).await?;
        let windows = plan_windows(range, self.options.batch_size)?;

        if range.is_empty() {
            info!("Nothing to do: end <= start {}", range);
            return Ok(range);
        }

        let total = windows.remaining();
        info!(
            "Streaming page_id in {} in {} batches (size={}), fetch_size={}",
            range, total, self.options.batch_size, self.options.fetch_size
        );
        self.tracker.start(total);

        for (i, window) in windows.enumerate() {
            let index = i as u64 + 1;
            self.tracker
                .log(&format!("[{index}/{total}] batch: {window}"));

            let sent = match execute_window(source, window, self.options.fetch_size, sink).await {
                Ok(sent) => sent,
                Err(e) => {
                    self.tracker.finish();
                    let done = self.tracker.totals();
                    error!(
                        "[{index}/{total}] batch {} failed after {} rows from {} earlier batches: {}",
                        window, done.rows_streamed, done.batches_completed, e
                    );
                    error!(
                        "Resume with --start-id {} --end-id {}",
                        window.lo, range.end_exclusive
                    );
                    return Err(e);
                }
            };

            let totals = self.tracker.window_done(sent);
            self.tracker.log(&format!(
                "[{index}/{total}] rows streamed: {sent} (cumulative {})",
                totals.rows_streamed
            ));
        }

        self.tracker.finish();
        Ok(range)
    }

    /// Explicit end wins; otherwise ask the source for its maximum key
    async fn resolve_range<S: DataSource>(&self, source: &mut S) -> Result<ScanRange> {
        let start = self.options.start_id.max(0) as u64;
        let end_exclusive = match self.options.end_id {
            Some(end) => end.max(0) as u64,
            None => source
                .max_partition_key()
                .await?
                .unwrap_or(0)
                .saturating_add(1),
        };
        Ok(ScanRange::new(start, end_exclusive))
    }
}

/// Kill the consumer if it still runs and reap it
///
/// # Returns
/// * `Option<i32>` - Exit code, or `None` when reaping failed
async fn stop_consumer(sup: &mut ChildSupervisor) -> Option<i32> {
    if sup.state() == ChildState::Running {
        sup.terminate();
    }
    match sup.wait().await {
        Ok(code) => {
            warn!("{} stopped with {}", sup.program(), code);
            Some(code)
        }
        Err(e) => {
            warn!("Failed to reap {}: {}", sup.program(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::MemoryConnector;
    use crate::scan::encoder::encode_chunk;
    use crate::scan::LinkRow;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Sink that keeps everything and counts finalize calls
    #[derive(Default)]
    struct RecordingSink {
        data: Vec<u8>,
        writes: usize,
        finalized: usize,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn write(&mut self, chunk: Vec<u8>) -> Result<()> {
            self.data.extend_from_slice(&chunk);
            self.writes += 1;
            Ok(())
        }

        async fn finalize(&mut self) -> Result<()> {
            self.finalized += 1;
            Ok(())
        }
    }

    impl RecordingSink {
        fn target_ids(&self) -> Vec<u64> {
            String::from_utf8(self.data.clone())
                .unwrap()
                .lines()
                .map(|l| l.split('\t').nth(1).unwrap().parse().unwrap())
                .collect()
        }
    }

    fn orchestrator(options: ScanOptions) -> Orchestrator {
        orchestrator_with(options, ConsumerConfig::default(), CancellationToken::new())
    }

    fn orchestrator_with(
        options: ScanOptions,
        consumer: ConsumerConfig,
        cancel: CancellationToken,
    ) -> Orchestrator {
        Orchestrator::new(options, consumer, ProgressTracker::new(false), cancel)
    }

    fn shell(script: &str) -> ConsumerConfig {
        ConsumerConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    fn scenario_rows() -> Vec<LinkRow> {
        vec![
            LinkRow::new(100, 1_000_000, "subcat"),
            LinkRow::new(101, 5, "subcat"),
            LinkRow::new(102, 7, "file"),
            LinkRow::new(103, 5, "file"),
        ]
    }

    /// Deterministic spread of rows over [0, 500)
    fn many_rows() -> Vec<LinkRow> {
        (0..400u64)
            .map(|i| {
                let kind = if i % 3 == 0 { "subcat" } else { "file" };
                LinkRow::new(i, (i * 37) % 500, kind)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_derived_end_streams_all_rows_in_order() {
        let connector = MemoryConnector::new(scenario_rows());
        let orch = orchestrator(ScanOptions {
            batch_size: 1_000_000,
            ..ScanOptions::default()
        });
        let mut sink = RecordingSink::default();

        let report = orch.run_with_sink(&connector, &mut sink).await.unwrap();

        assert_eq!(report.range, ScanRange::new(0, 1_000_001));
        assert_eq!(sink.target_ids(), vec![5, 5, 7, 1_000_000]);
        assert_eq!(report.totals.rows_streamed, 4);
        assert_eq!(report.totals.batches_total, 2);
        assert_eq!(report.consumer_exit, None);
        assert_eq!(sink.finalized, 1);
        assert_eq!(connector.max_queries.load(Ordering::SeqCst), 1);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_end_skips_max_query() {
        let connector = MemoryConnector::new(scenario_rows());
        let orch = orchestrator(ScanOptions {
            batch_size: 100_000,
            end_id: Some(250_000),
            ..ScanOptions::default()
        });
        let mut sink = RecordingSink::default();

        let report = orch.run_with_sink(&connector, &mut sink).await.unwrap();

        assert_eq!(report.range, ScanRange::new(0, 250_000));
        assert_eq!(report.totals.batches_total, 3);
        assert_eq!(report.totals.batches_completed, 3);
        assert_eq!(sink.target_ids(), vec![5, 5, 7]);
        assert_eq!(connector.max_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_row_count_matches_unwindowed_query() {
        let connector = MemoryConnector::new(many_rows());
        let orch = orchestrator(ScanOptions {
            batch_size: 7,
            fetch_size: 3,
            ..ScanOptions::default()
        });
        let mut sink = RecordingSink::default();

        let report = orch.run_with_sink(&connector, &mut sink).await.unwrap();

        let expected = connector.sorted_rows();
        assert_eq!(report.totals.rows_streamed, expected.len() as u64);
        assert_eq!(sink.data, encode_chunk(&expected).unwrap());

        let ids = sink.target_ids();
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_start_clamps_and_limits_range() {
        let connector = MemoryConnector::new(many_rows());
        let orch = orchestrator(ScanOptions {
            batch_size: 50,
            start_id: -20,
            end_id: Some(100),
            ..ScanOptions::default()
        });
        let mut sink = RecordingSink::default();

        let report = orch.run_with_sink(&connector, &mut sink).await.unwrap();

        assert_eq!(report.range, ScanRange::new(0, 100));
        assert!(sink.target_ids().iter().all(|&id| id < 100));
    }

    #[tokio::test]
    async fn test_empty_range_still_finalizes() {
        let connector = MemoryConnector::new(scenario_rows());
        let orch = orchestrator(ScanOptions {
            start_id: 10,
            end_id: Some(5),
            ..ScanOptions::default()
        });
        let mut sink = RecordingSink::default();

        let report = orch.run_with_sink(&connector, &mut sink).await.unwrap();

        assert!(report.range.is_empty());
        assert_eq!(report.totals, RunningTotals::default());
        assert_eq!(sink.writes, 0);
        assert_eq!(sink.finalized, 1);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_table_scans_single_key() {
        let connector = MemoryConnector::new(Vec::new());
        let orch = orchestrator(ScanOptions::default());
        let mut sink = RecordingSink::default();

        let report = orch.run_with_sink(&connector, &mut sink).await.unwrap();

        assert_eq!(report.range, ScanRange::new(0, 1));
        assert_eq!(report.totals.batches_completed, 1);
        assert_eq!(report.totals.rows_streamed, 0);
    }

    #[tokio::test]
    async fn test_source_error_aborts_and_releases_connection() {
        let connector = MemoryConnector::new(many_rows()).failing_at(300);
        let orch = orchestrator(ScanOptions {
            batch_size: 100,
            fetch_size: 10,
            ..ScanOptions::default()
        });
        let mut sink = RecordingSink::default();

        let err = orch.run_with_sink(&connector, &mut sink).await.unwrap_err();

        assert!(matches!(err, StreamError::DataSource(_)));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.finalized, 0);
        assert_eq!(orch.totals().batches_completed, 3);
    }

    #[tokio::test]
    async fn test_zero_sizes_rejected_before_connecting() {
        let connector = MemoryConnector::new(scenario_rows());
        let mut sink = RecordingSink::default();

        let orch = orchestrator(ScanOptions {
            batch_size: 0,
            ..ScanOptions::default()
        });
        assert!(orch.run_with_sink(&connector, &mut sink).await.is_err());

        let orch = orchestrator(ScanOptions {
            fetch_size: 0,
            ..ScanOptions::default()
        });
        assert!(orch.run(&connector).await.is_err());

        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let connector = MemoryConnector::new(scenario_rows());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orch = orchestrator_with(ScanOptions::default(), ConsumerConfig::default(), cancel);
        let mut sink = RecordingSink::default();

        let err = orch.run_with_sink(&connector, &mut sink).await.unwrap_err();

        assert!(matches!(err, StreamError::Cancelled));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(sink.finalized, 0);
    }

    #[tokio::test]
    async fn test_missing_consumer_never_connects() {
        let connector = MemoryConnector::new(scenario_rows());
        let orch = orchestrator_with(
            ScanOptions::default(),
            ConsumerConfig {
                program: "fastcci-stream-no-such-consumer".into(),
                args: Vec::new(),
            },
            CancellationToken::new(),
        );

        let err = orch.run(&connector).await.unwrap_err();

        assert!(matches!(err, StreamError::Consumer(ConsumerError::NotFound(_))));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_consumer_receives_stream_and_exits_cleanly() {
        let connector = MemoryConnector::new(scenario_rows());
        // Fails unless exactly the expected bytes arrive.
        let consumer = shell(
            "test \"$(cat)\" = \"$(printf '101\\t5\\tsubcat\\n103\\t5\\tfile\\n102\\t7\\tfile\\n100\\t1000000\\tsubcat')\"",
        );
        let orch = orchestrator_with(
            ScanOptions {
                batch_size: 1_000_000,
                ..ScanOptions::default()
            },
            consumer,
            CancellationToken::new(),
        );

        let report = orch.run(&connector).await.unwrap();

        assert_eq!(report.consumer_exit, Some(0));
        assert_eq!(report.totals.rows_streamed, 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_consumer_exit_code_is_propagated() {
        let connector = MemoryConnector::new(scenario_rows());
        let orch = orchestrator_with(
            ScanOptions::default(),
            shell("cat > /dev/null; exit 3"),
            CancellationToken::new(),
        );

        let err = orch.run(&connector).await.unwrap_err();

        assert!(matches!(
            err,
            StreamError::Consumer(ConsumerError::Exited {
                code: 3,
                rows_streamed: 4
            })
        ));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(orch.totals().rows_streamed, 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_range_waits_for_consumer() {
        let connector = MemoryConnector::new(scenario_rows());
        let orch = orchestrator_with(
            ScanOptions {
                start_id: 10,
                end_id: Some(10),
                ..ScanOptions::default()
            },
            shell("test \"$(wc -c)\" -eq 0"),
            CancellationToken::new(),
        );

        let report = orch.run(&connector).await.unwrap();

        assert_eq!(report.consumer_exit, Some(0));
        assert_eq!(report.totals.batches_total, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_consumer_kills_and_reaps() {
        let mut sup = ChildSupervisor::new(&shell("sleep 30"));
        let _stdin = sup.spawn().unwrap();

        let code = tokio::time::timeout(Duration::from_secs(10), stop_consumer(&mut sup))
            .await
            .expect("a killed consumer should be reaped promptly");

        assert_eq!(code, Some(137));
        assert_eq!(sup.state(), ChildState::Exited(137));
        // Already reaped: stopping again reports the recorded code.
        assert_eq!(stop_consumer(&mut sup).await, Some(137));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_consumer_reports_early_exit() {
        let mut sup = ChildSupervisor::new(&shell("exit 4"));
        let stdin = sup.spawn().unwrap();
        drop(stdin);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(stop_consumer(&mut sup).await, Some(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_while_consumer_stalls() {
        // The consumer never reads, so the pipe fills and the scan blocks.
        let rows: Vec<LinkRow> = (0..20_000u64)
            .map(|i| LinkRow::new(i, i, "subcat"))
            .collect();
        let connector = MemoryConnector::new(rows);
        let cancel = CancellationToken::new();
        let orch = orchestrator_with(
            ScanOptions {
                batch_size: 1_000,
                fetch_size: 100,
                channel_capacity: 1,
                ..ScanOptions::default()
            },
            shell("sleep 30"),
            cancel.clone(),
        );

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(10), orch.run(&connector))
            .await
            .expect("cancellation should end the run promptly")
            .unwrap_err();
        trigger.await.unwrap();

        assert!(matches!(err, StreamError::Cancelled));
        assert!(orch.totals().rows_streamed < 20_000);
    }
}
