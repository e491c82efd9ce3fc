//! Byte-stream destinations for encoded records
//!
//! A [`Sink`] takes encoded chunks and a single end-of-input signal. Two
//! implementations exist:
//!
//! - [`PipeSink`] feeds the consumer's stdin through a bounded channel and a
//!   pump task. The channel capacity is the only buffering between the scan
//!   and the pipe, so a slow consumer stalls `write` once it is full.
//! - [`WriterSink`] writes straight to any async writer. Dry runs use it on
//!   stdout.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ConsumerError, Result, ScanError};

/// Destination for encoded record chunks
#[async_trait]
pub trait Sink: Send {
    /// Hand off one chunk
    ///
    /// Returns once the chunk has been flushed or queued for the pump; may
    /// block while the receiving side is behind.
    async fn write(&mut self, chunk: Vec<u8>) -> Result<()>;

    /// Signal that no more input is coming
    ///
    /// Idempotent. Writing after finalize fails.
    async fn finalize(&mut self) -> Result<()>;
}

/// Sink over a plain async writer, flushed after every chunk
pub struct WriterSink<W> {
    writer: W,
    bytes_written: u64,
    finalized: bool,
}

/// Dry-run sink on stdout
pub type DiagnosticSink = WriterSink<tokio::io::Stdout>;

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            finalized: false,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl DiagnosticSink {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, chunk: Vec<u8>) -> Result<()> {
        if self.finalized {
            return Err(ScanError::SinkFinalized.into());
        }
        self.writer.write_all(&chunk).await?;
        self.writer.flush().await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        self.writer.flush().await?;
        debug!("Finalized writer sink after {} bytes", self.bytes_written);
        Ok(())
    }
}

/// Sink that pumps chunks into a pipe from a separate task
///
/// Dropping the sender and letting the pump finish closes the writer, which
/// is how the consumer learns its input is complete.
pub struct PipeSink {
    tx: Option<mpsc::Sender<Vec<u8>>>,
    pump: Option<JoinHandle<std::io::Result<u64>>>,
}

impl PipeSink {
    /// Start the pump task over `writer`
    ///
    /// # Arguments
    /// * `writer` - Pipe to feed, usually the consumer's stdin
    /// * `capacity` - Chunks that may wait in the channel (at least 1)
    pub fn new<W>(writer: W, capacity: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pump = tokio::spawn(pump(rx, writer));
        Self {
            tx: Some(tx),
            pump: Some(pump),
        }
    }

    /// Collect the pump's result once it has stopped
    async fn join_pump(&mut self) -> Result<u64> {
        let Some(handle) = self.pump.take() else {
            return Ok(0);
        };
        match handle.await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(ConsumerError::InputClosed(e.to_string()).into()),
            Err(e) => Err(ConsumerError::InputClosed(format!("pump task failed: {e}")).into()),
        }
    }
}

async fn pump<W>(mut rx: mpsc::Receiver<Vec<u8>>, mut writer: W) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = rx.recv().await {
        writer.write_all(&chunk).await?;
        writer.flush().await?;
        written += chunk.len() as u64;
    }
    writer.shutdown().await?;
    Ok(written)
}

#[async_trait]
impl Sink for PipeSink {
    async fn write(&mut self, chunk: Vec<u8>) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ScanError::SinkFinalized.into());
        };
        if tx.send(chunk).await.is_err() {
            // The pump only drops the receiver when a pipe write failed.
            self.tx = None;
            return match self.join_pump().await {
                Err(e) => Err(e),
                Ok(_) => Err(ConsumerError::InputClosed("pump stopped early".into()).into()),
            };
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.tx.take().is_none() && self.pump.is_none() {
            return Ok(());
        }
        let bytes = self.join_pump().await?;
        debug!("Closed consumer input after {} bytes", bytes);
        Ok(())
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!("PipeSink dropped without finalize");
        }
    }
}
