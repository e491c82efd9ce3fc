//! Per-window query execution
//!
//! One query per window; rows are pulled `fetch_size` at a time, encoded,
//! and handed to the sink before the next chunk is requested, so memory per
//! window stays bounded by the fetch size.

use tracing::debug;

use crate::connection::DataSource;
use crate::error::Result;

use super::encoder::encode_chunk;
use super::planner::Window;
use super::sink::Sink;

/// Stream one window into the sink
///
/// # Returns
/// * `Result<u64>` - Rows streamed for this window
pub async fn execute_window<S>(
    source: &mut S,
    window: Window,
    fetch_size: usize,
    sink: &mut dyn Sink,
) -> Result<u64>
where
    S: DataSource + ?Sized,
{
    let mut cursor = source.open_window(window);
    let mut streamed = 0u64;
    let mut chunks = 0u32;

    loop {
        let rows = cursor.next_chunk(fetch_size).await?;
        if rows.is_empty() {
            break;
        }

        let bytes = encode_chunk(&rows)?;
        sink.write(bytes).await?;

        streamed += rows.len() as u64;
        chunks += 1;
        debug!(
            "Window {}: chunk #{} with {} rows (window total: {})",
            window,
            chunks,
            rows.len(),
            streamed
        );
    }

    Ok(streamed)
}
