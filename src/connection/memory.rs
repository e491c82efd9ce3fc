//! In-memory data source for tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Result, StreamError};
use crate::scan::{LinkRow, Window};

use super::{Connector, DataSource, RowCursor};

/// Rows behind a fake connection, plus call counters
#[derive(Clone, Default)]
pub struct MemoryConnector {
    rows: Arc<Vec<LinkRow>>,
    pub connects: Arc<AtomicUsize>,
    pub max_queries: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    /// Fail the chunk request that would return rows at or above this key
    pub fail_at_key: Option<u64>,
}

impl MemoryConnector {
    pub fn new(rows: Vec<LinkRow>) -> Self {
        Self {
            rows: Arc::new(rows),
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, key: u64) -> Self {
        self.fail_at_key = Some(key);
        self
    }

    /// Rows of the unwindowed query: filter nothing, order by key
    pub fn sorted_rows(&self) -> Vec<LinkRow> {
        let mut rows = self.rows.as_ref().clone();
        rows.sort_by_key(|r| r.target_id);
        rows
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Source = MemorySource;

    async fn connect(&self) -> Result<MemorySource> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySource {
            connector: self.clone(),
        })
    }
}

pub struct MemorySource {
    connector: MemoryConnector,
}

#[async_trait]
impl DataSource for MemorySource {
    async fn max_partition_key(&mut self) -> Result<Option<u64>> {
        self.connector.max_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.connector.rows.iter().map(|r| r.target_id).max())
    }

    fn open_window<'a>(&'a mut self, window: Window) -> Box<dyn RowCursor + 'a> {
        // Stable sort keeps insertion order among equal keys.
        let mut rows: Vec<LinkRow> = self
            .connector
            .rows
            .iter()
            .filter(|r| r.target_id >= window.lo && r.target_id < window.hi)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.target_id);

        Box::new(MemoryCursor {
            rows: rows.into_iter(),
            fail_at_key: self.connector.fail_at_key,
        })
    }

    async fn close(self) -> Result<()> {
        self.connector.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryCursor {
    rows: std::vec::IntoIter<LinkRow>,
    fail_at_key: Option<u64>,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<LinkRow>> {
        let chunk: Vec<LinkRow> = self.rows.by_ref().take(max_rows).collect();
        if let Some(key) = self.fail_at_key {
            if chunk.iter().any(|r| r.target_id >= key) {
                return Err(StreamError::DataSource(sqlx::Error::Protocol(
                    "connection reset".into(),
                )));
            }
        }
        Ok(chunk)
    }
}
