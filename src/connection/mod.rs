//! Data source access
//!
//! The scan talks to its data source through two small capabilities:
//!
//! - [`DataSource`]: the exclusively owned connection for one run. It answers
//!   the `MAX(page_id)` question and opens one cursor per window.
//! - [`RowCursor`]: a server-side cursor that hands out bounded chunks and
//!   returns an empty chunk once exhausted.
//!
//! [`Connector`] defers opening the connection until the consumer is
//! running, so a missing consumer never touches the database.

pub mod mysql;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::scan::{LinkRow, Window};

pub use mysql::{MySqlConnector, MySqlSource};

/// Opens the data source for a run
#[async_trait]
pub trait Connector: Send + Sync {
    type Source: DataSource;

    async fn connect(&self) -> Result<Self::Source>;
}

/// One exclusively owned data source connection
#[async_trait]
pub trait DataSource: Send {
    /// Largest partition key in the table, `None` when the table is empty
    async fn max_partition_key(&mut self) -> Result<Option<u64>>;

    /// Open a cursor over all rows whose partition key lies in `window`
    ///
    /// Rows come back in ascending partition key order. The query runs
    /// lazily on the first chunk request.
    fn open_window<'a>(&'a mut self, window: Window) -> Box<dyn RowCursor + 'a>;

    /// Release the connection
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Bounded-chunk pull over one window's result set
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch up to `max_rows` rows; an empty vector means exhausted
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<LinkRow>>;
}
