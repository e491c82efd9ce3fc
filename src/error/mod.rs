//! Error handling module for the streaming pipeline.
//!
//! All fallible operations return [`Result`], whose error type
//! [`StreamError`] groups the failure kinds an operator needs to tell apart:
//! a missing or failing consumer, a data source failure, a bad
//! configuration, or cancellation.
//!
//! # Example
//!
//! ```rust
//! use fastcci_stream::error::{ConsumerError, StreamError};
//!
//! let err = StreamError::from(ConsumerError::Exited { code: 3, rows_streamed: 4 });
//! assert_eq!(err.exit_code(), 3);
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, ConsumerError, Result, ScanError, StreamError};
