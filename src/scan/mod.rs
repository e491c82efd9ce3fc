//! Windowed scan of the category link table
//!
//! A run splits the page_id space into half-open windows, queries them in
//! ascending order and streams every row as one tab-separated line into the
//! consumer's stdin.
//!
//! # Modules
//!
//! - `planner`: range and window arithmetic
//! - `encoder`: row to line encoding
//! - `window`: one window query into a sink
//! - `sink`: consumer pipe and stdout destinations
//! - `supervisor`: consumer process lifecycle
//! - `progress`: running totals and the optional progress bar
//! - `orchestrator`: the run itself

pub mod encoder;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod sink;
pub mod supervisor;
pub mod window;

pub use encoder::{LinkRow, encode_chunk, encode_row};
pub use orchestrator::{Orchestrator, ScanOptions, ScanReport};
pub use planner::{ScanRange, Window, Windows, plan_windows};
pub use progress::{ProgressTracker, RunningTotals};
pub use sink::{DiagnosticSink, PipeSink, Sink, WriterSink};
pub use supervisor::{ChildState, ChildSupervisor};
pub use window::execute_window;
