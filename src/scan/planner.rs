//! Range planning
//!
//! Splits the half-open page_id interval `[start, end_exclusive)` into
//! contiguous windows of at most `batch_size` keys, one query each.

use std::fmt;

use crate::error::{Result, StreamError};

/// Half-open key interval covered by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub start: u64,
    pub end_exclusive: u64,
}

/// Half-open key interval covered by one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: u64,
    pub hi: u64,
}

impl ScanRange {
    pub fn new(start: u64, end_exclusive: u64) -> Self {
        Self {
            start,
            end_exclusive,
        }
    }

    /// Whether the range holds no keys
    pub fn is_empty(&self) -> bool {
        self.end_exclusive <= self.start
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end_exclusive)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}

/// Lazy window sequence over a [`ScanRange`]
///
/// Cloning yields an independent iterator from the same position, so a
/// plan can be walked again from the start.
#[derive(Debug, Clone)]
pub struct Windows {
    next_lo: u64,
    end_exclusive: u64,
    batch_size: u64,
}

/// Plan the windows for a range
///
/// An empty range yields no windows. A zero `batch_size` is rejected here,
/// before any window is produced.
pub fn plan_windows(range: ScanRange, batch_size: u64) -> Result<Windows> {
    if batch_size == 0 {
        return Err(StreamError::invalid_value("batch_size", batch_size));
    }
    Ok(Windows {
        next_lo: range.start,
        end_exclusive: range.end_exclusive,
        batch_size,
    })
}

impl Windows {
    /// Number of windows not yet yielded
    pub fn remaining(&self) -> u64 {
        let span = self.end_exclusive.saturating_sub(self.next_lo);
        span.div_ceil(self.batch_size)
    }
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next_lo >= self.end_exclusive {
            return None;
        }
        let lo = self.next_lo;
        let hi = lo.saturating_add(self.batch_size).min(self.end_exclusive);
        self.next_lo = hi;
        Some(Window { lo, hi })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl std::iter::FusedIterator for Windows {}
