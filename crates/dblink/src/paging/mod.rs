//! Paged views over query results.
//!
//! Two models are offered:
//!
//! - [`Scroller`]: a fixed-width window over a scrollable cursor, moved one
//!   window at a time. Wrap it in [`CachedScroller`] to serve repeated
//!   windows from memory.
//! - [`Pager`]: numbered pages of a configurable size over a result whose
//!   total row count is known up front.

mod cache;
mod pager;
mod scroller;

pub use cache::{CacheStats, CachedScroller, PageCache, PageKey};
pub use pager::Pager;
pub use scroller::{PageSource, Scroller};

use crate::core::value::Row;

/// A window of rows starting at a 0-based row position.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Row position of the first row.
    pub start: i64,
    /// The rows, in result order.
    pub rows: Vec<Row>,
}

impl Page {
    pub fn new(start: i64, rows: Vec<Row>) -> Self {
        Self { start, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Whether rows exist beyond the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasMore {
    /// The total row count has not been established yet.
    Unknown,
    HasMore,
    NoMore,
}
