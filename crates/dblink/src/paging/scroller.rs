//! Cursor window scroller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::schema::ColumnMeta;
use crate::core::traits::Cursor;
use crate::error::{DbError, Result};

use super::{HasMore, Page};

/// A source of fixed-width pages addressed by start row.
///
/// `current`, `next` and `previous` move the window by exactly one page
/// width and are written in terms of the other methods, so a decorator
/// only needs to intercept [`materialize`](PageSource::materialize).
#[async_trait]
pub trait PageSource: Send {
    /// Rows per page.
    fn page_width(&self) -> usize;

    /// Start row (0-based) of the current window.
    fn position(&self) -> i64;

    /// Move the window without reading.
    fn set_position(&mut self, row: i64);

    /// Whether negative start rows are accepted.
    fn allows_negative(&self) -> bool;

    /// Whether rows exist past the current window.
    fn has_more(&self) -> HasMore;

    /// Read `count` rows starting at row `from` and make it the current window.
    async fn materialize(&mut self, from: i64, count: usize) -> Result<Arc<Page>>;

    /// The page at the current position.
    async fn current(&mut self) -> Result<Arc<Page>> {
        let (from, width) = (self.position(), self.page_width());
        self.materialize(from, width).await
    }

    /// Advance one page. `None` when there is nothing further.
    async fn next(&mut self) -> Result<Option<Arc<Page>>> {
        if self.has_more() == HasMore::NoMore {
            return Ok(None);
        }
        let previous = self.position();
        let width = self.page_width();
        let page = self.materialize(previous + width as i64, width).await?;
        if page.is_empty() {
            self.set_position(previous);
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Step back one page. `None` at the start unless negative rows are allowed.
    async fn previous(&mut self) -> Result<Option<Arc<Page>>> {
        let width = self.page_width();
        let from = self.position() - width as i64;
        if from < 0 && !self.allows_negative() {
            return Ok(None);
        }
        self.materialize(from, width).await.map(Some)
    }
}

/// Windows a scrollable cursor into pages.
///
/// The total row count becomes known when a page comes back short or empty;
/// until then [`has_more`](PageSource::has_more) reports `Unknown`.
pub struct Scroller {
    cursor: Box<dyn Cursor>,
    width: usize,
    position: i64,
    allow_negative: bool,
    total: Option<i64>,
}

impl Scroller {
    /// Wrap a scrollable cursor. Forward-only cursors are rejected.
    pub fn new(cursor: Box<dyn Cursor>, width: usize, allow_negative: bool) -> Result<Self> {
        if !cursor.kind().is_scrollable() {
            return Err(DbError::Driver(
                "a cursor window needs a scrollable cursor, got forward-only".into(),
            ));
        }
        Ok(Self {
            cursor,
            width: width.max(1),
            position: 0,
            allow_negative,
            total: None,
        })
    }

    /// Result column shape.
    pub fn columns(&self) -> &[ColumnMeta] {
        self.cursor.columns()
    }

    /// Total row count, once established.
    pub fn total(&self) -> Option<i64> {
        self.total
    }

    /// Establish the total row count by seeking to the last row.
    pub async fn establish_total(&mut self) -> Result<i64> {
        let total = self.cursor.last().await?;
        self.total = Some(total);
        Ok(total)
    }

    /// Release the cursor.
    pub async fn close(mut self) -> Result<()> {
        self.cursor.close().await
    }
}

#[async_trait]
impl PageSource for Scroller {
    fn page_width(&self) -> usize {
        self.width
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn set_position(&mut self, row: i64) {
        self.position = row;
    }

    fn allows_negative(&self) -> bool {
        self.allow_negative
    }

    fn has_more(&self) -> HasMore {
        match self.total {
            None => HasMore::Unknown,
            Some(total) if self.position + (self.width as i64) < total => HasMore::HasMore,
            Some(_) => HasMore::NoMore,
        }
    }

    async fn materialize(&mut self, from: i64, count: usize) -> Result<Arc<Page>> {
        if from < 0 && !self.allow_negative {
            return Err(DbError::range(
                "row",
                from,
                self.total.map_or(i64::MAX, |t| (t - 1).max(0)),
            ));
        }

        // Row `from` (0-based) is cursor row `from + 1`; park just before it.
        self.cursor.absolute(from).await?;
        let rows = self.cursor.fetch(count).await?;

        if from >= 0 && self.total.is_none() {
            if !rows.is_empty() && rows.len() < count {
                self.total = Some(from + rows.len() as i64);
            } else if rows.is_empty() {
                let total = self.cursor.last().await?;
                debug!("Empty page at row {}; result has {} rows", from, total);
                self.total = Some(total);
            }
        }

        self.position = from;
        Ok(Arc::new(Page::new(from, rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::CursorKind;
    use crate::testing::{numbered_rows, VecCursor};

    fn scroller(rows: i64, width: usize) -> Scroller {
        let cursor = VecCursor::new(numbered_rows(rows), CursorKind::ScrollInsensitive);
        Scroller::new(Box::new(cursor), width, false).unwrap()
    }

    #[tokio::test]
    async fn test_materialize_reads_exact_window() {
        let mut s = scroller(10, 4);
        let page = s.materialize(2, 3).await.unwrap();
        assert_eq!(page.start, 2);
        assert_eq!(page.rows, numbered_rows(5)[2..].to_vec());
        assert_eq!(s.position(), 2);
    }

    #[tokio::test]
    async fn test_has_more_unknown_until_total_known() {
        let mut s = scroller(10, 4);
        assert_eq!(s.has_more(), HasMore::Unknown);
        s.current().await.unwrap();
        assert_eq!(s.has_more(), HasMore::Unknown);

        let page = s.next().await.unwrap().unwrap();
        assert_eq!(page.start, 4);
        assert_eq!(s.has_more(), HasMore::Unknown);

        let page = s.next().await.unwrap().unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(s.total(), Some(10));
        assert_eq!(s.has_more(), HasMore::NoMore);
    }

    #[tokio::test]
    async fn test_next_stops_without_fetching_at_end() {
        let cursor = VecCursor::new(numbered_rows(8), CursorKind::ScrollInsensitive);
        let fetches = cursor.fetches.clone();
        let mut s = Scroller::new(Box::new(cursor), 4, false).unwrap();
        s.establish_total().await.unwrap();

        s.current().await.unwrap();
        assert_eq!(s.has_more(), HasMore::HasMore);
        assert!(s.next().await.unwrap().is_some());
        assert_eq!(s.has_more(), HasMore::NoMore);

        let before = fetches.load(std::sync::atomic::Ordering::SeqCst);
        assert!(s.next().await.unwrap().is_none());
        assert_eq!(fetches.load(std::sync::atomic::Ordering::SeqCst), before);
        assert_eq!(s.position(), 4);
    }

    #[tokio::test]
    async fn test_next_on_exact_multiple_restores_position() {
        let mut s = scroller(8, 4);
        s.current().await.unwrap();
        s.next().await.unwrap();
        assert_eq!(s.has_more(), HasMore::Unknown);
        assert!(s.next().await.unwrap().is_none());
        assert_eq!(s.position(), 4);
        assert_eq!(s.total(), Some(8));
        assert_eq!(s.has_more(), HasMore::NoMore);
    }

    #[tokio::test]
    async fn test_previous_refuses_below_zero() {
        let mut s = scroller(10, 4);
        s.materialize(4, 4).await.unwrap();
        let page = s.previous().await.unwrap().unwrap();
        assert_eq!(page.start, 0);
        assert!(s.previous().await.unwrap().is_none());
        assert_eq!(s.position(), 0);
    }

    #[tokio::test]
    async fn test_negative_rows_need_opt_in() {
        let mut s = scroller(10, 4);
        let err = s.materialize(-3, 2).await.unwrap_err();
        assert!(matches!(err, DbError::Range { index: -3, .. }));
        assert_eq!(s.position(), 0);

        let cursor = VecCursor::new(numbered_rows(10), CursorKind::ScrollInsensitive);
        let mut s = Scroller::new(Box::new(cursor), 4, true).unwrap();
        let page = s.materialize(-3, 2).await.unwrap();
        assert_eq!(page.rows, vec![numbered_rows(10)[8].clone(), numbered_rows(10)[9].clone()]);
    }

    #[tokio::test]
    async fn test_previous_steps_below_zero_in_negative_mode() {
        let cursor = VecCursor::new(numbered_rows(10), CursorKind::ScrollInsensitive);
        let mut s = Scroller::new(Box::new(cursor), 4, true).unwrap();
        s.current().await.unwrap();

        let page = s.previous().await.unwrap().unwrap();
        assert_eq!(page.start, -4);
        assert_eq!(page.rows, numbered_rows(10)[7..].to_vec());
        assert_eq!(s.position(), -4);
        assert_eq!(s.total(), None);

        let page = s.next().await.unwrap().unwrap();
        assert_eq!(page.start, 0);
        assert_eq!(page.rows, numbered_rows(4));
    }

    #[tokio::test]
    async fn test_forward_only_cursor_rejected() {
        let cursor = VecCursor::new(numbered_rows(3), CursorKind::ForwardOnly);
        assert!(Scroller::new(Box::new(cursor), 2, false).is_err());
    }
}
