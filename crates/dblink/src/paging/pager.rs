//! Numbered pages over a result with a known row count.

use tracing::debug;

use crate::core::schema::ColumnMeta;
use crate::core::traits::{Cursor, CursorKind};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};
use crate::link::DataLink;

use super::Page;

/// Offset/limit pager.
///
/// Owns one scrollable cursor for its whole lifetime. Pages handed out are
/// copies of the rows, so callers can keep them after the pager moves on.
pub struct Pager {
    cursor: Box<dyn Cursor>,
    total: i64,
    page_size: usize,
    max_page_index: i64,
    current: Option<i64>,
}

impl Pager {
    /// Run `sql` and page its rows `page_size` at a time.
    pub async fn open(
        link: &mut DataLink,
        sql: &str,
        params: &[SqlValue],
        page_size: usize,
    ) -> Result<Self> {
        let cursor = link
            .open_cursor(sql, params, CursorKind::ScrollInsensitive)
            .await?;
        Self::new(cursor, page_size).await
    }

    /// Page an already open cursor. Seeks to the last row to count the result.
    pub async fn new(mut cursor: Box<dyn Cursor>, page_size: usize) -> Result<Self> {
        if !cursor.kind().is_scrollable() {
            return Err(DbError::Driver(
                "paging needs a scrollable cursor, got forward-only".into(),
            ));
        }
        let total = cursor.last().await?;
        debug!("Pager over {} rows, {} per page", total, page_size);
        let mut pager = Self {
            cursor,
            total,
            page_size,
            max_page_index: 0,
            current: None,
        };
        pager.max_page_index = pager.compute_max_page_index();
        Ok(pager)
    }

    fn compute_max_page_index(&self) -> i64 {
        if self.page_size == 0 || self.total <= 0 {
            return 0;
        }
        let n = self.page_size as i64;
        let exact = if self.total % n == 0 { 1 } else { 0 };
        (self.total / n - exact).max(0)
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        self.cursor.columns()
    }

    pub fn total_rows(&self) -> i64 {
        self.total
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_page_index(&self) -> i64 {
        self.max_page_index
    }

    /// Index of the page last shown, if any.
    pub fn current_page_index(&self) -> Option<i64> {
        self.current
    }

    /// Change the page size and show the page containing the current first row.
    ///
    /// With no current page yet, shows the first page.
    pub async fn set_page_size(&mut self, page_size: usize) -> Result<Page> {
        let first_row = self
            .current
            .map_or(0, |p| p * self.page_size as i64);
        self.page_size = page_size;
        self.max_page_index = self.compute_max_page_index();
        let target = if page_size == 0 {
            0
        } else {
            (first_row / page_size as i64).min(self.max_page_index)
        };
        self.goto_page(target).await
    }

    pub async fn first(&mut self) -> Result<Page> {
        self.goto_page(0).await
    }

    pub async fn last(&mut self) -> Result<Page> {
        self.goto_page(self.max_page_index).await
    }

    /// The page after the current one (the first page if none is current).
    pub async fn next(&mut self) -> Result<Page> {
        let target = self.current.map_or(0, |p| p + 1);
        self.goto_page(target).await
    }

    pub async fn previous(&mut self) -> Result<Page> {
        let target = self.current.map_or(-1, |p| p - 1);
        self.goto_page(target).await
    }

    /// Show page `index`. Out of range leaves the current page unchanged.
    pub async fn goto_page(&mut self, index: i64) -> Result<Page> {
        if index < 0 || index > self.max_page_index {
            return Err(DbError::range("page", index, self.max_page_index));
        }
        let page = self.read_page(index).await?;
        self.current = Some(index);
        Ok(page)
    }

    /// Show the page containing row `row` (0-based).
    pub async fn goto_row(&mut self, row: i64) -> Result<Page> {
        if row < 0 || row >= self.total {
            return Err(DbError::range("row", row, self.total - 1));
        }
        let index = if self.page_size == 0 {
            0
        } else {
            row / self.page_size as i64
        };
        self.goto_page(index).await
    }

    async fn read_page(&mut self, index: i64) -> Result<Page> {
        let start = index * self.page_size as i64;
        if self.page_size == 0 || start >= self.total {
            return Ok(Page::new(start, Vec::new()));
        }
        self.cursor.absolute(start).await?;
        let rows = self.cursor.fetch(self.page_size).await?;
        Ok(Page::new(start, rows))
    }

    /// Release the cursor.
    pub async fn close(mut self) -> Result<()> {
        self.cursor.close().await
    }
}

impl std::fmt::Debug for Pager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("total", &self.total)
            .field("page_size", &self.page_size)
            .field("max_page_index", &self.max_page_index)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::traits::Capabilities;
    use crate::testing::{numbered_rows, MockBackend, VecCursor};

    async fn pager(rows: i64, size: usize) -> Pager {
        let cursor = VecCursor::new(numbered_rows(rows), CursorKind::ScrollInsensitive);
        Pager::new(Box::new(cursor), size).await.unwrap()
    }

    #[tokio::test]
    async fn test_max_page_index() {
        assert_eq!(pager(10, 5).await.max_page_index(), 1);
        assert_eq!(pager(11, 5).await.max_page_index(), 2);
        assert_eq!(pager(4, 5).await.max_page_index(), 0);
        assert_eq!(pager(0, 5).await.max_page_index(), 0);
        assert_eq!(pager(10, 0).await.max_page_index(), 0);
    }

    #[tokio::test]
    async fn test_navigation() {
        let mut p = pager(12, 5).await;
        assert_eq!(p.current_page_index(), None);

        let page = p.next().await.unwrap();
        assert_eq!(page.rows, numbered_rows(5));
        let page = p.next().await.unwrap();
        assert_eq!(page.start, 5);
        let page = p.last().await.unwrap();
        assert_eq!(page.rows, numbered_rows(12)[10..].to_vec());
        assert!(p.next().await.is_err());
        assert_eq!(p.current_page_index(), Some(2));

        let page = p.previous().await.unwrap();
        assert_eq!(page.start, 5);
        p.first().await.unwrap();
        assert!(p.previous().await.is_err());
        assert_eq!(p.current_page_index(), Some(0));
    }

    #[tokio::test]
    async fn test_goto_page_out_of_range_keeps_index() {
        let mut p = pager(10, 3).await;
        p.goto_page(2).await.unwrap();

        let err = p.goto_page(-1).await.unwrap_err();
        assert!(matches!(err, DbError::Range { index: -1, max: 3, .. }));
        let err = p.goto_page(4).await.unwrap_err();
        assert!(matches!(err, DbError::Range { index: 4, .. }));
        assert_eq!(p.current_page_index(), Some(2));
    }

    #[tokio::test]
    async fn test_goto_row_selects_containing_page() {
        let mut p = pager(10, 4).await;
        let page = p.goto_row(6).await.unwrap();
        assert_eq!(p.current_page_index(), Some(1));
        assert_eq!(page.start, 4);
        assert!(p.goto_row(10).await.is_err());
        assert_eq!(p.current_page_index(), Some(1));
    }

    #[tokio::test]
    async fn test_goto_row_on_empty_result_is_out_of_range() {
        let mut p = pager(0, 5).await;
        let err = p.goto_row(0).await.unwrap_err();
        assert!(matches!(err, DbError::Range { index: 0, max: -1, .. }));
        assert_eq!(p.current_page_index(), None);
    }

    #[tokio::test]
    async fn test_set_page_size_keeps_current_row_visible() {
        let mut p = pager(20, 5).await;
        p.goto_page(3).await.unwrap();

        let page = p.set_page_size(4).await.unwrap();
        assert_eq!(p.max_page_index(), 4);
        assert_eq!(p.current_page_index(), Some(3));
        assert_eq!(page.start, 12);

        let mut fresh = pager(20, 5).await;
        let page = fresh.set_page_size(8).await.unwrap();
        assert_eq!(fresh.current_page_index(), Some(0));
        assert_eq!(page.len(), 8);
    }

    #[tokio::test]
    async fn test_pages_do_not_close_cursor() {
        let cursor = VecCursor::new(numbered_rows(6), CursorKind::ScrollInsensitive);
        let closed = cursor.closed.clone();
        let mut p = Pager::new(Box::new(cursor), 2).await.unwrap();
        let page = p.first().await.unwrap();
        drop(page);
        p.next().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        p.close().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_through_link() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.data = numbered_rows(7);
        let mut link = DataLink::new("warehouse", backend.driver());

        let mut p = Pager::open(&mut link, "SELECT n FROM t", &[], 3)
            .await
            .unwrap();
        assert_eq!(p.total_rows(), 7);
        assert_eq!(p.last().await.unwrap().rows, vec![vec![SqlValue::I64(7)]]);
        assert_eq!(
            backend.log().cursor_kinds,
            vec![CursorKind::ScrollInsensitive]
        );
    }

    #[tokio::test]
    async fn test_forward_only_rejected() {
        let cursor = VecCursor::new(numbered_rows(3), CursorKind::ForwardOnly);
        assert!(Pager::new(Box::new(cursor), 2).await.is_err());
    }
}
