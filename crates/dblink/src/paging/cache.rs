//! Page cache decorator.
//!
//! Caches materialized windows keyed by (start row, row count) in a
//! count-bounded LRU. The cache sits behind an async mutex held across
//! lookup, materialization and insertion, so concurrent requests for the
//! same window reach the underlying source at most once.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::config::PagingConfig;
use crate::core::traits::CursorKind;
use crate::core::value::SqlValue;
use crate::error::Result;
use crate::link::DataLink;

use super::{HasMore, Page, PageSource, Scroller};

/// Cache key packing the start row (high 64 bits) and row count (low 64 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey(u128);

impl PageKey {
    pub fn new(start: i64, count: usize) -> Self {
        PageKey(((start as u64 as u128) << 64) | count as u64 as u128)
    }

    pub fn start(&self) -> i64 {
        (self.0 >> 64) as u64 as i64
    }

    pub fn count(&self) -> usize {
        self.0 as u64 as usize
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`; zero before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Link in the recency list; `prev` is more recently used.
#[derive(Debug, Clone, Copy)]
struct Node {
    key: PageKey,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Least-recently-used page store bounded by entry count.
///
/// Lookup, insertion and eviction are O(1): the map points into an
/// index-linked recency list whose freed slots are reused.
#[derive(Debug)]
pub struct PageCache {
    capacity: usize,
    entries: HashMap<PageKey, (usize, Arc<Page>)>,
    nodes: Vec<Node>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    stats: CacheStats,
}

impl PageCache {
    /// A cache holding at most `capacity` pages (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Look up a page, marking it most recently used.
    pub fn get(&mut self, key: &PageKey) -> Option<Arc<Page>> {
        match self.entries.get(key) {
            Some((slot, page)) => {
                let (slot, page) = (*slot, Arc::clone(page));
                self.detach(slot);
                self.push_front(slot);
                self.stats.hits += 1;
                Some(page)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a page, evicting the least recently used one when full.
    pub fn insert(&mut self, key: PageKey, page: Arc<Page>) {
        if let Some((slot, stored)) = self.entries.get_mut(&key) {
            *stored = page;
            let slot = *slot;
            self.detach(slot);
            self.push_front(slot);
            return;
        }

        let node = Node {
            key,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.push_front(slot);
        self.entries.insert(key, (slot, page));
        self.stats.inserts += 1;

        while self.entries.len() > self.capacity {
            let Some(victim) = self.tail else { break };
            self.detach(victim);
            self.entries.remove(&self.nodes[victim].key);
            self.free.push(victim);
            self.stats.evictions += 1;
        }
    }

    /// Drop every page; counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    fn detach(&mut self, slot: usize) {
        let Node { prev, next, .. } = self.nodes[slot];
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}

/// A [`PageSource`] that serves repeated windows from a [`PageCache`].
///
/// A hit still moves the inner source's position, so navigation behaves
/// exactly as without the cache.
pub struct CachedScroller<S: PageSource> {
    inner: S,
    cache: Arc<Mutex<PageCache>>,
}

impl<S: PageSource> CachedScroller<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self::with_cache(inner, Arc::new(Mutex::new(PageCache::new(capacity))))
    }

    /// Decorate `inner` with an existing, possibly shared, cache.
    pub fn with_cache(inner: S, cache: Arc<Mutex<PageCache>>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> Arc<Mutex<PageCache>> {
        Arc::clone(&self.cache)
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl CachedScroller<Scroller> {
    /// Run `sql` through a scroll-insensitive cursor and window it with the
    /// page size, negative-row rule and cache capacity from `config`.
    pub async fn open(
        link: &mut DataLink,
        sql: &str,
        params: &[SqlValue],
        config: &PagingConfig,
    ) -> Result<Self> {
        let cursor = link
            .open_cursor(sql, params, CursorKind::ScrollInsensitive)
            .await?;
        let scroller = Scroller::new(cursor, config.page_size, config.allow_negative_rows)?;
        Ok(Self::new(scroller, config.cache_capacity))
    }

    /// Release the cursor.
    pub async fn close(self) -> Result<()> {
        self.inner.close().await
    }
}

#[async_trait]
impl<S: PageSource> PageSource for CachedScroller<S> {
    fn page_width(&self) -> usize {
        self.inner.page_width()
    }

    fn position(&self) -> i64 {
        self.inner.position()
    }

    fn set_position(&mut self, row: i64) {
        self.inner.set_position(row);
    }

    fn allows_negative(&self) -> bool {
        self.inner.allows_negative()
    }

    fn has_more(&self) -> HasMore {
        self.inner.has_more()
    }

    async fn materialize(&mut self, from: i64, count: usize) -> Result<Arc<Page>> {
        let key = PageKey::new(from, count);
        let mut cache = self.cache.lock().await;

        if let Some(page) = cache.get(&key) {
            trace!("Page cache hit at row {} (+{})", from, count);
            self.inner.set_position(from);
            return Ok(page);
        }

        let page = self.inner.materialize(from, count).await?;
        cache.insert(key, Arc::clone(&page));
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::traits::Capabilities;
    use crate::testing::{numbered_rows, MockBackend, VecCursor};

    fn page(start: i64) -> Arc<Page> {
        Arc::new(Page::new(start, numbered_rows(1)))
    }

    #[test]
    fn test_page_key_packs_start_and_count() {
        let key = PageKey::new(1_000_000, 25);
        assert_eq!(key.start(), 1_000_000);
        assert_eq!(key.count(), 25);
        assert_eq!(PageKey::new(-4, 2).start(), -4);
        assert_ne!(PageKey::new(0, 10), PageKey::new(10, 0));
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let mut cache = PageCache::new(2);
        cache.insert(PageKey::new(0, 5), page(0));
        cache.insert(PageKey::new(5, 5), page(5));
        assert!(cache.get(&PageKey::new(0, 5)).is_some());

        cache.insert(PageKey::new(10, 5), page(10));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&PageKey::new(5, 5)).is_none());
        assert!(cache.get(&PageKey::new(0, 5)).is_some());

        let stats = cache.stats();
        assert_eq!(stats.inserts, 3);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_reinsert_does_not_grow() {
        let mut cache = PageCache::new(3);
        cache.insert(PageKey::new(0, 5), page(0));
        cache.insert(PageKey::new(0, 5), page(0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().inserts, 1);
    }

    #[test]
    fn test_eviction_order_follows_recency_across_slot_reuse() {
        let mut cache = PageCache::new(3);
        for start in [0, 5, 10] {
            cache.insert(PageKey::new(start, 5), page(start));
        }
        cache.get(&PageKey::new(0, 5));
        cache.insert(PageKey::new(15, 5), page(15));
        cache.get(&PageKey::new(10, 5));
        cache.insert(PageKey::new(20, 5), page(20));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&PageKey::new(5, 5)).is_none());
        assert!(cache.get(&PageKey::new(0, 5)).is_none());
        for start in [10, 15, 20] {
            assert_eq!(cache.get(&PageKey::new(start, 5)).unwrap().start, start);
        }

        cache.clear();
        assert!(cache.is_empty());
        cache.insert(PageKey::new(0, 5), page(0));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_window_served_without_fetching() {
        let cursor = VecCursor::new(numbered_rows(20), CursorKind::ScrollInsensitive);
        let fetches = cursor.fetches.clone();
        let scroller = Scroller::new(Box::new(cursor), 5, false).unwrap();
        let mut cached = CachedScroller::new(scroller, 8);

        let first = cached.materialize(10, 5).await.unwrap();
        let after_first = fetches.load(Ordering::SeqCst);
        cached.set_position(0);

        let second = cached.materialize(10, 5).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), after_first);
        assert_eq!(first, second);
        assert_eq!(cached.position(), 10);

        let stats = cached.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_navigation_through_cache_matches_plain_scroller() {
        let cursor = VecCursor::new(numbered_rows(12), CursorKind::ScrollInsensitive);
        let scroller = Scroller::new(Box::new(cursor), 5, false).unwrap();
        let mut cached = CachedScroller::new(scroller, 4);

        let p0 = cached.current().await.unwrap();
        let p1 = cached.next().await.unwrap().unwrap();
        let back = cached.previous().await.unwrap().unwrap();
        assert_eq!(p0, back);
        assert_eq!(p1.start, 5);
        assert_eq!(cached.position(), 0);
        assert_eq!(cached.stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_evicted_window_is_fetched_again() {
        let cursor = VecCursor::new(numbered_rows(30), CursorKind::ScrollInsensitive);
        let fetches = cursor.fetches.clone();
        let scroller = Scroller::new(Box::new(cursor), 5, false).unwrap();
        let mut cached = CachedScroller::new(scroller, 1);

        let first = cached.materialize(0, 5).await.unwrap();
        cached.materialize(10, 5).await.unwrap();
        let before = fetches.load(Ordering::SeqCst);

        let again = cached.materialize(0, 5).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), before + 1);
        assert_eq!(again, first);
        assert_eq!(again.rows, numbered_rows(5));
        assert_eq!(cached.position(), 0);

        let stats = cached.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.evictions, 2);
    }

    #[tokio::test]
    async fn test_open_applies_paging_config() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.data = numbered_rows(9);
        let mut link = DataLink::new("warehouse", backend.driver());
        let config = PagingConfig {
            page_size: 4,
            cache_capacity: 2,
            allow_negative_rows: true,
        };

        let mut cached = CachedScroller::open(&mut link, "SELECT n FROM t", &[], &config)
            .await
            .unwrap();
        assert_eq!(cached.page_width(), 4);
        assert!(cached.allows_negative());
        assert_eq!(cached.cache().lock().await.capacity(), 2);

        let page = cached.previous().await.unwrap().unwrap();
        assert_eq!(page.start, -4);
        assert_eq!(page.rows, numbered_rows(9)[6..].to_vec());
        assert_eq!(
            backend.log().cursor_kinds,
            vec![CursorKind::ScrollInsensitive]
        );
        cached.close().await.unwrap();
    }
}
