use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use serde::Serialize;

use super::PageStore;
use crate::types::{CowTreeError, PageId, Result};

/// Snapshot of page store counters.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PagerStats {
    /// Page size in bytes.
    pub page_size: usize,
    /// Number of successful `get_page` calls.
    pub reads: u64,
    /// Number of pages allocated.
    pub allocations: u64,
    /// Number of pages released.
    pub frees: u64,
    /// Pages currently live.
    pub live_pages: usize,
}

#[derive(Default)]
struct MemInner {
    pages: HashMap<PageId, Bytes>,
    free: Vec<PageId>,
    next_id: u64,
}

/// Page store that keeps every page in memory.
///
/// Released ids go on a free list and are handed out again by later
/// allocations.
pub struct MemPageStore {
    page_size: usize,
    inner: RwLock<MemInner>,
    reads: AtomicU64,
    allocations: AtomicU64,
    frees: AtomicU64,
}

impl MemPageStore {
    /// Creates an empty store with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            inner: RwLock::new(MemInner {
                next_id: 1,
                ..MemInner::default()
            }),
            reads: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    /// Number of pages currently live.
    pub fn live_pages(&self) -> usize {
        self.inner.read().pages.len()
    }

    /// Whether `id` names a live page.
    pub fn contains(&self, id: PageId) -> bool {
        self.inner.read().pages.contains_key(&id)
    }

    /// Snapshot of the store counters.
    pub fn stats(&self) -> PagerStats {
        PagerStats {
            page_size: self.page_size,
            reads: self.reads.load(AtomicOrdering::Relaxed),
            allocations: self.allocations.load(AtomicOrdering::Relaxed),
            frees: self.frees.load(AtomicOrdering::Relaxed),
            live_pages: self.live_pages(),
        }
    }

    fn fit_to_page(&self, page: Bytes) -> Bytes {
        match page.len().cmp(&self.page_size) {
            std::cmp::Ordering::Equal => page,
            std::cmp::Ordering::Greater => {
                tracing::debug!(
                    target: "cowtree::pager",
                    len = page.len(),
                    page_size = self.page_size,
                    "truncating oversized page buffer"
                );
                page.slice(..self.page_size)
            }
            std::cmp::Ordering::Less => {
                let mut padded = BytesMut::zeroed(self.page_size);
                padded[..page.len()].copy_from_slice(&page);
                padded.freeze()
            }
        }
    }
}

impl PageStore for MemPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn get_page(&self, id: PageId) -> Result<Bytes> {
        let page = self
            .inner
            .read()
            .pages
            .get(&id)
            .cloned()
            .ok_or(CowTreeError::PageNotFound(id))?;
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(page)
    }

    fn new_page(&self, page: Bytes) -> Result<PageId> {
        let page = self.fit_to_page(page);
        let mut inner = self.inner.write();
        let id = match inner.free.pop() {
            Some(id) => id,
            None => {
                let id = PageId(inner.next_id);
                inner.next_id += 1;
                id
            }
        };
        inner.pages.insert(id, page);
        self.allocations.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::trace!(target: "cowtree::pager", page = id.0, "allocated page");
        Ok(id)
    }

    fn del_page(&self, id: PageId) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.pages.remove(&id).is_none() {
            return Err(CowTreeError::PageNotFound(id));
        }
        inner.free.push(id);
        self.frees.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::trace!(target: "cowtree::pager", page = id.0, "released page");
        Ok(())
    }
}
