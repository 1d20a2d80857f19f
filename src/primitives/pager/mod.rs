#![forbid(unsafe_code)]
//! Page allocation, retrieval and release.

mod mem;

pub use mem::{MemPageStore, PagerStats};

use bytes::Bytes;

use crate::types::{PageId, Result};

/// Storage backend the B+ tree reads pages from and writes pages to.
///
/// Pages handed to [`PageStore::new_page`] are immutable from then on; the
/// tree never asks for a page again after releasing it with
/// [`PageStore::del_page`].
pub trait PageStore: Send + Sync {
    /// Returns the page size in bytes.
    fn page_size(&self) -> usize;
    /// Returns the bytes of a live page.
    fn get_page(&self, id: PageId) -> Result<Bytes>;
    /// Stores `page` (padded or truncated to the page size) and returns its fresh id.
    fn new_page(&self, page: Bytes) -> Result<PageId>;
    /// Releases `id` for reuse.
    fn del_page(&self, id: PageId) -> Result<()>;
}
