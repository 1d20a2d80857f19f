//! Disk-oriented copy-on-write B+ tree.
//!
//! Nodes are fixed-size pages with a bit-exact little-endian layout. Inserts
//! never modify a page in place: the path from the root to the target leaf is
//! rebuilt into new pages, oversized nodes are split into up to three pages,
//! and the root id is swapped once the whole path has been written.

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::pager::{MemPageStore, PageStore};
pub use storage::btree::{BTree, BTreeOptions};
pub use types::{CowTreeError, PageId, Result};
