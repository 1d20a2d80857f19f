#![forbid(unsafe_code)]
//! Shared identifiers and the crate-wide error type.

use std::fmt;

/// Identifier of a page handed out by a [`PageStore`](crate::primitives::pager::PageStore).
///
/// Zero is never issued for a live page; leaf records carry a zero pointer.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PageId(pub u64);

impl PageId {
    /// Placeholder pointer stored in leaf records.
    pub const NONE: PageId = PageId(0);
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the page codec, the tree and the page stores.
///
/// `Invariant` and `Corruption` are fatal for the operation that raised them:
/// an insert that hits either one is abandoned and the tree keeps its old root.
#[derive(thiserror::Error, Debug)]
pub enum CowTreeError {
    /// An accessor was called with `index >= count`.
    #[error("index {index} out of range for node with {count} entries")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of entries in the node.
        count: usize,
    },
    /// Key longer than the configured maximum.
    #[error("key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLarge {
        /// Length of the rejected key.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Value longer than the configured maximum.
    #[error("value of {len} bytes exceeds the {max} byte limit")]
    ValueTooLarge {
        /// Length of the rejected value.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The page store has no live page under this id.
    #[error("page {0} not found")]
    PageNotFound(PageId),
    /// Tree options that cannot hold a maximum-size record.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A structural guarantee of the engine was broken.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
    /// Page bytes that do not decode as a node.
    #[error("corruption: {0}")]
    Corruption(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CowTreeError>;

impl CowTreeError {
    /// Whether the error aborts the operation as a broken contract rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CowTreeError::Invariant(_) | CowTreeError::Corruption(_)
        )
    }

    pub(crate) fn invariant(reason: &'static str) -> Self {
        tracing::error!(target: "cowtree::invariant", reason, "invariant violation");
        CowTreeError::Invariant(reason)
    }
}
