#![forbid(unsafe_code)]

//! Copy-on-write B+ tree over fixed-size pages.

/// Size limits and their validation.
pub mod options;

/// Node page layout and record encoding.
pub mod node;

/// Copy-on-write node builders.
pub mod mutate;

/// Splitting of oversized nodes.
pub mod split;

mod stats;
mod tree;
mod verify;

pub use options::{
    BTreeOptions, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE, DEFAULT_PAGE_SIZE,
};
pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use tree::{lookup_floor, BTree};
pub use verify::{VerifyCounts, VerifyFinding, VerifyReport};
