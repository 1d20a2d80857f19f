//! Storage structures built on top of the page store.

/// Copy-on-write B+ tree.
///
/// Fixed-size node pages, copy-on-write mutation and split propagation up to
/// the root.
pub mod btree;
