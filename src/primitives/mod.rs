//! Low-level primitives for building the storage engine.
//!
//! Includes byte utilities and the paging abstraction the tree is written against.

/// Byte-level utilities and encoding/decoding.
pub mod bytes;

/// Paging subsystem.
///
/// Page allocation, retrieval and release behind the [`pager::PageStore`] trait.
pub mod pager;
