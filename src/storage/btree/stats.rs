use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;

/// Snapshot of B+ tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, Serialize)]
pub struct BTreeStatsSnapshot {
    /// Number of leaf pages reached by a lookup or insert
    pub leaf_searches: u64,
    /// Number of internal pages descended through
    pub internal_searches: u64,
    /// Inserts that added a new key
    pub leaf_inserts: u64,
    /// Inserts that replaced the value of an existing key
    pub leaf_updates: u64,
    /// Leaf rebuilds that needed more than one page
    pub leaf_splits: u64,
    /// Internal rebuilds that needed more than one page
    pub internal_splits: u64,
    /// Times the tree grew by one level
    pub root_promotions: u64,
    /// Pages written through the page store
    pub pages_allocated: u64,
    /// Pages released after being superseded
    pub pages_released: u64,
    /// Inserts abandoned after an error
    pub aborted_inserts: u64,
}

/// Thread-safe statistics tracking for B+ tree operations.
#[derive(Default, Debug)]
pub struct BTreeStats {
    leaf_searches: AtomicU64,
    internal_searches: AtomicU64,
    leaf_inserts: AtomicU64,
    leaf_updates: AtomicU64,
    leaf_splits: AtomicU64,
    internal_splits: AtomicU64,
    root_promotions: AtomicU64,
    pages_allocated: AtomicU64,
    pages_released: AtomicU64,
    aborted_inserts: AtomicU64,
}

impl BTreeStats {
    /// Returns the current count of leaf page searches.
    pub fn leaf_searches(&self) -> u64 {
        self.leaf_searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of internal page searches.
    pub fn internal_searches(&self) -> u64 {
        self.internal_searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of inserts that added a key.
    pub fn leaf_inserts(&self) -> u64 {
        self.leaf_inserts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of inserts that overwrote a value.
    pub fn leaf_updates(&self) -> u64 {
        self.leaf_updates.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of leaf page splits.
    pub fn leaf_splits(&self) -> u64 {
        self.leaf_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of internal page splits.
    pub fn internal_splits(&self) -> u64 {
        self.internal_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of root promotions.
    pub fn root_promotions(&self) -> u64 {
        self.root_promotions.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of pages allocated.
    pub fn pages_allocated(&self) -> u64 {
        self.pages_allocated.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of superseded pages released.
    pub fn pages_released(&self) -> u64 {
        self.pages_released.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of inserts rolled back.
    pub fn aborted_inserts(&self) -> u64 {
        self.aborted_inserts.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_leaf_searches(&self) {
        self.leaf_searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_internal_searches(&self) {
        self.internal_searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_inserts(&self) {
        self.leaf_inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_updates(&self) {
        self.leaf_updates.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_internal_splits(&self) {
        self.internal_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_promotions(&self) {
        self.root_promotions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_pages_allocated(&self, n: u64) {
        self.pages_allocated.fetch_add(n, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_pages_released(&self, n: u64) {
        self.pages_released.fetch_add(n, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_aborted_inserts(&self) {
        self.aborted_inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            leaf_searches: self.leaf_searches(),
            internal_searches: self.internal_searches(),
            leaf_inserts: self.leaf_inserts(),
            leaf_updates: self.leaf_updates(),
            leaf_splits: self.leaf_splits(),
            internal_splits: self.internal_splits(),
            root_promotions: self.root_promotions(),
            pages_allocated: self.pages_allocated(),
            pages_released: self.pages_released(),
            aborted_inserts: self.aborted_inserts(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "cowtree::btree::stats",
            leaf_searches = snapshot.leaf_searches,
            internal_searches = snapshot.internal_searches,
            leaf_inserts = snapshot.leaf_inserts,
            leaf_updates = snapshot.leaf_updates,
            leaf_splits = snapshot.leaf_splits,
            internal_splits = snapshot.internal_splits,
            root_promotions = snapshot.root_promotions,
            pages_allocated = snapshot.pages_allocated,
            pages_released = snapshot.pages_released,
            aborted_inserts = snapshot.aborted_inserts,
            "btree stats snapshot"
        );
    }
}
