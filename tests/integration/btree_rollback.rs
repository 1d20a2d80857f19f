#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use cowtree::{BTree, BTreeOptions, CowTreeError, MemPageStore, PageId, PageStore, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Page store that refuses allocations once its budget runs out.
struct FlakyStore {
    inner: MemPageStore,
    budget: AtomicI64,
    refused: AtomicU64,
}

impl FlakyStore {
    fn new(page_size: usize) -> Self {
        Self {
            inner: MemPageStore::new(page_size),
            budget: AtomicI64::new(-1),
            refused: AtomicU64::new(0),
        }
    }

    /// Allows `n` more allocations, or any number when `n` is `None`.
    fn set_budget(&self, n: Option<i64>) {
        self.budget.store(n.unwrap_or(-1), Ordering::SeqCst);
    }
}

impl PageStore for FlakyStore {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn get_page(&self, id: PageId) -> Result<Bytes> {
        self.inner.get_page(id)
    }

    fn new_page(&self, page: Bytes) -> Result<PageId> {
        let budget = self.budget.load(Ordering::SeqCst);
        if budget == 0 {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(CowTreeError::InvalidConfig("allocation refused".into()));
        }
        if budget > 0 {
            self.budget.store(budget - 1, Ordering::SeqCst);
        }
        self.inner.new_page(page)
    }

    fn del_page(&self, id: PageId) -> Result<()> {
        self.inner.del_page(id)
    }
}

fn small_options() -> BTreeOptions {
    BTreeOptions {
        page_size: 512,
        max_key_size: 64,
        max_value_size: 128,
    }
}

fn snapshot(tree: &BTree, keys: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
    let report = tree.verify()?;
    assert!(report.success, "findings: {:?}", report.findings);
    assert_eq!(report.counts.entries, keys.len() as u64);
    for (key, value) in keys {
        assert_eq!(tree.get(key)?.as_ref(), Some(value));
    }
    Ok(())
}

#[test]
fn failed_allocation_leaves_tree_untouched() -> Result<()> {
    let options = small_options();
    let store = Arc::new(FlakyStore::new(options.page_size));
    let mut tree = BTree::create(store.clone(), options)?;
    let mut reference = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0xFA11_0BAD);
    let mut failures = 0;

    for i in 0..3_000u32 {
        let key = format!("{:06}", rng.gen_range(0..100_000u32)).into_bytes();
        let value = vec![(i % 251) as u8; rng.gen_range(0..96)];

        let budget = rng.gen_range(0..6i64);
        store.set_budget(Some(budget));
        let root = tree.root_page();
        let live = store.inner.live_pages();

        match tree.insert(&key, &value) {
            Ok(()) => {
                reference.insert(key, value);
            }
            Err(err) => {
                assert!(matches!(err, CowTreeError::InvalidConfig(_)));
                assert_eq!(tree.root_page(), root);
                assert_eq!(store.inner.live_pages(), live);
                failures += 1;
            }
        }
        store.set_budget(None);
    }

    assert!(failures > 0, "budget never ran out");
    assert_eq!(tree.stats_snapshot().aborted_inserts, failures);
    assert_eq!(store.refused.load(Ordering::SeqCst), failures);
    snapshot(&tree, &reference)?;
    let report = tree.verify()?;
    assert_eq!(
        store.inner.live_pages() as u64,
        report.counts.leaf_pages + report.counts.internal_pages
    );
    Ok(())
}

#[test]
fn insert_succeeds_after_refused_split() -> Result<()> {
    let options = small_options();
    let store = Arc::new(FlakyStore::new(options.page_size));
    let mut tree = BTree::create(store.clone(), options)?;
    let mut reference = BTreeMap::new();

    // fill the root leaf until the next insert needs a split
    let mut i = 0u32;
    loop {
        let key = format!("k{i:04}").into_bytes();
        let value = vec![b'v'; 40];
        let before = tree.stats_snapshot().leaf_splits;
        store.set_budget(Some(1));
        match tree.insert(&key, &value) {
            Ok(()) => {
                assert_eq!(tree.stats_snapshot().leaf_splits, before);
                reference.insert(key, value);
                i += 1;
            }
            Err(_) => {
                store.set_budget(None);
                snapshot(&tree, &reference)?;
                tree.insert(&key, &value)?;
                reference.insert(key, value);
                break;
            }
        }
    }

    assert_eq!(tree.stats_snapshot().root_promotions, 1);
    assert_eq!(tree.stats_snapshot().aborted_inserts, 1);
    snapshot(&tree, &reference)
}
