#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use cowtree::{BTree, BTreeOptions, MemPageStore, PageId, PageStore, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cowtree=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn fresh(options: BTreeOptions) -> Result<(Arc<MemPageStore>, BTree)> {
    init_tracing();
    let store = Arc::new(MemPageStore::new(options.page_size));
    let tree = BTree::create(store.clone(), options)?;
    Ok((store, tree))
}

#[test]
fn mixed_workload_matches_btreemap() -> Result<()> {
    let (store, mut tree) = fresh(BTreeOptions::default())?;
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FF_EE00);
    let mut reference = BTreeMap::new();

    for round in 0..5_000u32 {
        let key = format!("user:{:08}", rng.gen_range(0..2_500u32)).into_bytes();
        let value = format!("round-{round}-{}", "x".repeat(rng.gen_range(0..200))).into_bytes();
        tree.insert(&key, &value)?;
        reference.insert(key, value);
    }

    for (key, value) in &reference {
        assert_eq!(tree.get(key)?.as_ref(), Some(value));
    }
    assert_eq!(tree.get(b"user:99999999")?, None);

    let report = tree.verify()?;
    assert!(report.success, "findings: {:?}", report.findings);
    assert_eq!(report.counts.entries, reference.len() as u64);
    assert_eq!(
        store.live_pages() as u64,
        report.counts.leaf_pages + report.counts.internal_pages
    );

    let stats = tree.stats_snapshot();
    assert_eq!(stats.leaf_inserts, reference.len() as u64);
    assert_eq!(stats.leaf_inserts + stats.leaf_updates, 5_000);
    assert_eq!(
        stats.pages_allocated - stats.pages_released,
        store.live_pages() as u64
    );
    Ok(())
}

#[test]
fn reopened_tree_sees_every_key() -> Result<()> {
    let options = BTreeOptions {
        page_size: 1024,
        max_key_size: 128,
        max_value_size: 256,
    };
    let (store, mut tree) = fresh(options.clone())?;
    for i in 0..1_500u32 {
        tree.insert(&i.to_be_bytes(), &i.to_le_bytes())?;
    }
    let root = tree.root_page();
    drop(tree);

    let shared: Arc<dyn PageStore> = store;
    let reopened = BTree::open(shared, options, root)?;
    for i in (0..1_500u32).step_by(7) {
        assert_eq!(
            reopened.get(&i.to_be_bytes())?,
            Some(i.to_le_bytes().to_vec())
        );
    }
    Ok(())
}

#[test]
fn open_rejects_unknown_root() {
    init_tracing();
    let options = BTreeOptions::default();
    let store = Arc::new(MemPageStore::new(options.page_size));
    let err = BTree::open(store, options, PageId(77)).err();
    assert!(matches!(err, Some(cowtree::CowTreeError::PageNotFound(PageId(77)))));
}

#[test]
fn readers_share_a_built_tree() -> Result<()> {
    let (_store, mut tree) = fresh(BTreeOptions::default())?;
    for i in 0..4_000u64 {
        tree.insert(&i.to_be_bytes(), format!("v{i}").as_bytes())?;
    }
    let tree = &tree;
    std::thread::scope(|scope| {
        for t in 0..4u64 {
            scope.spawn(move || {
                for i in (t..4_000).step_by(4) {
                    let value = tree.get(&i.to_be_bytes()).unwrap();
                    assert_eq!(value, Some(format!("v{i}").into_bytes()));
                }
            });
        }
    });
    assert!(tree.stats().leaf_searches() >= 4_000);
    Ok(())
}

#[test]
fn verify_report_serializes_to_json() -> Result<()> {
    let (_store, mut tree) = fresh(BTreeOptions::default())?;
    tree.insert(b"alpha", b"1")?;
    tree.insert(b"beta", b"2")?;
    let report = tree.verify()?;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["counts"]["entries"], 2);
    assert_eq!(json["counts"]["height"], 1);
    let stats = serde_json::to_value(tree.stats_snapshot()).unwrap();
    assert_eq!(stats["leaf_inserts"], 2);
    Ok(())
}
