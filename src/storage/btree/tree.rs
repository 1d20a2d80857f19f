use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;

use super::mutate::{internal_from_children, leaf_insert, leaf_update, replace_child, ChildLink};
use super::node::{NodeBuf, NodeKind, NodeRef};
use super::options::BTreeOptions;
use super::split::{split, SplitNodes};
use super::stats::{BTreeStats, BTreeStatsSnapshot};
use crate::primitives::pager::PageStore;
use crate::types::{CowTreeError, PageId, Result};

/// Largest index whose key is `<= key`, or 0 when every key is greater.
///
/// Internal nodes descend into the returned child; leaves compare the key at
/// the returned index to decide between update and insert.
pub fn lookup_floor(node: NodeRef<'_>, key: &[u8]) -> Result<usize> {
    let mut lo = 0usize;
    let mut hi = node.count();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if node.key(mid)? <= key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo.saturating_sub(1))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LeafSlot {
    Existing(usize),
    Insert(usize),
}

fn leaf_slot(node: NodeRef<'_>, key: &[u8]) -> Result<LeafSlot> {
    if node.is_empty() {
        return Ok(LeafSlot::Insert(0));
    }
    let idx = lookup_floor(node, key)?;
    Ok(match node.key(idx)?.cmp(key) {
        Ordering::Equal => LeafSlot::Existing(idx),
        Ordering::Less => LeafSlot::Insert(idx + 1),
        Ordering::Greater => LeafSlot::Insert(0),
    })
}

/// Pages touched by one insert.
///
/// Superseded pages are only released once the new root is in place, and
/// pages written by a failed insert are released again so the store ends up
/// where it started.
struct WriteSet<'s> {
    store: &'s dyn PageStore,
    allocated: Vec<PageId>,
    retired: Vec<PageId>,
}

impl<'s> WriteSet<'s> {
    fn new(store: &'s dyn PageStore) -> Self {
        Self {
            store,
            allocated: Vec::new(),
            retired: Vec::new(),
        }
    }

    fn allocate(&mut self, page: Bytes) -> Result<PageId> {
        let id = self.store.new_page(page)?;
        self.allocated.push(id);
        Ok(id)
    }

    fn retire(&mut self, id: PageId) {
        self.retired.push(id);
    }

    fn release(store: &dyn PageStore, pages: &[PageId]) -> u64 {
        let mut released = 0;
        for &id in pages {
            match store.del_page(id) {
                Ok(()) => released += 1,
                Err(err) => tracing::warn!(
                    target: "cowtree::btree::insert",
                    page = id.0,
                    error = %err,
                    "failed to release page"
                ),
            }
        }
        released
    }

    fn commit(self) -> u64 {
        Self::release(self.store, &self.retired)
    }

    fn rollback(self) -> u64 {
        Self::release(self.store, &self.allocated)
    }
}

/// Copy-on-write B+ tree over a [`PageStore`].
///
/// Pages are never modified after they are written: an insert rebuilds the
/// path from the root to the target leaf into new pages and then swaps the
/// root id.
pub struct BTree {
    pub(super) store: Arc<dyn PageStore>,
    pub(super) root: PageId,
    pub(super) options: BTreeOptions,
    pub(super) stats: Arc<BTreeStats>,
}

impl BTree {
    /// Creates an empty tree whose root is a fresh leaf page.
    pub fn create(store: Arc<dyn PageStore>, options: BTreeOptions) -> Result<Self> {
        check_options(store.as_ref(), &options)?;
        let mut root = NodeBuf::scratch(options.page_size);
        root.set_header(NodeKind::Leaf, 0)?;
        let root_id = store.new_page(root.freeze(options.page_size)?)?;
        let stats = Arc::new(BTreeStats::default());
        stats.add_pages_allocated(1);
        tracing::debug!(
            target: "cowtree::btree",
            root = root_id.0,
            page_size = options.page_size,
            "created empty tree"
        );
        Ok(Self {
            store,
            root: root_id,
            options,
            stats,
        })
    }

    /// Attaches to a tree previously built in `store` under `root`.
    pub fn open(store: Arc<dyn PageStore>, options: BTreeOptions, root: PageId) -> Result<Self> {
        check_options(store.as_ref(), &options)?;
        let page = store.get_page(root)?;
        NodeRef::parse(&page)?;
        Ok(Self {
            store,
            root,
            options,
            stats: Arc::new(BTreeStats::default()),
        })
    }

    /// Return the root page identifier.
    pub fn root_page(&self) -> PageId {
        self.root
    }

    /// Size limits the tree was built with.
    pub fn options(&self) -> &BTreeOptions {
        &self.options
    }

    /// Page store backing the tree.
    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    /// Access the live statistics counters for this tree.
    pub fn stats(&self) -> Arc<BTreeStats> {
        Arc::clone(&self.stats)
    }

    /// Snapshot the current statistics counters.
    pub fn stats_snapshot(&self) -> BTreeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emit the current statistics to the tracing sink.
    pub fn emit_stats(&self) {
        self.stats.emit_tracing();
    }

    /// Looks up `key`, returning an owned copy of its value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut current = self.root;
        loop {
            let page = self.store.get_page(current)?;
            let node = NodeRef::parse(&page)?;
            match node.kind() {
                NodeKind::Leaf => {
                    self.stats.inc_leaf_searches();
                    if node.is_empty() {
                        return Ok(None);
                    }
                    let record = node.record(lookup_floor(node, key)?)?;
                    return Ok((record.key == key).then(|| record.value.to_vec()));
                }
                NodeKind::Internal => {
                    if node.is_empty() {
                        return Err(CowTreeError::Corruption("internal node without children"));
                    }
                    self.stats.inc_internal_searches();
                    current = node.ptr(lookup_floor(node, key)?)?;
                }
            }
        }
    }

    /// Inserts `key` with `value`, replacing the value if the key exists.
    ///
    /// On error the tree keeps its previous root and every page written by
    /// the failed attempt is released again.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > self.options.max_key_size {
            return Err(CowTreeError::KeyTooLarge {
                len: key.len(),
                max: self.options.max_key_size,
            });
        }
        if value.len() > self.options.max_value_size {
            return Err(CowTreeError::ValueTooLarge {
                len: value.len(),
                max: self.options.max_value_size,
            });
        }

        let store = Arc::clone(&self.store);
        let mut writes = WriteSet::new(store.as_ref());
        match self.insert_from_root(&mut writes, key, value) {
            Ok(new_root) => {
                let previous = std::mem::replace(&mut self.root, new_root);
                self.stats.add_pages_allocated(writes.allocated.len() as u64);
                let released = writes.commit();
                self.stats.add_pages_released(released);
                tracing::debug!(
                    target: "cowtree::btree::insert",
                    old_root = previous.0,
                    new_root = new_root.0,
                    released,
                    "swapped root"
                );
                Ok(())
            }
            Err(err) => {
                let discarded = writes.rollback();
                self.stats.inc_aborted_inserts();
                tracing::warn!(
                    target: "cowtree::btree::insert",
                    root = self.root.0,
                    discarded,
                    error = %err,
                    "insert abandoned"
                );
                Err(err)
            }
        }
    }

    fn insert_from_root(
        &self,
        writes: &mut WriteSet<'_>,
        key: &[u8],
        value: &[u8],
    ) -> Result<PageId> {
        let page_size = self.options.page_size;
        let root_page = self.store.get_page(self.root)?;
        let root = NodeRef::parse(&root_page)?;
        let kind = root.kind();
        let updated = self.insert_node(writes, root, key, value)?;
        let parts = split(updated, page_size)?;
        self.note_split(kind, parts.len());
        let children = self.write_parts(writes, parts)?;
        writes.retire(self.root);
        if let [(only, _)] = children.as_slice() {
            return Ok(*only);
        }

        let links = child_links(&children)?;
        let mut promoted = NodeBuf::scratch(page_size);
        internal_from_children(&mut promoted, &links)?;
        let new_root = writes.allocate(promoted.freeze(page_size)?)?;
        self.stats.inc_root_promotions();
        tracing::debug!(
            target: "cowtree::btree::insert",
            root = new_root.0,
            children = links.len(),
            "root split, tree grew by one level"
        );
        Ok(new_root)
    }

    /// Rebuilds `node` with the key inserted; the result may span up to two pages.
    fn insert_node(
        &self,
        writes: &mut WriteSet<'_>,
        node: NodeRef<'_>,
        key: &[u8],
        value: &[u8],
    ) -> Result<NodeBuf> {
        let page_size = self.options.page_size;
        let mut out = NodeBuf::scratch(2 * page_size);
        match node.kind() {
            NodeKind::Leaf => {
                self.stats.inc_leaf_searches();
                match leaf_slot(node, key)? {
                    LeafSlot::Existing(idx) => {
                        leaf_update(&mut out, node, idx, key, value)?;
                        self.stats.inc_leaf_updates();
                    }
                    LeafSlot::Insert(idx) => {
                        leaf_insert(&mut out, node, idx, key, value)?;
                        self.stats.inc_leaf_inserts();
                    }
                }
            }
            NodeKind::Internal => {
                if node.is_empty() {
                    return Err(CowTreeError::Corruption("internal node without children"));
                }
                self.stats.inc_internal_searches();
                let idx = lookup_floor(node, key)?;
                let child_id = node.ptr(idx)?;
                tracing::trace!(
                    target: "cowtree::btree::insert",
                    child = child_id.0,
                    slot = idx,
                    "descending through internal node"
                );
                let child_page = self.store.get_page(child_id)?;
                let child = NodeRef::parse(&child_page)?;
                let child_kind = child.kind();
                let updated = self.insert_node(writes, child, key, value)?;
                let parts = split(updated, page_size)?;
                self.note_split(child_kind, parts.len());
                let children = self.write_parts(writes, parts)?;
                writes.retire(child_id);
                let links = child_links(&children)?;
                replace_child(&mut out, node, idx, &links)?;
            }
        }
        Ok(out)
    }

    fn write_parts(
        &self,
        writes: &mut WriteSet<'_>,
        parts: SplitNodes,
    ) -> Result<SmallVec<[(PageId, Bytes); 3]>> {
        let mut written = SmallVec::new();
        for part in parts {
            let page = part.freeze(self.options.page_size)?;
            let id = writes.allocate(page.clone())?;
            written.push((id, page));
        }
        Ok(written)
    }

    fn note_split(&self, kind: NodeKind, parts: usize) {
        if parts < 2 {
            return;
        }
        match kind {
            NodeKind::Leaf => self.stats.inc_leaf_splits(),
            NodeKind::Internal => self.stats.inc_internal_splits(),
        }
    }
}

fn child_links(children: &[(PageId, Bytes)]) -> Result<SmallVec<[ChildLink<'_>; 3]>> {
    children
        .iter()
        .map(|(page, bytes)| {
            Ok(ChildLink {
                page: *page,
                node: NodeRef::parse(bytes)?,
            })
        })
        .collect()
}

fn check_options(store: &dyn PageStore, options: &BTreeOptions) -> Result<()> {
    options.validate()?;
    if store.page_size() != options.page_size {
        return Err(CowTreeError::InvalidConfig(format!(
            "tree page size {} does not match store page size {}",
            options.page_size,
            store.page_size()
        )));
    }
    Ok(())
}
