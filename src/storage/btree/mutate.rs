//! Copy-on-write node construction.
//!
//! Every function here fills a fresh [`NodeBuf`] from an untouched
//! [`NodeRef`]; the old page stays readable until its owner releases it.

use super::node::{encode_record, NodeBuf, NodeKind, NodeRef};
use crate::types::{CowTreeError, PageId, Result};

/// A freshly allocated child that replaces an entry of its parent.
#[derive(Clone, Copy, Debug)]
pub struct ChildLink<'a> {
    /// Page the child was stored under.
    pub page: PageId,
    /// Contents of the child; its first key becomes the parent's separator.
    pub node: NodeRef<'a>,
}

/// Copies `n` entries of `src` starting at `src_start` into `dst` starting at `dst_start`.
///
/// `dst` must already carry its final header and every entry before
/// `dst_start`, since offsets are rebuilt relative to the previous entry.
pub fn append_range(
    dst: &mut NodeBuf,
    src: NodeRef<'_>,
    dst_start: usize,
    src_start: usize,
    n: usize,
) -> Result<()> {
    if n == 0 {
        return Ok(());
    }
    if src_start + n > src.count() {
        return Err(CowTreeError::IndexOutOfRange {
            index: src_start + n - 1,
            count: src.count(),
        });
    }
    if dst_start + n > dst.count() {
        return Err(CowTreeError::IndexOutOfRange {
            index: dst_start + n - 1,
            count: dst.count(),
        });
    }
    for i in 0..n {
        let bytes = src.record_bytes(src_start + i)?;
        dst.set_ptr(dst_start + i, src.ptr(src_start + i)?)?;
        let start = dst.offset(dst_start + i)?;
        let pos = dst.record_pos(dst_start + i)?;
        let tail = dst.tail_mut(pos)?;
        if bytes.len() > tail.len() {
            return Err(CowTreeError::invariant("copied record exceeds scratch capacity"));
        }
        tail[..bytes.len()].copy_from_slice(bytes);
        dst.set_offset(dst_start + i + 1, start + bytes.len())?;
    }
    Ok(())
}

/// Writes one record with its pointer at `idx` and extends the offset table.
pub fn append_record(
    dst: &mut NodeBuf,
    idx: usize,
    ptr: PageId,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    dst.set_ptr(idx, ptr)?;
    let start = dst.offset(idx)?;
    let pos = dst.record_pos(idx)?;
    let written = encode_record(dst.tail_mut(pos)?, key, value)?;
    dst.set_offset(idx + 1, start + written)
}

/// Builds `dst` as `old` with a new record inserted at `idx`.
pub fn leaf_insert(
    dst: &mut NodeBuf,
    old: NodeRef<'_>,
    idx: usize,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    let count = old.count();
    if idx > count {
        return Err(CowTreeError::IndexOutOfRange { index: idx, count });
    }
    dst.set_header(NodeKind::Leaf, count + 1)?;
    append_range(dst, old, 0, 0, idx)?;
    append_record(dst, idx, PageId::NONE, key, value)?;
    append_range(dst, old, idx + 1, idx, count - idx)
}

/// Builds `dst` as `old` with record `idx` replaced.
pub fn leaf_update(
    dst: &mut NodeBuf,
    old: NodeRef<'_>,
    idx: usize,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    let count = old.count();
    if idx >= count {
        return Err(CowTreeError::IndexOutOfRange { index: idx, count });
    }
    dst.set_header(NodeKind::Leaf, count)?;
    append_range(dst, old, 0, 0, idx)?;
    append_record(dst, idx, PageId::NONE, key, value)?;
    append_range(dst, old, idx + 1, idx + 1, count - idx - 1)
}

/// Builds `dst` as internal node `old` with child `idx` replaced by `children`.
///
/// Each new entry's key is the first key of its child, so a child whose
/// smallest key moved also moves the separator.
pub fn replace_child(
    dst: &mut NodeBuf,
    old: NodeRef<'_>,
    idx: usize,
    children: &[ChildLink<'_>],
) -> Result<()> {
    let count = old.count();
    if idx >= count {
        return Err(CowTreeError::IndexOutOfRange { index: idx, count });
    }
    if children.is_empty() || children.len() > 3 {
        return Err(CowTreeError::invariant("a child is replaced by one to three nodes"));
    }
    let inc = children.len();
    dst.set_header(NodeKind::Internal, count + inc - 1)?;
    append_range(dst, old, 0, 0, idx)?;
    for (i, child) in children.iter().enumerate() {
        append_record(dst, idx + i, child.page, child.node.first_key()?, &[])?;
    }
    append_range(dst, old, idx + inc, idx + 1, count - idx - 1)
}

/// Builds `dst` as an internal node over `children`, in order.
///
/// Used when the root splits and the tree grows by one level.
pub fn internal_from_children(dst: &mut NodeBuf, children: &[ChildLink<'_>]) -> Result<()> {
    dst.set_header(NodeKind::Internal, children.len())?;
    for (i, child) in children.iter().enumerate() {
        append_record(dst, i, child.page, child.node.first_key()?, &[])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRATCH: usize = 512;

    fn leaf(pairs: &[(&[u8], &[u8])]) -> NodeBuf {
        let mut node = NodeBuf::scratch(SCRATCH);
        node.set_header(NodeKind::Leaf, pairs.len()).unwrap();
        for (i, (k, v)) in pairs.iter().enumerate() {
            append_record(&mut node, i, PageId::NONE, k, v).unwrap();
        }
        node
    }

    fn entries(node: &NodeBuf) -> Vec<(Vec<u8>, Vec<u8>)> {
        let view = node.as_node().unwrap();
        (0..view.count())
            .map(|i| {
                let rec = view.record(i).unwrap();
                (rec.key.to_vec(), rec.value.to_vec())
            })
            .collect()
    }

    #[test]
    fn empty_leaf_insert() {
        let empty = leaf(&[]);
        let mut out = NodeBuf::scratch(SCRATCH);
        leaf_insert(&mut out, empty.as_node().unwrap(), 0, b"k1", b"v1").unwrap();
        let view = out.as_node().unwrap();
        assert_eq!(view.kind(), NodeKind::Leaf);
        assert_eq!(view.count(), 1);
        assert_eq!(view.key(0).unwrap(), b"k1");
        assert_eq!(view.value(0).unwrap(), b"v1");
    }

    #[test]
    fn insert_keeps_prefix_and_suffix() {
        let old = leaf(&[(b"a", b"1"), (b"c", b"333")]);
        let mut out = NodeBuf::scratch(SCRATCH);
        leaf_insert(&mut out, old.as_node().unwrap(), 1, b"b", b"22").unwrap();
        assert_eq!(
            entries(&out),
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"22".to_vec()),
                (b"c".to_vec(), b"333".to_vec()),
            ]
        );
        // the source buffer is untouched
        assert_eq!(old.as_node().unwrap().count(), 2);
    }

    #[test]
    fn update_replaces_in_place_count() {
        let old = leaf(&[(b"a", b"1"), (b"k1", b"v1"), (b"z", b"")]);
        let mut out = NodeBuf::scratch(SCRATCH);
        leaf_update(&mut out, old.as_node().unwrap(), 1, b"k1", b"a longer value").unwrap();
        let view = out.as_node().unwrap();
        assert_eq!(view.count(), 3);
        assert_eq!(view.value(1).unwrap(), b"a longer value");
        assert_eq!(view.key(2).unwrap(), b"z");
        assert_eq!(
            view.byte_len().unwrap(),
            old.as_node().unwrap().byte_len().unwrap() + 12
        );
    }

    #[test]
    fn update_past_end_is_rejected() {
        let old = leaf(&[(b"a", b"1")]);
        let mut out = NodeBuf::scratch(SCRATCH);
        assert!(matches!(
            leaf_update(&mut out, old.as_node().unwrap(), 1, b"b", b""),
            Err(CowTreeError::IndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn replace_child_splices_links() {
        let left = leaf(&[(b"b", b"")]);
        let mid = leaf(&[(b"d", b"")]);
        let right = leaf(&[(b"f", b"")]);
        let mut parent = NodeBuf::scratch(SCRATCH);
        parent.set_header(NodeKind::Internal, 3).unwrap();
        append_record(&mut parent, 0, PageId(10), b"a", b"").unwrap();
        append_record(&mut parent, 1, PageId(11), b"c", b"").unwrap();
        append_record(&mut parent, 2, PageId(12), b"x", b"").unwrap();

        let links = [
            ChildLink {
                page: PageId(20),
                node: left.as_node().unwrap(),
            },
            ChildLink {
                page: PageId(21),
                node: mid.as_node().unwrap(),
            },
            ChildLink {
                page: PageId(22),
                node: right.as_node().unwrap(),
            },
        ];
        let mut out = NodeBuf::scratch(SCRATCH);
        replace_child(&mut out, parent.as_node().unwrap(), 1, &links).unwrap();
        let view = out.as_node().unwrap();
        assert_eq!(view.kind(), NodeKind::Internal);
        assert_eq!(view.count(), 5);
        let keys: Vec<&[u8]> = (0..5).map(|i| view.key(i).unwrap()).collect();
        assert_eq!(keys, vec![&b"a"[..], b"b", b"d", b"f", b"x"]);
        let ptrs: Vec<u64> = (0..5).map(|i| view.ptr(i).unwrap().0).collect();
        assert_eq!(ptrs, vec![10, 20, 21, 22, 12]);
        assert!((0..5).all(|i| view.value(i).unwrap().is_empty()));
    }

    #[test]
    fn replace_child_requires_links() {
        let mut parent = NodeBuf::scratch(SCRATCH);
        parent.set_header(NodeKind::Internal, 1).unwrap();
        append_record(&mut parent, 0, PageId(1), b"a", b"").unwrap();
        let mut out = NodeBuf::scratch(SCRATCH);
        assert!(matches!(
            replace_child(&mut out, parent.as_node().unwrap(), 0, &[]),
            Err(CowTreeError::Invariant(_))
        ));
    }

    #[test]
    fn scratch_overflow_is_invariant() {
        let old = leaf(&[(b"a", &[7u8; 200])]);
        let mut out = NodeBuf::scratch(300);
        let err = leaf_insert(&mut out, old.as_node().unwrap(), 1, b"b", &[8u8; 200]).unwrap_err();
        assert!(matches!(err, CowTreeError::Invariant(_)));
    }
}
