//! Partitioning of oversized nodes into page-sized pieces.

use smallvec::{smallvec, SmallVec};

use super::mutate::append_range;
use super::node::{NodeBuf, NodeRef, HEADER_LEN, OFFSET_LEN, POINTER_LEN};
use crate::types::{CowTreeError, Result};

/// Up to three page-sized nodes produced by [`split`], in key order.
pub type SplitNodes = SmallVec<[NodeBuf; 3]>;

/// Bytes taken by entries `[from, count)` if they formed a node of their own.
fn suffix_len(node: NodeRef<'_>, from: usize) -> Result<usize> {
    let count = node.count();
    let records = node.offset(count)? - node.offset(from)?;
    Ok(HEADER_LEN + (POINTER_LEN + OFFSET_LEN) * (count - from) + records)
}

/// Bytes taken by entries `[0, upto)` if they formed a node of their own.
fn prefix_len(node: NodeRef<'_>, upto: usize) -> Result<usize> {
    Ok(HEADER_LEN + (POINTER_LEN + OFFSET_LEN) * upto + node.offset(upto)?)
}

/// Splits `old` in two, choosing the split point by bytes.
///
/// Starting at the entry midpoint, the split point moves right until the
/// right half fits in one page, then moves left while the left half is still
/// oversized and the right half keeps fitting. The right half always fits;
/// when the left half does not, the right half is the longest suffix that
/// fits. The left half is sized for up to two pages.
fn split_in_two(old: NodeRef<'_>, page_size: usize) -> Result<(NodeBuf, NodeBuf)> {
    let count = old.count();
    if count < 2 {
        return Err(CowTreeError::invariant("single record node exceeds one page"));
    }
    let mut nleft = count / 2;
    while nleft < count - 1 && suffix_len(old, nleft)? > page_size {
        nleft += 1;
    }
    while nleft > 1
        && prefix_len(old, nleft)? > page_size
        && suffix_len(old, nleft - 1)? <= page_size
    {
        nleft -= 1;
    }
    let nright = count - nleft;
    if suffix_len(old, nleft)? > page_size {
        return Err(CowTreeError::invariant("last record exceeds one page"));
    }

    let mut left = NodeBuf::scratch(2 * page_size);
    left.set_header(old.kind(), nleft)?;
    append_range(&mut left, old, 0, 0, nleft)?;

    let mut right = NodeBuf::scratch(page_size);
    right.set_header(old.kind(), nright)?;
    append_range(&mut right, old, 0, nleft, nright)?;
    Ok((left, right))
}

/// Returns `node` as one to three nodes that each fit in `page_size` bytes.
///
/// The concatenated keys of the outputs equal the keys of `node`.
pub fn split(node: NodeBuf, page_size: usize) -> Result<SplitNodes> {
    if node.byte_len()? <= page_size {
        return Ok(smallvec![node]);
    }

    let (left, right) = split_in_two(node.as_node()?, page_size)?;
    if left.byte_len()? <= page_size {
        tracing::trace!(
            target: "cowtree::btree::split",
            left = left.count(),
            right = right.count(),
            "split node in two"
        );
        return Ok(smallvec![left, right]);
    }

    let (leftleft, middle) = split_in_two(left.as_node()?, page_size)?;
    if leftleft.byte_len()? > page_size {
        return Err(CowTreeError::invariant("node still exceeds one page after a three-way split"));
    }
    tracing::trace!(
        target: "cowtree::btree::split",
        left = leftleft.count(),
        middle = middle.count(),
        right = right.count(),
        "split node in three"
    );
    Ok(smallvec![leftleft, middle, right])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::mutate::append_record;
    use crate::storage::btree::node::NodeKind;
    use crate::types::PageId;

    const PAGE: usize = 4096;

    fn leaf_of(entries: &[(Vec<u8>, Vec<u8>)]) -> NodeBuf {
        let mut node = NodeBuf::scratch(2 * PAGE);
        node.set_header(NodeKind::Leaf, entries.len()).unwrap();
        for (i, (k, v)) in entries.iter().enumerate() {
            append_record(&mut node, i, PageId::NONE, k, v).unwrap();
        }
        node
    }

    fn keys(nodes: &SplitNodes) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for node in nodes {
            let view = node.as_node().unwrap();
            for i in 0..view.count() {
                out.push(view.key(i).unwrap().to_vec());
            }
        }
        out
    }

    #[test]
    fn small_node_is_returned_unchanged() {
        let entries = vec![(b"a".to_vec(), b"1".to_vec())];
        let parts = split(leaf_of(&entries), PAGE).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(keys(&parts), vec![b"a".to_vec()]);
    }

    #[test]
    fn overfull_leaf_splits_in_two() {
        // 100 records of 64 bytes: larger than one page, smaller than two
        let entries: Vec<_> = (0..100u32)
            .map(|i| (format!("key-{i:016}").into_bytes(), vec![b'v'; 40]))
            .collect();
        let node = leaf_of(&entries);
        assert!(node.byte_len().unwrap() > PAGE);
        let parts = split(node, PAGE).unwrap();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert!(part.byte_len().unwrap() <= PAGE);
            assert_eq!(part.as_node().unwrap().kind(), NodeKind::Leaf);
        }
        let expected: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys(&parts), expected);
    }

    #[test]
    fn large_records_split_in_three() {
        let entries = vec![
            (b"a".to_vec(), vec![1u8; 100]),
            (b"b".to_vec(), vec![2u8; 2500]),
            (b"c".to_vec(), vec![3u8; 2500]),
            (b"d".to_vec(), vec![4u8; 2500]),
        ];
        let node = leaf_of(&entries);
        let parts = split(node, PAGE).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.byte_len().unwrap() <= PAGE));
        assert_eq!(
            keys(&parts),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
        );
    }

    #[test]
    fn right_half_is_kept_within_a_page() {
        let entries = vec![
            (b"a".to_vec(), vec![0u8; 10]),
            (b"b".to_vec(), vec![0u8; 10]),
            (b"c".to_vec(), vec![0u8; 3000]),
            (b"d".to_vec(), vec![0u8; 3000]),
        ];
        let parts = split(leaf_of(&entries), PAGE).unwrap();
        assert!(parts.iter().all(|p| p.byte_len().unwrap() <= PAGE));
        assert_eq!(keys(&parts).len(), 4);
    }

    #[test]
    fn large_records_at_the_front_split_by_bytes() {
        let mut entries = vec![
            (b"a".to_vec(), vec![1u8; 3000]),
            (b"b".to_vec(), vec![2u8; 3000]),
        ];
        for key in b'c'..=b'h' {
            entries.push((vec![key], vec![0u8; 10]));
        }
        let parts = split(leaf_of(&entries), PAGE).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.byte_len().unwrap() <= PAGE));
        assert_eq!(parts[0].count(), 1);
        let expected: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys(&parts), expected);
    }

    #[test]
    fn isolated_large_record_gets_its_own_page() {
        let entries = vec![
            (b"a".to_vec(), vec![1u8; 2000]),
            (b"b".to_vec(), vec![2u8; 4000]),
            (b"c".to_vec(), vec![3u8; 2000]),
        ];
        let parts = split(leaf_of(&entries), PAGE).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.count() == 1 && p.byte_len().unwrap() <= PAGE));
    }

    #[test]
    fn single_oversized_record_is_fatal() {
        let mut node = NodeBuf::scratch(2 * PAGE);
        node.set_header(NodeKind::Leaf, 1).unwrap();
        append_record(&mut node, 0, PageId::NONE, b"k", &vec![0u8; 5000]).unwrap();
        let err = split(node, PAGE).unwrap_err();
        assert!(err.is_fatal());
    }
}
