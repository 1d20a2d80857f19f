//! Structural integrity checks over a whole tree.

use std::collections::HashSet;

use serde::Serialize;

use super::node::{NodeKind, NodeRef};
use super::tree::BTree;
use crate::types::{PageId, Result};

const MAX_FINDINGS: usize = 32;

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// Page the issue was found on.
    pub page: u64,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected while walking the tree.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Number of levels, leaves included.
    pub height: usize,
    /// Leaf pages reached.
    pub leaf_pages: u64,
    /// Internal pages reached.
    pub internal_pages: u64,
    /// Key-value records stored in leaves.
    pub entries: u64,
    /// Bytes occupied by node contents across all pages.
    pub bytes_used: u64,
}

/// Complete report of a verification walk.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Root page the walk started from.
    pub root: u64,
    /// Whether verification passed without finding any issues.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the pages examined.
    pub counts: VerifyCounts,
}

#[derive(Default)]
struct Walk {
    findings: Vec<VerifyFinding>,
    counts: VerifyCounts,
    visited: HashSet<PageId>,
    leaf_depth: Option<usize>,
    last_key: Option<Vec<u8>>,
}

impl Walk {
    fn push(&mut self, page: PageId, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(VerifyFinding {
                page: page.0,
                message: message.into(),
            });
        }
    }
}

impl BTree {
    /// Walks every page reachable from the root and checks the tree's invariants.
    ///
    /// Checked: nodes decode and fit one page, keys ascend strictly inside
    /// and across leaves, each separator equals its child's first key, all
    /// leaves sit at the same depth, and no page is reachable twice.
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut walk = Walk::default();
        self.verify_page(self.root, 0, None, &mut walk);
        tracing::debug!(
            target: "cowtree::btree::verify",
            root = self.root.0,
            findings = walk.findings.len(),
            leaves = walk.counts.leaf_pages,
            entries = walk.counts.entries,
            "verified tree"
        );
        Ok(VerifyReport {
            root: self.root.0,
            success: walk.findings.is_empty(),
            findings: walk.findings,
            counts: walk.counts,
        })
    }

    fn verify_page(&self, page: PageId, depth: usize, separator: Option<&[u8]>, walk: &mut Walk) {
        if !walk.visited.insert(page) {
            walk.push(page, "page reachable more than once");
            return;
        }
        let bytes = match self.store.get_page(page) {
            Ok(bytes) => bytes,
            Err(err) => {
                walk.push(page, format!("failed to read page: {err}"));
                return;
            }
        };
        let node = match NodeRef::parse(&bytes) {
            Ok(node) => node,
            Err(err) => {
                walk.push(page, format!("failed to decode node: {err}"));
                return;
            }
        };
        walk.counts.height = walk.counts.height.max(depth + 1);

        match node.byte_len() {
            Ok(len) => {
                walk.counts.bytes_used += len as u64;
                if len > self.options.page_size {
                    walk.push(
                        page,
                        format!(
                            "node occupies {len} bytes, page size is {}",
                            self.options.page_size
                        ),
                    );
                }
            }
            Err(err) => walk.push(page, format!("unreadable node size: {err}")),
        }

        let mut keys = Vec::with_capacity(node.count());
        for idx in 0..node.count() {
            match node.key(idx) {
                Ok(key) => keys.push(key),
                Err(err) => {
                    walk.push(page, format!("unreadable record {idx}: {err}"));
                    return;
                }
            }
        }
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            walk.push(page, "keys are not strictly ascending");
        }
        if let (Some(separator), Some(first)) = (separator, keys.first()) {
            if separator != *first {
                walk.push(page, "parent separator differs from first key");
            }
        }

        match node.kind() {
            NodeKind::Leaf => {
                walk.counts.leaf_pages += 1;
                walk.counts.entries += keys.len() as u64;
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        walk.push(page, format!("leaf at depth {depth}, expected {expected}"));
                    }
                    Some(_) => {}
                }
                if keys.is_empty() && depth > 0 {
                    walk.push(page, "empty leaf below the root");
                }
                let overlaps = match (walk.last_key.as_deref(), keys.first()) {
                    (Some(last), Some(first)) => last >= *first,
                    _ => false,
                };
                if overlaps {
                    walk.push(page, "leaf keys overlap the previous leaf");
                }
                if let Some(last) = keys.last() {
                    walk.last_key = Some(last.to_vec());
                }
            }
            NodeKind::Internal => {
                walk.counts.internal_pages += 1;
                if keys.is_empty() {
                    walk.push(page, "internal node without children");
                }
                for (idx, key) in keys.iter().enumerate() {
                    match node.ptr(idx) {
                        Ok(child) => self.verify_page(child, depth + 1, Some(key), walk),
                        Err(err) => walk.push(page, format!("unreadable pointer {idx}: {err}")),
                    }
                }
            }
        }
    }
}
