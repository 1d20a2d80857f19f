use serde::{Deserialize, Serialize};

use super::node::{HEADER_LEN, OFFSET_LEN, POINTER_LEN, RECORD_HEADER_LEN};
use crate::types::{CowTreeError, Result};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Default maximum key length in bytes.
pub const DEFAULT_MAX_KEY_SIZE: usize = 1000;
/// Default maximum value length in bytes.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 3000;

/// Largest page size whose two-page scratch buffer is still addressable by u16 offsets.
pub const MAX_PAGE_SIZE: usize = 1 << 15;

/// Size limits of a B+ tree.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BTreeOptions {
    /// Size of every page in bytes.
    pub page_size: usize,
    /// Longest key accepted by `insert`.
    pub max_key_size: usize,
    /// Longest value accepted by `insert`.
    pub max_value_size: usize,
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl BTreeOptions {
    /// Bytes needed by a node holding one maximum-size record.
    pub fn max_single_record_node(&self) -> usize {
        HEADER_LEN
            + POINTER_LEN
            + OFFSET_LEN
            + RECORD_HEADER_LEN
            + self.max_key_size
            + self.max_value_size
    }

    /// Bytes needed by an internal node holding three maximum-size separators.
    pub fn max_promoted_root(&self) -> usize {
        HEADER_LEN + 3 * (POINTER_LEN + OFFSET_LEN + RECORD_HEADER_LEN + self.max_key_size)
    }

    /// Checks that the limits describe a tree the split engine can always serve.
    pub fn validate(&self) -> Result<()> {
        if self.page_size > MAX_PAGE_SIZE {
            return Err(CowTreeError::InvalidConfig(format!(
                "page size {} exceeds the {} byte maximum",
                self.page_size, MAX_PAGE_SIZE
            )));
        }
        if self.max_key_size == 0 || self.max_key_size > u16::MAX as usize {
            return Err(CowTreeError::InvalidConfig(format!(
                "max key size {} must be between 1 and {}",
                self.max_key_size,
                u16::MAX
            )));
        }
        if self.max_value_size > u16::MAX as usize {
            return Err(CowTreeError::InvalidConfig(format!(
                "max value size {} exceeds {}",
                self.max_value_size,
                u16::MAX
            )));
        }
        let single = self.max_single_record_node();
        if single > self.page_size {
            return Err(CowTreeError::InvalidConfig(format!(
                "a node with one {}-byte key and one {}-byte value needs {} bytes but pages hold {}",
                self.max_key_size, self.max_value_size, single, self.page_size
            )));
        }
        let root = self.max_promoted_root();
        if root > self.page_size {
            return Err(CowTreeError::InvalidConfig(format!(
                "an internal node with three {}-byte separators needs {} bytes but pages hold {}",
                self.max_key_size, root, self.page_size
            )));
        }
        Ok(())
    }
}
