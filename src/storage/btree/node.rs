//! Fixed-size node pages.
//!
//! ```text
//! +------+-------+--------------------+-------------------+---------+
//! | kind | count | pointers           | offsets           | records |
//! | u16  | u16   | count * u64        | count * u16       | ...     |
//! +------+-------+--------------------+-------------------+---------+
//! record: | klen u16 | vlen u16 | key | value |
//! ```
//!
//! All integers are little-endian. `offsets[i]` is the end of record `i`
//! relative to the start of the record area, so record `i` starts where record
//! `i - 1` ends and record `0` starts at offset zero.

use bytes::Bytes;

use crate::primitives::bytes::le;
use crate::types::{CowTreeError, PageId, Result};

/// Bytes taken by `kind` and `count`.
pub const HEADER_LEN: usize = 4;
/// Bytes per entry in the pointer table.
pub const POINTER_LEN: usize = 8;
/// Bytes per entry in the offset table.
pub const OFFSET_LEN: usize = 2;
/// Bytes of the `klen | vlen` prefix of every record.
pub const RECORD_HEADER_LEN: usize = 4;

const KIND_OFFSET: usize = 0;
const COUNT_OFFSET: usize = 2;

/// Logical kind of a node page.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// Separator keys and child pointers.
    Internal = 1,
    /// Key-value records.
    Leaf = 2,
}

impl NodeKind {
    /// Decodes the on-page kind tag.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::Internal),
            2 => Ok(Self::Leaf),
            _ => Err(CowTreeError::Corruption("unknown btree node kind")),
        }
    }

    /// On-page kind tag.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A key-value record borrowed from a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecordRef<'a> {
    /// Key bytes.
    pub key: &'a [u8],
    /// Value bytes; empty for internal records.
    pub value: &'a [u8],
}

/// Encoded length of a record.
#[inline]
pub fn record_len(key: &[u8], value: &[u8]) -> usize {
    RECORD_HEADER_LEN + key.len() + value.len()
}

/// Writes `klen | vlen | key | value` at the start of `dst` and returns the bytes written.
///
/// The record must fit in `dst`.
pub fn encode_record(dst: &mut [u8], key: &[u8], value: &[u8]) -> Result<usize> {
    let klen =
        u16::try_from(key.len()).map_err(|_| CowTreeError::invariant("key length exceeds u16"))?;
    let vlen = u16::try_from(value.len())
        .map_err(|_| CowTreeError::invariant("value length exceeds u16"))?;
    let len = record_len(key, value);
    if len > dst.len() {
        return Err(CowTreeError::invariant("record exceeds remaining node capacity"));
    }
    le::put_u16(dst, 0, klen).ok_or_else(|| CowTreeError::invariant("record header truncated"))?;
    le::put_u16(dst, 2, vlen).ok_or_else(|| CowTreeError::invariant("record header truncated"))?;
    dst[RECORD_HEADER_LEN..RECORD_HEADER_LEN + key.len()].copy_from_slice(key);
    dst[RECORD_HEADER_LEN + key.len()..len].copy_from_slice(value);
    Ok(len)
}

/// Reads the record at the start of `src`.
pub fn decode_record(src: &[u8]) -> Result<RecordRef<'_>> {
    let klen = le::get_u16(src, 0).ok_or(CowTreeError::Corruption("record header truncated"))?
        as usize;
    let vlen = le::get_u16(src, 2).ok_or(CowTreeError::Corruption("record header truncated"))?
        as usize;
    let key_end = RECORD_HEADER_LEN + klen;
    let end = key_end + vlen;
    if end > src.len() {
        return Err(CowTreeError::Corruption("record extends past node"));
    }
    Ok(RecordRef {
        key: &src[RECORD_HEADER_LEN..key_end],
        value: &src[key_end..end],
    })
}

#[inline]
fn pointer_pos(idx: usize) -> usize {
    HEADER_LEN + POINTER_LEN * idx
}

#[inline]
fn offset_table_pos(count: usize) -> usize {
    HEADER_LEN + POINTER_LEN * count
}

#[inline]
fn records_start(count: usize) -> usize {
    HEADER_LEN + (POINTER_LEN + OFFSET_LEN) * count
}

/// Read-only view of a node stored in a byte buffer.
///
/// Keys and values returned by the accessors borrow from the buffer.
#[derive(Clone, Copy, Debug)]
pub struct NodeRef<'a> {
    buf: &'a [u8],
    kind: NodeKind,
    count: usize,
}

impl<'a> NodeRef<'a> {
    /// Interprets `buf` as a node, validating the kind and the table bounds.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let raw_kind = le::get_u16(buf, KIND_OFFSET)
            .ok_or(CowTreeError::Corruption("node shorter than header"))?;
        let kind = NodeKind::from_u16(raw_kind)?;
        let count = le::get_u16(buf, COUNT_OFFSET)
            .ok_or(CowTreeError::Corruption("node shorter than header"))? as usize;
        if records_start(count) > buf.len() {
            return Err(CowTreeError::Corruption("node tables exceed buffer"));
        }
        let node = Self { buf, kind, count };
        if node.byte_len()? > buf.len() {
            return Err(CowTreeError::Corruption("node records exceed buffer"));
        }
        Ok(node)
    }

    /// Node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the node holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Underlying buffer, including any unused tail.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Child pointer of entry `idx`. Leaf records always read back as [`PageId::NONE`].
    pub fn ptr(&self, idx: usize) -> Result<PageId> {
        self.check_index(idx)?;
        le::get_u64(self.buf, pointer_pos(idx))
            .map(PageId)
            .ok_or(CowTreeError::Corruption("pointer table truncated"))
    }

    /// Start of record `idx` relative to the record area; `offset(count)` is the area length.
    pub fn offset(&self, idx: usize) -> Result<usize> {
        if idx == 0 {
            return Ok(0);
        }
        if idx > self.count {
            return Err(CowTreeError::IndexOutOfRange {
                index: idx,
                count: self.count,
            });
        }
        let pos = offset_table_pos(self.count) + OFFSET_LEN * (idx - 1);
        le::get_u16(self.buf, pos)
            .map(usize::from)
            .ok_or(CowTreeError::Corruption("offset table truncated"))
    }

    /// Absolute position of record `idx` in the buffer.
    pub fn record_pos(&self, idx: usize) -> Result<usize> {
        Ok(records_start(self.count) + self.offset(idx)?)
    }

    /// Number of bytes the node occupies.
    pub fn byte_len(&self) -> Result<usize> {
        self.record_pos(self.count)
    }

    /// Encoded bytes of record `idx`.
    pub fn record_bytes(&self, idx: usize) -> Result<&'a [u8]> {
        self.check_index(idx)?;
        let start = self.record_pos(idx)?;
        let end = self.record_pos(idx + 1)?;
        if start > end || end > self.buf.len() {
            return Err(CowTreeError::Corruption("record extent out of order"));
        }
        Ok(&self.buf[start..end])
    }

    /// Key and value of record `idx`.
    pub fn record(&self, idx: usize) -> Result<RecordRef<'a>> {
        decode_record(self.record_bytes(idx)?)
    }

    /// Key of record `idx`.
    pub fn key(&self, idx: usize) -> Result<&'a [u8]> {
        Ok(self.record(idx)?.key)
    }

    /// Value of record `idx`.
    pub fn value(&self, idx: usize) -> Result<&'a [u8]> {
        Ok(self.record(idx)?.value)
    }

    /// First key of the node, used as the separator in its parent.
    pub fn first_key(&self) -> Result<&'a [u8]> {
        if self.count == 0 {
            return Err(CowTreeError::invariant("empty node has no first key"));
        }
        self.key(0)
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx >= self.count {
            return Err(CowTreeError::IndexOutOfRange {
                index: idx,
                count: self.count,
            });
        }
        Ok(())
    }
}

/// Scratch buffer a new node is built into.
///
/// Scratch buffers are usually larger than a page so that a mutation can
/// overflow before the split engine trims it back down.
#[derive(Clone, Debug)]
pub struct NodeBuf {
    buf: Vec<u8>,
}

impl NodeBuf {
    /// Allocates a zeroed buffer of `capacity` bytes.
    pub fn scratch(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
        }
    }

    /// Capacity of the buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Writes the kind and entry count. Must precede any entry writes.
    pub fn set_header(&mut self, kind: NodeKind, count: usize) -> Result<()> {
        let count =
            u16::try_from(count).map_err(|_| CowTreeError::invariant("node count exceeds u16"))?;
        if records_start(count as usize) > self.buf.len() {
            return Err(CowTreeError::invariant("node tables exceed scratch capacity"));
        }
        le::put_u16(&mut self.buf, KIND_OFFSET, kind.as_u16())
            .ok_or_else(|| CowTreeError::invariant("scratch shorter than header"))?;
        le::put_u16(&mut self.buf, COUNT_OFFSET, count)
            .ok_or_else(|| CowTreeError::invariant("scratch shorter than header"))?;
        Ok(())
    }

    /// Entry count written by [`NodeBuf::set_header`].
    pub fn count(&self) -> usize {
        le::get_u16(&self.buf, COUNT_OFFSET).map_or(0, usize::from)
    }

    /// Sets the child pointer of entry `idx`.
    pub fn set_ptr(&mut self, idx: usize, ptr: PageId) -> Result<()> {
        let count = self.count();
        if idx >= count {
            return Err(CowTreeError::IndexOutOfRange { index: idx, count });
        }
        le::put_u64(&mut self.buf, pointer_pos(idx), ptr.0)
            .ok_or_else(|| CowTreeError::invariant("pointer table exceeds scratch"))
    }

    /// Start of record `idx`, read from the offset table written so far.
    pub(crate) fn offset(&self, idx: usize) -> Result<usize> {
        if idx == 0 {
            return Ok(0);
        }
        let count = self.count();
        if idx > count {
            return Err(CowTreeError::invariant("offset index outside table"));
        }
        let pos = offset_table_pos(count) + OFFSET_LEN * (idx - 1);
        le::get_u16(&self.buf, pos)
            .map(usize::from)
            .ok_or_else(|| CowTreeError::invariant("offset table exceeds scratch"))
    }

    /// Records that record `idx - 1` ends at `end`.
    pub(crate) fn set_offset(&mut self, idx: usize, end: usize) -> Result<()> {
        let count = self.count();
        if idx == 0 || idx > count {
            return Err(CowTreeError::invariant("offset index outside table"));
        }
        let end =
            u16::try_from(end).map_err(|_| CowTreeError::invariant("record offset exceeds u16"))?;
        let pos = offset_table_pos(count) + OFFSET_LEN * (idx - 1);
        le::put_u16(&mut self.buf, pos, end)
            .ok_or_else(|| CowTreeError::invariant("offset table exceeds scratch"))
    }

    /// Absolute position of record `idx`.
    pub(crate) fn record_pos(&self, idx: usize) -> Result<usize> {
        Ok(records_start(self.count()) + self.offset(idx)?)
    }

    /// Mutable tail of the buffer starting at `pos`.
    pub(crate) fn tail_mut(&mut self, pos: usize) -> Result<&mut [u8]> {
        self.buf
            .get_mut(pos..)
            .ok_or_else(|| CowTreeError::invariant("record position beyond scratch"))
    }

    /// Read view of the node built so far.
    pub fn as_node(&self) -> Result<NodeRef<'_>> {
        NodeRef::parse(&self.buf)
    }

    /// Number of bytes the node occupies.
    pub fn byte_len(&self) -> Result<usize> {
        self.record_pos(self.count())
    }

    /// Finalizes the node into an immutable page of exactly `page_size` bytes.
    pub fn freeze(mut self, page_size: usize) -> Result<Bytes> {
        if self.byte_len()? > page_size {
            return Err(CowTreeError::invariant("node does not fit in one page"));
        }
        self.buf.resize(page_size, 0);
        Ok(Bytes::from(self.buf))
    }
}
