//! The B-Tree node: decoding a page into a read-only view and locating keys in it.
//!
//! Nodes with children are called "internal" nodes. Both kinds share one
//! encoding and differ only in what a record's value means:
//!
//! | **Property**       | **Internal Node**                   | **Leaf Node**        |
//! |--------------------|-------------------------------------|----------------------|
//! | **Stores**         | keys and pointers to children       | keys and values      |
//! | **Record value**   | 8-byte child page id                | the stored payload   |
//! | **Key purpose**    | separator: child holds keys ≥ it    | paired with value    |
//!
//! A `NodeView` borrows the page bytes and owns nothing. It stays valid for as
//! long as the page it was decoded from is neither released nor reused.
use super::cursor::ReadCursor;
use super::kv::{Kv, KvView};
use super::pager::PageId;
use super::writer::NodeWriter;
use super::{HEADER_SIZE, OFFSET_SIZE, PAGE_SIZE};
use crate::errors::Error;
use std::cmp::Ordering;
use std::fmt;

/// Represents the type of a B-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An internal node containing separator keys and child pointers.
    Internal,
    /// A leaf node containing key-value pairs.
    Leaf,
}

impl NodeKind {
    pub fn tag(self) -> u16 {
        match self {
            NodeKind::Internal => 1,
            NodeKind::Leaf => 2,
        }
    }

    pub fn from_tag(tag: u16) -> Result<Self, Error> {
        match tag {
            1 => Ok(NodeKind::Internal),
            2 => Ok(NodeKind::Leaf),
            invalid => Err(err!(CorruptPage, "Invalid node kind: {}", invalid)),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Internal => write!(f, "Internal"),
            NodeKind::Leaf => write!(f, "Leaf"),
        }
    }
}

/// A decoded node: header fields plus a view of its records.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    kind: NodeKind,
    key_count: u16,
    kvs: KvView<'a>,
}

impl<'a> NodeView<'a> {
    /// Decodes a node from the start of `page`.
    ///
    /// Every structural bound is checked before it is trusted: the offset table
    /// must lie inside the buffer, the first record must start right after it,
    /// and each record must end inside the buffer exactly where the next one
    /// starts. No bytes are copied.
    ///
    /// # Errors
    /// Returns `Error::CorruptPage` on an unknown kind tag, an offset pointing
    /// outside the buffer or a truncated record.
    pub fn decode(page: &'a [u8]) -> Result<Self, Error> {
        let mut c = ReadCursor::new(page);
        let kind = NodeKind::from_tag(c.read_u16()?)?;
        let key_count = c.read_u16()?;
        let offsets = c
            .read_bytes(key_count as usize * OFFSET_SIZE)
            .map_err(|_| {
                err!(
                    CorruptPage,
                    "Offset table of {} entries exceeds buffer size {}",
                    key_count,
                    page.len()
                )
            })?;

        let kvs = KvView::new(offsets, page);
        let mut expected = c.position();
        for i in 0..key_count {
            let offset = kvs.offset(i);
            if offset != expected {
                return Err(err!(
                    CorruptPage,
                    "Record {} starts at offset {}, expected {}",
                    i,
                    offset,
                    expected
                ));
            }
            let kv = KvView::read_record(page, offset)
                .map_err(|_| err!(CorruptPage, "Record {} at offset {} is truncated", i, offset))?;
            expected = offset + kv.size();
        }

        Ok(Self {
            kind,
            key_count,
            kvs,
        })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn key_count(&self) -> u16 {
        self.key_count
    }

    pub fn kvs(&self) -> &KvView<'a> {
        &self.kvs
    }

    pub fn kv(&self, idx: u16) -> Kv<'a> {
        self.kvs.get(idx)
    }

    pub fn key(&self, idx: u16) -> &'a [u8] {
        self.kvs.get(idx).key
    }

    pub fn first_key(&self) -> Option<&'a [u8]> {
        (self.key_count > 0).then(|| self.key(0))
    }

    /// Child page id stored in record `idx` of an internal node.
    pub fn child(&self, idx: u16) -> Result<PageId, Error> {
        if self.kind != NodeKind::Internal {
            return Err(err!(
                InvalidOperation,
                "Child pointer requested from a {} node",
                self.kind
            ));
        }
        self.kv(idx).child()
    }

    pub fn iter(&self) -> impl Iterator<Item = Kv<'a>> + 'a {
        self.kvs.iter()
    }

    /// Encoded size: header, offset table and every record.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.kvs.size_bytes()
    }

    /// Whether the node can be committed as a single page.
    pub fn fits(&self) -> bool {
        self.size() <= PAGE_SIZE
    }

    /// Returns the index of the rightmost record whose key is ≤ `key`.
    ///
    /// Precondition: the node is not empty and its first key is ≤ `key`. A
    /// parent only descends into a child whose keyspace covers the key, so
    /// this holds by construction; otherwise 0 is returned.
    ///
    /// An exact match returns the index of the equal record itself.
    pub fn lookup_le(&self, key: &[u8]) -> u16 {
        debug_assert!(self.key_count > 0, "lookup in an empty node");
        let mut min = 0;
        let mut max = self.key_count;
        // invariant: key(i) <= key for i < min, key(i) > key for i >= max
        while min < max {
            let mid = min + (max - min) / 2;
            if self.key(mid) <= key {
                min = mid + 1;
            } else {
                max = mid;
            }
        }
        min.saturating_sub(1)
    }

    /// Finds a key with binary search.
    ///
    /// Returns `Ok(idx)` of the equal record or `Err(idx)` with the position
    /// where `key` would be inserted to keep the records sorted.
    pub fn search(&self, key: &[u8]) -> Result<u16, u16> {
        let mut min = 0;
        let mut max = self.key_count;
        while min < max {
            let mid = min + (max - min) / 2;
            match self.key(mid).cmp(key) {
                Ordering::Equal => return Ok(mid),
                Ordering::Less => min = mid + 1,
                Ordering::Greater => max = mid,
            }
        }
        Err(min)
    }

    /// Copies this node into `buf` and returns the view over the copy.
    ///
    /// This is how a node built in a scratch buffer moves into a store page.
    pub fn write_to<'b>(&self, buf: &'b mut [u8]) -> Result<NodeView<'b>, Error> {
        let mut w = NodeWriter::with_header_from(buf, self, self.key_count)?;
        w.push_kvs(&self.kvs, 0, self.key_count)?;
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SCRATCH_SIZE;

    fn leaf<'b>(buf: &'b mut [u8], kvs: &[(&[u8], &[u8])]) -> NodeView<'b> {
        let mut w = NodeWriter::new(buf, NodeKind::Leaf, kvs.len() as u16).unwrap();
        for (k, v) in kvs {
            w.push_kv(Kv::new(k, v)).unwrap();
        }
        w.finish().unwrap()
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let page = [3u8, 0, 0, 0];
        let err = NodeView::decode(&page).unwrap_err();
        assert_eq!(err.code(), 2000);
        assert!(err.to_string().contains("Invalid node kind: 3"));
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        assert!(NodeView::decode(&[2u8, 0, 1]).is_err());
        assert!(NodeView::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_offsets_outside_page() {
        // Claims 4 records but the buffer ends inside the offset table.
        let page = [2u8, 0, 4, 0, 12, 0];
        assert_eq!(NodeView::decode(&page).unwrap_err().code(), 2000);

        // One record whose offset points past the end of the page.
        let page = [2u8, 0, 1, 0, 0xFF, 0x0F];
        assert_eq!(NodeView::decode(&page).unwrap_err().code(), 2000);
    }

    #[test]
    fn test_decode_rejects_truncated_record() {
        // key_len claims 10 bytes, only 2 present.
        let page = [2u8, 0, 1, 0, 6, 0, 10, 0, 0, 0, b'a', b'b'];
        assert_eq!(NodeView::decode(&page).unwrap_err().code(), 2000);
    }

    #[test]
    fn test_decode_rejects_gaps_between_records() {
        let mut buf = [0u8; 64];
        leaf(&mut buf, &[(b"a", b"1"), (b"b", b"2")]);
        // Point the second offset one byte further.
        buf[6] += 1;
        assert_eq!(NodeView::decode(&buf).unwrap_err().code(), 2000);
    }

    #[test]
    fn test_empty_node() {
        let page = [1u8, 0, 0, 0];
        let node = NodeView::decode(&page).unwrap();
        assert_eq!(node.kind(), NodeKind::Internal);
        assert_eq!(node.key_count(), 0);
        assert_eq!(node.size(), HEADER_SIZE);
        assert_eq!(node.first_key(), None);
        assert_eq!(node.search(b"x"), Err(0));
    }

    #[test]
    fn test_lookup_scenario() {
        let mut buf = [0u8; PAGE_SIZE];
        let node = leaf(&mut buf, &[(b"a", b"1"), (b"c", b"3"), (b"e", b"5")]);
        assert_eq!(node.lookup_le(b"d"), 1);
        assert_eq!(node.lookup_le(b"c"), 1);
        assert_eq!(node.lookup_le(b"a"), 0);
        assert_eq!(node.lookup_le(b"e"), 2);
        assert_eq!(node.lookup_le(b"zz"), 2);
        assert_eq!(node.lookup_le(b"b"), 0);
    }

    #[test]
    fn test_lookup_matches_linear_scan() {
        let keys: Vec<Vec<u8>> = (0..50u32).map(|i| format!("k{:03}", i * 2).into_bytes()).collect();
        let kvs: Vec<(&[u8], &[u8])> = keys.iter().map(|k| (k.as_slice(), &b"v"[..])).collect();
        let mut buf = [0u8; PAGE_SIZE];
        let node = leaf(&mut buf, &kvs);

        for n in 0..101u32 {
            let q = format!("k{:03}", n).into_bytes();
            let linear = (0..node.key_count())
                .filter(|i| node.key(*i) <= q.as_slice())
                .last()
                .unwrap();
            assert_eq!(node.lookup_le(&q), linear, "key {:?}", q);
        }
    }

    #[test]
    fn test_search() {
        let mut buf = [0u8; PAGE_SIZE];
        let node = leaf(&mut buf, &[(b"b", b""), (b"d", b""), (b"f", b"")]);
        assert_eq!(node.search(b"d"), Ok(1));
        assert_eq!(node.search(b"a"), Err(0));
        assert_eq!(node.search(b"e"), Err(2));
        assert_eq!(node.search(b"g"), Err(3));
    }

    #[test]
    fn test_child_requires_internal() {
        let mut buf = [0u8; PAGE_SIZE];
        let node = leaf(&mut buf, &[(b"a", b"12345678")]);
        assert_eq!(node.child(0).unwrap_err().code(), 8000);

        let id = 9u64.to_le_bytes();
        let mut buf = [0u8; PAGE_SIZE];
        let mut w = NodeWriter::new(&mut buf, NodeKind::Internal, 1).unwrap();
        w.push_kv(Kv::new(b"", &id)).unwrap();
        let node = w.finish().unwrap();
        assert_eq!(node.child(0).unwrap(), PageId(9));
    }

    #[test]
    fn test_write_to_copies_node() {
        let mut scratch = vec![0u8; SCRATCH_SIZE];
        let node = leaf(&mut scratch, &[(b"a", b"1"), (b"b", b"2")]);
        let mut page = [0u8; PAGE_SIZE];
        let copy = node.write_to(&mut page).unwrap();
        assert_eq!(copy.kind(), NodeKind::Leaf);
        assert_eq!(copy.iter().collect::<Vec<_>>(), node.iter().collect::<Vec<_>>());
        assert_eq!(copy.size(), node.size());
    }
}
