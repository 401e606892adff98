//! Indexed access to the packed, offset-addressed records of one node.
use super::cursor::ReadCursor;
use super::pager::PageId;
use super::{CHILD_ID_SIZE, HEADER_SIZE, OFFSET_SIZE, RECORD_HEADER_SIZE};
use crate::errors::Error;

/// One key/value record, borrowed from a page or from the caller.
///
/// For an internal node the value holds the little-endian id of the child
/// page responsible for all keys greater than or equal to `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kv<'a> {
    pub key: &'a [u8],
    pub val: &'a [u8],
}

impl<'a> Kv<'a> {
    pub fn new(key: &'a [u8], val: &'a [u8]) -> Self {
        Self { key, val }
    }

    /// Bytes taken by the record body: length prefixes, key and value.
    pub fn size(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.val.len()
    }

    /// Bytes the record adds to a node: its body plus one offset-table slot.
    pub fn encoded_size(&self) -> usize {
        OFFSET_SIZE + self.size()
    }

    /// Decodes the child page id of an internal record.
    pub fn child(&self) -> Result<PageId, Error> {
        let bytes: [u8; CHILD_ID_SIZE] = self.val.try_into().map_err(|_| {
            err!(
                CorruptPage,
                "Child pointer has {} bytes, expected {}",
                self.val.len(),
                CHILD_ID_SIZE
            )
        })?;
        Ok(PageId(u64::from_le_bytes(bytes)))
    }
}

/// A view over the offset table and records of a decoded node.
///
/// Records are decoded on demand; nothing is cached. The offset table is kept
/// as raw bytes since page memory carries no alignment guarantee.
#[derive(Debug, Clone, Copy)]
pub struct KvView<'a> {
    offsets: &'a [u8],
    page: &'a [u8],
}

impl<'a> KvView<'a> {
    /// Wraps an offset table of `offsets.len() / 2` slots over `page`.
    ///
    /// Bounds are validated by node decoding; see `NodeView::decode`.
    pub(crate) fn new(offsets: &'a [u8], page: &'a [u8]) -> Self {
        Self { offsets, page }
    }

    /// Number of records.
    pub fn size(&self) -> u16 {
        (self.offsets.len() / OFFSET_SIZE) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Absolute page offset of record `idx`.
    pub fn offset(&self, idx: u16) -> usize {
        let i = idx as usize * OFFSET_SIZE;
        u16::from_le_bytes([self.offsets[i], self.offsets[i + 1]]) as usize
    }

    /// Decodes record `idx`.
    ///
    /// # Panics
    /// Panics if `idx` is not below `size()`.
    pub fn get(&self, idx: u16) -> Kv<'a> {
        assert!(
            idx < self.size(),
            "record index {} out of range 0..{}",
            idx,
            self.size()
        );
        // Decoding validated every record against the page bounds.
        Self::read_record(self.page, self.offset(idx))
            .unwrap_or_else(|e| unreachable!("record {} failed to decode: {}", idx, e))
    }

    pub(crate) fn read_record(page: &'a [u8], offset: usize) -> Result<Kv<'a>, Error> {
        let mut c = ReadCursor::at(page, offset);
        let klen = c.read_u16()? as usize;
        let vlen = c.read_u16()? as usize;
        Ok(Kv {
            key: c.read_bytes(klen)?,
            val: c.read_bytes(vlen)?,
        })
    }

    /// Absolute offset one past the end of record `idx`.
    pub fn end(&self, idx: u16) -> usize {
        self.offset(idx) + self.get(idx).size()
    }

    /// Contiguous bytes of records `[start, end)`, length prefixes included.
    pub fn span(&self, start: u16, end: u16) -> &'a [u8] {
        assert!(start <= end && end <= self.size());
        if start == end {
            return &[];
        }
        &self.page[self.offset(start)..self.end(end - 1)]
    }

    /// The whole KV region: offset table followed by every record.
    pub fn as_bytes(&self) -> &'a [u8] {
        match self.size() {
            0 => &self.page[HEADER_SIZE..HEADER_SIZE],
            n => &self.page[HEADER_SIZE..self.end(n - 1)],
        }
    }

    /// Size of the KV region if written to a page.
    pub fn size_bytes(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Kv<'a>> + 'a {
        let kvs = *self;
        (0..kvs.size()).map(move |i| kvs.get(i))
    }
}
