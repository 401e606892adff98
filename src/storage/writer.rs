//! Incremental serialization of a new node into a caller-supplied buffer.
//!
//! A node is valid iff it round-trips through decode, so `finish` re-decodes
//! what was written instead of trusting the writer's own bookkeeping.
use super::btree::{NodeKind, NodeView};
use super::cursor::WriteCursor;
use super::kv::{Kv, KvView};
use super::{HEADER_SIZE, OFFSET_SIZE};
use crate::errors::Error;

#[derive(Debug)]
pub struct NodeWriter<'a> {
    mem: WriteCursor<'a>,
    kind: NodeKind,
    key_count: u16,
    cur_idx: u16,
    cur_offset: usize,
}

impl<'a> NodeWriter<'a> {
    /// Starts a node of `kind` that will hold exactly `key_count` records.
    ///
    /// The header is written immediately; records follow the offset table.
    ///
    /// # Errors
    /// Returns `Error::Overflow` if the header and offset table alone do not
    /// fit `buf`.
    pub fn new(buf: &'a mut [u8], kind: NodeKind, key_count: u16) -> Result<Self, Error> {
        let mut mem = WriteCursor::new(buf);
        let cur_offset = HEADER_SIZE + key_count as usize * OFFSET_SIZE;
        if cur_offset > mem.capacity() {
            return Err(err!(
                Overflow,
                "Offset table of {} entries exceeds buffer size {}",
                key_count,
                mem.capacity()
            ));
        }
        mem.write_u16(kind.tag())?.write_u16(key_count)?;

        Ok(Self {
            mem,
            kind,
            key_count,
            cur_idx: 0,
            cur_offset,
        })
    }

    /// Starts a node with the same header kind as `node`.
    pub fn with_header_from(
        buf: &'a mut [u8],
        node: &NodeView<'_>,
        key_count: u16,
    ) -> Result<Self, Error> {
        Self::new(buf, node.kind(), key_count)
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Bytes written so far, header and full offset table included.
    pub fn size(&self) -> usize {
        self.cur_offset
    }

    /// Appends one record.
    ///
    /// Records must be pushed in strictly ascending key order.
    ///
    /// # Panics
    /// Panics if more records are pushed than announced to `new`.
    pub fn push_kv(&mut self, kv: Kv<'_>) -> Result<&mut Self, Error> {
        assert!(
            self.cur_idx < self.key_count,
            "node writer holds {} records",
            self.key_count
        );
        let klen = record_len(kv.key, "key")?;
        let vlen = record_len(kv.val, "value")?;
        let offset = self.slot_offset()?;

        let slot = HEADER_SIZE + self.cur_idx as usize * OFFSET_SIZE;
        self.mem.seek(slot).write_u16(offset)?;
        self.mem
            .seek(self.cur_offset)
            .write_u16(klen)?
            .write_u16(vlen)?
            .write_bytes(kv.key)?
            .write_bytes(kv.val)?;

        self.cur_offset += kv.size();
        self.cur_idx += 1;
        Ok(self)
    }

    /// Appends records `[start, end)` of `kvs` with a single copy of their bytes.
    ///
    /// The records are packed in the source, so the run is contiguous; only the
    /// offset table entries need to be rebased onto the new position.
    pub fn push_kvs(&mut self, kvs: &KvView<'_>, start: u16, end: u16) -> Result<&mut Self, Error> {
        let count = end.saturating_sub(start);
        assert!(
            self.cur_idx as usize + count as usize <= self.key_count as usize,
            "node writer holds {} records",
            self.key_count
        );
        if count == 0 {
            return Ok(self);
        }

        let bytes = kvs.span(start, end);
        let base = kvs.offset(start);
        self.mem.seek(self.cur_offset).write_bytes(bytes)?;

        for i in start..end {
            let offset = self.slot_offset_at(self.cur_offset + kvs.offset(i) - base)?;
            let slot = HEADER_SIZE + self.cur_idx as usize * OFFSET_SIZE;
            self.mem.seek(slot).write_u16(offset)?;
            self.cur_idx += 1;
        }

        self.cur_offset += bytes.len();
        Ok(self)
    }

    /// Finishes the node and decodes it from the buffer it was written to.
    ///
    /// # Panics
    /// Panics if fewer records were pushed than announced to `new`.
    pub fn finish(self) -> Result<NodeView<'a>, Error> {
        assert_eq!(
            self.cur_idx, self.key_count,
            "node writer finished with missing records"
        );
        let buf: &'a [u8] = self.mem.into_inner();
        NodeView::decode(buf)
    }

    fn slot_offset(&self) -> Result<u16, Error> {
        self.slot_offset_at(self.cur_offset)
    }

    fn slot_offset_at(&self, offset: usize) -> Result<u16, Error> {
        u16::try_from(offset)
            .map_err(|_| err!(Overflow, "Record offset {} does not fit an offset slot", offset))
    }
}

fn record_len(bytes: &[u8], what: &str) -> Result<u16, Error> {
    u16::try_from(bytes.len()).map_err(|_| {
        err!(
            OversizedRecord,
            "A {} of {} bytes exceeds the record length limit",
            what,
            bytes.len()
        )
    })
}
