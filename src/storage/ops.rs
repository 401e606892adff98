//! Copy-on-write node mutations.
//!
//! Each operation writes a brand-new node into `buf` and returns the view over
//! it; the input node is never touched. The result may be larger than a page
//! (write into a `PageBuf::scratch()` when that can happen) and it is the
//! caller's job to `split` it before committing.
use super::btree::NodeView;
use super::kv::Kv;
use super::writer::NodeWriter;
use super::{HEADER_SIZE, PAGE_SIZE};
use crate::errors::Error;
use tracing::trace;

/// Inserts `(key, val)` at `idx`, or replaces the record at `idx` if its key
/// is exactly `key`, so keys stay unique.
///
/// A true insert yields `key_count + 1` records, a replace keeps the count.
///
/// # Errors
/// `Error::OversizedRecord` if the record cannot fit a page on its own.
///
/// # Panics
/// Panics if `idx > node.key_count()`. Callers derive `idx` from the same
/// node, so an out-of-range index is a broken invariant, not bad input.
pub fn insert_or_replace<'b>(
    buf: &'b mut [u8],
    node: &NodeView<'_>,
    idx: u16,
    key: &[u8],
    val: &[u8],
) -> Result<NodeView<'b>, Error> {
    let n = node.key_count();
    assert!(idx <= n, "insert index {} out of range 0..={}", idx, n);
    debug_assert!(idx == 0 || node.key(idx - 1) <= key, "insert breaks key order");
    debug_assert!(idx == n || key <= node.key(idx), "insert breaks key order");

    let kv = Kv::new(key, val);
    if HEADER_SIZE + kv.encoded_size() > PAGE_SIZE {
        return Err(err!(
            OversizedRecord,
            "Record of {} bytes cannot fit a {} byte page",
            kv.size(),
            PAGE_SIZE
        ));
    }
    if idx < n && node.key(idx) == key {
        trace!(idx, "Replacing a record...");
        let mut w = NodeWriter::with_header_from(buf, node, n)?;
        w.push_kvs(node.kvs(), 0, idx)?
            .push_kv(kv)?
            .push_kvs(node.kvs(), idx + 1, n)?;
        return w.finish();
    }

    trace!(idx, "Inserting a record...");
    let mut w = NodeWriter::with_header_from(buf, node, n + 1)?;
    w.push_kvs(node.kvs(), 0, idx)?
        .push_kv(kv)?
        .push_kvs(node.kvs(), idx, n)?;
    w.finish()
}

/// Upserts `(key, val)` into a leaf, locating the position itself.
///
/// Unlike `lookup_le` this also handles a key smaller than every key in the
/// node and an empty node.
pub fn leaf_upsert<'b>(
    buf: &'b mut [u8],
    node: &NodeView<'_>,
    key: &[u8],
    val: &[u8],
) -> Result<NodeView<'b>, Error> {
    let idx = match node.search(key) {
        Ok(idx) | Err(idx) => idx,
    };
    insert_or_replace(buf, node, idx, key, val)
}

/// Replaces the record at `idx` with `entries`.
///
/// Used when a child split into `entries.len()` pages and its one separator
/// must become one separator per page. `entries` must be sorted and fit
/// between the neighbours of `idx`. The result holds
/// `key_count - 1 + entries.len()` records.
///
/// # Panics
/// Panics if `idx >= node.key_count()` or `entries` is empty.
pub fn replace_children<'b>(
    buf: &'b mut [u8],
    node: &NodeView<'_>,
    idx: u16,
    entries: &[Kv<'_>],
) -> Result<NodeView<'b>, Error> {
    let n = node.key_count();
    assert!(idx < n, "child index {} out of range 0..{}", idx, n);
    assert!(!entries.is_empty(), "a child is replaced by at least one page");
    debug_assert!(entries.windows(2).all(|w| w[0].key < w[1].key));

    let count = u16::try_from(n as usize - 1 + entries.len())
        .map_err(|_| err!(Overflow, "Node would hold more than {} records", u16::MAX))?;
    trace!(idx, replaced_by = entries.len(), "Replacing a child pointer...");

    let mut w = NodeWriter::with_header_from(buf, node, count)?;
    w.push_kvs(node.kvs(), 0, idx)?;
    for kv in entries {
        w.push_kv(*kv)?;
    }
    w.push_kvs(node.kvs(), idx + 1, n)?;
    w.finish()
}
