//! Splitting a node that outgrew its page into two or three pages.
//!
//! The cut points are planned before any page is allocated, so a node that
//! cannot be split (a record larger than a page, or content needing more than
//! three pages) is reported without leaving allocated pages behind.
use super::btree::NodeView;
use super::inline_vec::InlineVec;
use super::kv::KvView;
use super::pager::{PageBuf, PageId, PageStore};
use super::writer::NodeWriter;
use super::{HEADER_SIZE, MAX_SPLIT, PAGE_SIZE};
use crate::errors::Error;
use tracing::{debug, trace, warn};

/// The 1..=3 nodes a split produces, in key order.
pub type SplitResult<'a> = InlineVec<NodeView<'a>, MAX_SPLIT>;

/// Owner of the pages written by a split.
///
/// The node views of a `SplitResult` borrow these buffers. Once the views are
/// dropped, `commit` hands the buffers to the store.
#[derive(Debug, Default)]
pub struct SplitPages {
    bufs: heapless::Vec<PageBuf, MAX_SPLIT>,
}

impl SplitPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub fn bufs(&self) -> &[PageBuf] {
        &self.bufs
    }

    /// Commits every written page, in order, and returns their ids.
    ///
    /// Either every page is committed or none is: if one commit fails, the
    /// pages committed before it are released again.
    pub fn commit<S: PageStore>(
        &mut self,
        store: &mut S,
    ) -> Result<InlineVec<PageId, MAX_SPLIT>, Error> {
        let mut ids: InlineVec<PageId, MAX_SPLIT> = InlineVec::new();
        for buf in std::mem::take(&mut self.bufs) {
            match store.commit(buf) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    release(store, &ids);
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    fn push(&mut self, buf: PageBuf) {
        if self.bufs.push(buf).is_err() {
            unreachable!("a split writes at most {} pages", MAX_SPLIT);
        }
    }
}

/// Releases pages committed by a failed operation, keeping the original error.
pub(crate) fn release<S: PageStore>(store: &mut S, ids: &[PageId]) {
    for id in ids {
        if let Err(e) = store.deallocate(*id) {
            warn!(page = id.0, "Failed to release page: {}", e);
        }
    }
}

/// Encoded size of a node holding records `[start, end)` of `kvs`.
fn range_size(kvs: &KvView<'_>, start: u16, end: u16) -> usize {
    HEADER_SIZE + (start..end).map(|i| kvs.get(i).encoded_size()).sum::<usize>()
}

/// Largest `cutoff` such that records `[start, cutoff)` fit one page.
fn cutoff(kvs: &KvView<'_>, start: u16, end: u16) -> u16 {
    let mut size = HEADER_SIZE;
    let mut cutoff = start;
    while cutoff < end {
        let additional = kvs.get(cutoff).encoded_size();
        if size + additional > PAGE_SIZE {
            break;
        }
        size += additional;
        cutoff += 1;
    }
    cutoff
}

fn check_records(node: &NodeView<'_>) -> Result<(), Error> {
    for (i, kv) in node.iter().enumerate() {
        if HEADER_SIZE + kv.encoded_size() > PAGE_SIZE {
            return Err(err!(
                OversizedRecord,
                "Record {} of {} bytes cannot fit a {} byte page",
                i,
                kv.size(),
                PAGE_SIZE
            ));
        }
    }
    Ok(())
}

/// Plans the ranges of a two-way split; the second range may still be oversized.
fn plan2(node: &NodeView<'_>) -> Result<InlineVec<(u16, u16), MAX_SPLIT>, Error> {
    let n = node.key_count();
    let mut ranges = InlineVec::new();
    if node.fits() {
        ranges.push((0, n));
        return Ok(ranges);
    }
    check_records(node)?;
    let c = cutoff(node.kvs(), 0, n);
    ranges.push((0, c));
    ranges.push((c, n));
    Ok(ranges)
}

/// Plans the ranges of a split into at most three pages that all fit.
fn plan3(node: &NodeView<'_>) -> Result<InlineVec<(u16, u16), MAX_SPLIT>, Error> {
    let two = plan2(node)?;
    if two.len() == 1 {
        return Ok(two);
    }

    let kvs = node.kvs();
    let (first, (start, end)) = (two[0], two[1]);
    if range_size(kvs, start, end) <= PAGE_SIZE {
        return Ok(two);
    }

    let c = cutoff(kvs, start, end);
    if range_size(kvs, c, end) > PAGE_SIZE {
        return Err(err!(
            Overflow,
            "Node of {} bytes needs more than {} pages",
            node.size(),
            MAX_SPLIT
        ));
    }
    let mut ranges = InlineVec::new();
    ranges.extend([first, (start, c), (c, end)]);
    Ok(ranges)
}

fn write_range(buf: &mut [u8], node: &NodeView<'_>, start: u16, end: u16) -> Result<(), Error> {
    let mut w = NodeWriter::with_header_from(buf, node, end - start)?;
    w.push_kvs(node.kvs(), start, end)?;
    w.finish()?;
    Ok(())
}

fn execute<'a, S: PageStore>(
    node: &NodeView<'a>,
    ranges: &[(u16, u16)],
    store: &mut S,
    pages: &'a mut SplitPages,
) -> Result<SplitResult<'a>, Error> {
    pages.bufs.clear();
    for &(start, end) in ranges {
        let mut buf = if range_size(node.kvs(), start, end) <= PAGE_SIZE {
            store.allocate()?
        } else {
            PageBuf::scratch()
        };
        write_range(&mut buf, node, start, end)?;
        trace!(start, end, "Wrote split page.");
        pages.push(buf);
    }

    let pages: &'a SplitPages = pages;
    pages.bufs.iter().map(|buf| NodeView::decode(buf)).collect()
}

/// Splits `node` in two.
///
/// If the node already fits a page it is returned unchanged and nothing is
/// allocated. Otherwise the first page takes the longest prefix of records that
/// fits, and the second takes the rest. The second page is not guaranteed to
/// fit: when it does not, it is written to a scratch buffer, which stores
/// refuse to commit. Use `split` to get pages that are all committable.
///
/// # Errors
/// `Error::OversizedRecord` if a single record cannot fit a page.
pub fn split2<'a, S: PageStore>(
    node: &NodeView<'a>,
    store: &mut S,
    pages: &'a mut SplitPages,
) -> Result<SplitResult<'a>, Error> {
    let ranges = plan2(node)?;
    if ranges.len() == 1 {
        return Ok([*node].into_iter().collect());
    }
    debug!(key_count = node.key_count(), size = node.size(), "Splitting node in two...");
    execute(node, &ranges, store, pages)
}

/// Splits `node` into 1..=3 pages that each fit `PAGE_SIZE`.
///
/// If the node already fits it is returned unchanged and nothing is allocated.
/// Otherwise it runs a two-way split and, if the second half is still too
/// large, splits that half again. This covers a large run of records followed
/// by more data than two pages can hold. Concatenating the records of the
/// returned nodes in order yields the records of `node`.
///
/// # Errors
/// `Error::OversizedRecord` if a single record cannot fit a page, and
/// `Error::Overflow` if the content needs more than three pages. Both are
/// detected before any page is allocated.
pub fn split<'a, S: PageStore>(
    node: &NodeView<'a>,
    store: &mut S,
    pages: &'a mut SplitPages,
) -> Result<SplitResult<'a>, Error> {
    let ranges = plan3(node)?;
    if ranges.len() == 1 {
        return Ok([*node].into_iter().collect());
    }
    debug!(
        key_count = node.key_count(),
        size = node.size(),
        parts = ranges.len(),
        "Splitting node..."
    );
    execute(node, &ranges, store, pages)
}
