//! The page-store contract the node algorithms consume.
//!
//! A page is born through `allocate`, written exactly once by a node writer,
//! made durable and visible through `commit`, read any number of times through
//! `get`, and released through `deallocate` once no parent references it.
use super::{PAGE_SIZE, SCRATCH_SIZE};
use crate::errors::Error;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Identifier of a committed page, assigned by the store at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

impl PageId {
    /// Encoding used in the value of an internal record.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An owned, zero-initialized, writable page buffer not yet visible to readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBuf {
    data: Box<[u8]>,
}

impl PageBuf {
    /// A buffer of exactly one page.
    pub fn new() -> Self {
        Self::with_len(PAGE_SIZE)
    }

    /// A buffer large enough for a node that outgrew its page, before it is split.
    ///
    /// Stores refuse to commit scratch buffers.
    pub fn scratch() -> Self {
        Self::with_len(SCRATCH_SIZE)
    }

    fn with_len(len: usize) -> Self {
        Self {
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn is_page_sized(&self) -> bool {
        self.data.len() == PAGE_SIZE
    }

    /// Freezes the buffer into a shared read-only page.
    pub fn freeze(self) -> Page {
        Page(Arc::from(self.data))
    }
}

impl Default for PageBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for PageBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PageBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A committed page: shared, immutable and cheap to clone.
///
/// Node views decoded from a `Page` borrow the page, not the store, so the
/// store stays free for allocation while readers hold on to old pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page(Arc<[u8]>);

impl Page {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Page(Arc::from(bytes))
    }
}

impl Deref for Page {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Page {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Storage of fixed-size pages.
///
/// Calls are synchronous; a backend may block on I/O but the node algorithms
/// impose no cancellation or retry policy of their own.
pub trait PageStore {
    /// Fetches a previously committed page.
    ///
    /// # Errors
    /// `Error::NotFound` for an unknown or released id, `Error::CorruptPage`
    /// if the stored bytes cannot be read back as a whole page.
    fn get(&self, id: PageId) -> Result<Page, Error>;

    /// Reserves a writable page that is neither durable nor visible yet.
    ///
    /// # Errors
    /// `Error::OutOfSpace` if the backend is exhausted.
    fn allocate(&mut self) -> Result<PageBuf, Error>;

    /// Makes a written buffer durable and assigns it an id.
    fn commit(&mut self, buf: PageBuf) -> Result<PageId, Error>;

    /// Releases a page no longer referenced by any live node. Idempotent per id.
    fn deallocate(&mut self, id: PageId) -> Result<(), Error>;
}

pub(crate) fn check_committable(buf: &PageBuf) -> Result<(), Error> {
    if !buf.is_page_sized() {
        return Err(err!(
            InvalidOperation,
            "Cannot commit a buffer of {} bytes, pages are {} bytes",
            buf.len(),
            PAGE_SIZE
        ));
    }
    Ok(())
}
