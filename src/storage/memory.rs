//! An in-memory page store.
//!
//! Ids are handed out from a counter and never reused, so releasing a page
//! twice is harmless.
use super::pager::{check_committable, Page, PageBuf, PageId, PageStore};
use crate::errors::Error;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: HashMap<PageId, Page>,
    next_id: u64,
    capacity: Option<usize>,
    allocations: usize,
    releases: usize,
}

impl MemoryStore {
    /// A store without a page limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding at most `capacity` committed pages at a time.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Number of committed pages not yet released.
    pub fn live_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.pages.contains_key(&id)
    }

    /// Total number of successful `allocate` calls.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Total number of pages actually released by `deallocate`.
    pub fn releases(&self) -> usize {
        self.releases
    }

    fn check_capacity(&self) -> Result<(), Error> {
        match self.capacity {
            Some(capacity) if self.pages.len() >= capacity => Err(err!(
                OutOfSpace,
                "Memory store is full ({} of {} pages)",
                self.pages.len(),
                capacity
            )),
            _ => Ok(()),
        }
    }
}

impl PageStore for MemoryStore {
    fn get(&self, id: PageId) -> Result<Page, Error> {
        self.pages
            .get(&id)
            .cloned()
            .ok_or_else(|| err!(NotFound, "Memory page {} not found.", id))
    }

    fn allocate(&mut self) -> Result<PageBuf, Error> {
        self.check_capacity()?;
        self.allocations += 1;
        trace!(allocations = self.allocations, "Allocated a page.");
        Ok(PageBuf::new())
    }

    fn commit(&mut self, buf: PageBuf) -> Result<PageId, Error> {
        check_committable(&buf)?;
        self.check_capacity()?;
        let id = PageId(self.next_id);
        self.next_id += 1;
        self.pages.insert(id, buf.freeze());
        debug!(page = id.0, "Committed page.");
        Ok(id)
    }

    fn deallocate(&mut self, id: PageId) -> Result<(), Error> {
        if self.pages.remove(&id).is_some() {
            self.releases += 1;
            debug!(page = id.0, "Released page.");
        }
        Ok(())
    }
}
