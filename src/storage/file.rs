//! A single-file page store.
//!
//! The file is an array of `PAGE_SIZE` slots. Slot 0 holds the superblock,
//! every other slot holds one committed page, and page id `n` lives at byte
//! `n * PAGE_SIZE`. Released slots are held back until the next `flush` and
//! only then join the free list, so a page the durable superblock still
//! reaches is never overwritten.
use super::pager::{check_committable, Page, PageBuf, PageId, PageStore};
use super::PAGE_SIZE;
use crate::errors::Error;
use bincode::{config, Decode, Encode};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

const MAGIC: u32 = 0x434f_5754;
const VERSION: u16 = 1;

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    pub version: u16,
    pub page_size: u32,
    /// Number of slots in the file, the superblock included.
    pub slot_count: u64,
    /// Released slots, reused last-in first-out.
    pub free: Vec<u64>,
    /// Root page of the tree stored in the file, if any.
    pub root: Option<u64>,
}

impl Superblock {
    fn empty() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: PAGE_SIZE as u32,
            slot_count: 1,
            free: Vec::new(),
            root: None,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.magic != MAGIC {
            return Err(err!(CorruptPage, "Not a page file (magic {:#x})", self.magic));
        }
        if self.version != VERSION {
            return Err(err!(CorruptPage, "Unsupported file version {}", self.version));
        }
        if self.page_size as usize != PAGE_SIZE {
            return Err(err!(
                CorruptPage,
                "File uses {}-byte pages, expected {}",
                self.page_size,
                PAGE_SIZE
            ));
        }
        if self.slot_count == 0 {
            return Err(err!(CorruptPage, "Superblock reports no slots"));
        }
        let mut seen = HashSet::with_capacity(self.free.len());
        for &slot in &self.free {
            if slot == 0 || slot >= self.slot_count {
                return Err(err!(
                    CorruptPage,
                    "Free slot {} outside 1..{}",
                    slot,
                    self.slot_count
                ));
            }
            if !seen.insert(slot) {
                return Err(err!(CorruptPage, "Free slot {} listed twice", slot));
            }
        }
        if let Some(root) = self.root {
            if root == 0 || root >= self.slot_count || seen.contains(&root) {
                return Err(err!(CorruptPage, "Root {} is not a live slot", root));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileStore {
    file: File,
    path: PathBuf,
    superblock: Superblock,
    /// Slots released since the last `flush`.
    pending: Vec<u64>,
    capacity: Option<usize>,
}

impl FileStore {
    /// Creates a fresh store at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P, capacity: Option<usize>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let mut store = Self {
            file,
            path,
            superblock: Superblock::empty(),
            pending: Vec::new(),
            capacity,
        };
        store.flush()?;
        info!("Created page file {}.", store.path.display());
        Ok(store)
    }

    /// Opens an existing store, restoring its free list and root from the superblock.
    pub fn open<P: AsRef<Path>>(path: P, capacity: Option<usize>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => err!(CorruptPage, "Page file is missing its superblock"),
            _ => Error::Io(e),
        })?;
        let superblock: Superblock = decode_superblock(&buf)?;
        superblock.validate()?;

        info!(
            "Opened page file {} ({} slots, {} free).",
            path.display(),
            superblock.slot_count,
            superblock.free.len()
        );
        Ok(Self {
            file,
            path,
            superblock,
            pending: Vec::new(),
            capacity,
        })
    }

    /// Opens `path` if it exists, creates it otherwise.
    pub fn open_or_create<P: AsRef<Path>>(path: P, capacity: Option<usize>) -> Result<Self, Error> {
        if path.as_ref().exists() {
            Self::open(path, capacity)
        } else {
            Self::create(path, capacity)
        }
    }

    /// Persists the superblock and syncs the file.
    ///
    /// Slots released since the previous flush become reusable once the new
    /// superblock is on disk.
    pub fn flush(&mut self) -> Result<(), Error> {
        let mut superblock = self.superblock.clone();
        superblock.free.extend(&self.pending);
        let header = encode_superblock(&superblock)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.sync_data()?;
        self.superblock = superblock;
        self.pending.clear();
        debug!(
            slots = self.superblock.slot_count,
            free = self.superblock.free.len(),
            "Flushed superblock."
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> Option<PageId> {
        self.superblock.root.map(PageId)
    }

    /// Records the tree root. Persisted on the next `flush`.
    pub fn set_root(&mut self, root: Option<PageId>) {
        self.superblock.root = root.map(|id| id.0);
    }

    pub fn slot_count(&self) -> u64 {
        self.superblock.slot_count
    }

    /// Slots ready for reuse.
    pub fn free_slots(&self) -> usize {
        self.superblock.free.len()
    }

    /// Slots released since the last `flush`, not yet reusable.
    pub fn pending_slots(&self) -> usize {
        self.pending.len()
    }

    /// Number of committed pages not yet released.
    pub fn live_pages(&self) -> usize {
        let released = self.superblock.free.len() + self.pending.len();
        (self.superblock.slot_count as usize - 1).saturating_sub(released)
    }

    fn is_live(&self, id: PageId) -> bool {
        id.0 != 0
            && id.0 < self.superblock.slot_count
            && !self.superblock.free.contains(&id.0)
            && !self.pending.contains(&id.0)
    }

    fn check_capacity(&self) -> Result<(), Error> {
        match self.capacity {
            Some(capacity) if self.live_pages() >= capacity => Err(err!(
                OutOfSpace,
                "Page file is full ({} of {} pages)",
                self.live_pages(),
                capacity
            )),
            _ => Ok(()),
        }
    }

    fn offset(id: PageId) -> u64 {
        id.0 * PAGE_SIZE as u64
    }
}

impl PageStore for FileStore {
    fn get(&self, id: PageId) -> Result<Page, Error> {
        if !self.is_live(id) {
            return Err(err!(NotFound, "Page {} not found in {}.", id, self.path.display()));
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(Self::offset(id)))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => err!(CorruptPage, "Page {} is truncated", id),
            _ => Error::Io(e),
        })?;
        trace!(page = id.0, "Read page.");
        Ok(Page::from_bytes(&buf))
    }

    fn allocate(&mut self) -> Result<PageBuf, Error> {
        self.check_capacity()?;
        Ok(PageBuf::new())
    }

    /// Writes the page and syncs its data. The page becomes part of the durable
    /// tree once a flushed superblock reaches it.
    fn commit(&mut self, buf: PageBuf) -> Result<PageId, Error> {
        check_committable(&buf)?;
        self.check_capacity()?;
        let (id, reused) = match self.superblock.free.pop() {
            Some(slot) => (PageId(slot), true),
            None => (PageId(self.superblock.slot_count), false),
        };
        let written = self
            .file
            .seek(SeekFrom::Start(Self::offset(id)))
            .and_then(|_| self.file.write_all(&buf))
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            warn!(page = id.0, "Failed to write page: {}", e);
            if reused {
                self.superblock.free.push(id.0);
            }
            return Err(Error::Io(e));
        }
        if !reused {
            self.superblock.slot_count += 1;
        }
        debug!(page = id.0, reused, "Committed page.");
        Ok(id)
    }

    fn deallocate(&mut self, id: PageId) -> Result<(), Error> {
        if id.0 == 0 {
            return Err(err!(InvalidOperation, "Slot 0 holds the superblock"));
        }
        if self.is_live(id) {
            self.pending.push(id.0);
            debug!(page = id.0, "Released page.");
        }
        Ok(())
    }
}

fn decode_superblock(bytes: &[u8]) -> Result<Superblock, Error> {
    let (decoded, _): (Superblock, usize) = bincode::decode_from_slice(bytes, config::standard())
        .map_err(|e| Error::Encoding(format!("Failed to decode superblock. {}", e)))?;
    Ok(decoded)
}

fn encode_superblock(superblock: &Superblock) -> Result<Vec<u8>, Error> {
    let encoded = bincode::encode_to_vec(superblock, config::standard())
        .map_err(|e| Error::Encoding(format!("Failed to encode superblock. {}", e)))?;
    if encoded.len() > PAGE_SIZE {
        return Err(Error::Encoding(format!(
            "Superblock size ({}) does not fit within the slot ({}).",
            encoded.len(),
            PAGE_SIZE
        )));
    }
    let mut slot = vec![0u8; PAGE_SIZE];
    slot[..encoded.len()].copy_from_slice(&encoded);
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn page_with(byte: u8) -> PageBuf {
        let mut buf = PageBuf::new();
        buf[0] = byte;
        buf[PAGE_SIZE - 1] = byte;
        buf
    }

    #[test]
    fn test_commit_and_get() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::create(dir.path().join("pages.db"), None).unwrap();

        let a = store.commit(page_with(1)).unwrap();
        let b = store.commit(page_with(2)).unwrap();
        assert_eq!(a, PageId(1));
        assert_eq!(b, PageId(2));
        assert_eq!(store.get(b).unwrap()[PAGE_SIZE - 1], 2);
        assert_eq!(store.live_pages(), 2);
    }

    #[test]
    fn test_reopen_restores_superblock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.db");
        {
            let mut store = FileStore::create(&path, None).unwrap();
            let a = store.commit(page_with(1)).unwrap();
            let b = store.commit(page_with(2)).unwrap();
            store.deallocate(a).unwrap();
            store.set_root(Some(b));
            store.flush().unwrap();
        }

        let store = FileStore::open(&path, None).unwrap();
        assert_eq!(store.root(), Some(PageId(2)));
        assert_eq!(store.slot_count(), 3);
        assert_eq!(store.free_slots(), 1);
        assert_eq!(store.get(PageId(2)).unwrap()[0], 2);
        assert_eq!(store.get(PageId(1)).unwrap_err().code(), 5000);
    }

    #[test]
    fn test_freed_slots_are_reused_after_flush() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::create(dir.path().join("pages.db"), None).unwrap();
        let a = store.commit(page_with(1)).unwrap();
        store.commit(page_with(2)).unwrap();
        store.deallocate(a).unwrap();
        store.deallocate(a).unwrap();
        assert_eq!(store.pending_slots(), 1);
        assert_eq!(store.free_slots(), 0);
        assert_eq!(store.get(a).unwrap_err().code(), 5000);

        let b = store.commit(page_with(3)).unwrap();
        assert_ne!(b, a);

        store.flush().unwrap();
        assert_eq!(store.pending_slots(), 0);
        assert_eq!(store.free_slots(), 1);
        let c = store.commit(page_with(4)).unwrap();
        assert_eq!(c, a);
        assert_eq!(store.get(c).unwrap()[0], 4);
        assert_eq!(store.slot_count(), 4);
    }

    #[test]
    fn test_unflushed_release_keeps_durable_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let root = {
            let mut store = FileStore::create(&path, None).unwrap();
            let root = store.commit(page_with(1)).unwrap();
            store.set_root(Some(root));
            store.flush().unwrap();

            // A new root replaces the old one, but the process stops before flushing.
            let next = store.commit(page_with(2)).unwrap();
            store.deallocate(root).unwrap();
            store.set_root(Some(next));
            for byte in 3..6 {
                let id = store.commit(page_with(byte)).unwrap();
                assert_ne!(id, root);
            }
            root
        };

        let store = FileStore::open(&path, None).unwrap();
        assert_eq!(store.root(), Some(root));
        assert_eq!(store.get(root).unwrap()[0], 1);
    }

    #[test]
    fn test_get_unknown_page() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("pages.db"), None).unwrap();
        assert_eq!(store.get(PageId(0)).unwrap_err().code(), 5000);
        assert_eq!(store.get(PageId(9)).unwrap_err().code(), 5000);
    }

    #[test]
    fn test_truncated_page_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let mut store = FileStore::create(&path, None).unwrap();
        let id = store.commit(page_with(1)).unwrap();
        store.file.set_len(FileStore::offset(id) + 10).unwrap();
        assert_eq!(store.get(id).unwrap_err().code(), 2000);
    }

    #[test]
    fn test_capacity() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::create(dir.path().join("pages.db"), Some(1)).unwrap();
        let buf = store.allocate().unwrap();
        let id = store.commit(buf).unwrap();
        assert_eq!(store.allocate().unwrap_err().code(), 4000);
        store.deallocate(id).unwrap();
        assert!(store.allocate().is_ok());
    }

    #[test]
    fn test_capacity_counts_outstanding_allocations() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::create(dir.path().join("pages.db"), Some(1)).unwrap();
        let first = store.allocate().unwrap();
        let second = store.allocate().unwrap();
        store.commit(first).unwrap();
        assert_eq!(store.commit(second).unwrap_err().code(), 4000);
        assert_eq!(store.live_pages(), 1);
        assert_eq!(store.slot_count(), 2);
    }

    #[test]
    fn test_open_rejects_bad_free_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let cases: [(Vec<u64>, Option<u64>); 5] = [
            (vec![0], None),
            (vec![5], None),
            (vec![1, 1], None),
            (vec![1, 2, 3], None),
            (vec![1], Some(1)),
        ];
        for (free, root) in cases {
            let mut store = FileStore::create(&path, None).unwrap();
            store.commit(page_with(1)).unwrap();
            store.superblock.free = free.clone();
            store.superblock.root = root;
            store.flush().unwrap();
            drop(store);

            let err = FileStore::open(&path, None).unwrap_err();
            assert_eq!(err.code(), 2000, "free list {:?}, root {:?}", free, root);
        }
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.db");
        std::fs::write(&path, vec![0xffu8; PAGE_SIZE]).unwrap();
        assert!(FileStore::open(&path, None).is_err());

        let empty = dir.path().join("empty.db");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(FileStore::open(&empty, None).unwrap_err().code(), 2000);
    }

    #[test]
    fn test_superblock_slot_is_protected() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::create(dir.path().join("pages.db"), None).unwrap();
        assert_eq!(store.deallocate(PageId(0)).unwrap_err().code(), 8000);
        assert_eq!(store.commit(PageBuf::scratch()).unwrap_err().code(), 8000);
    }
}
