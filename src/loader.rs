//! A two-level tree built from the node algorithms: one internal root over
//! a row of leaves.
//!
//! The root's first separator is the empty key, so every key routes to some
//! leaf. An insert rewrites the target leaf into a scratch buffer, splits it,
//! commits the parts and swaps the leaf's root record for one record per part.
//! The old leaf and the old root are released once the new root is committed.
use crate::errors::Error;
use crate::storage::{
    leaf_upsert, replace_children, split, Kv, NodeKind, NodeView, NodeWriter, PageBuf, PageId,
    PageStore, SplitPages,
};
use crate::storage::split::release;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderStats {
    pub root: PageId,
    pub root_size: usize,
    pub leaves: usize,
    pub records: usize,
    /// Sum of the encoded sizes of all leaves.
    pub leaf_bytes: usize,
}

#[derive(Debug)]
pub struct Loader<S: PageStore> {
    store: S,
    root: PageId,
}

impl<S: PageStore> Loader<S> {
    /// Builds an empty tree: a root with a single separator over an empty leaf.
    pub fn create(mut store: S) -> Result<Self, Error> {
        let mut leaf = store.allocate()?;
        NodeWriter::new(&mut leaf, NodeKind::Leaf, 0)?.finish()?;
        let leaf_id = store.commit(leaf)?;

        let child = leaf_id.to_bytes();
        let mut root = store.allocate()?;
        let mut w = NodeWriter::new(&mut root, NodeKind::Internal, 1)?;
        w.push_kv(Kv::new(b"", &child))?;
        w.finish()?;
        let root = store.commit(root)?;

        info!(root = root.0, leaf = leaf_id.0, "Created tree.");
        Ok(Self { store, root })
    }

    /// Attaches to a tree whose root was committed earlier.
    pub fn open(store: S, root: PageId) -> Result<Self, Error> {
        let page = store.get(root)?;
        let node = NodeView::decode(&page)?;
        if node.kind() != NodeKind::Internal || node.key_count() == 0 {
            return Err(err!(
                CorruptPage,
                "Page {} is not a tree root ({} node with {} records)",
                root,
                node.kind(),
                node.key_count()
            ));
        }
        Ok(Self { store, root })
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Inserts `(key, val)`, replacing the value if the key exists.
    ///
    /// # Errors
    /// `Error::OversizedRecord` if the record cannot fit a page, and
    /// `Error::Overflow` if the root would outgrow its page. Neither leaves
    /// any page behind, and the tree stays as it was.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<(), Error> {
        let root_page = self.store.get(self.root)?;
        let root = NodeView::decode(&root_page)?;
        let idx = root.lookup_le(key);
        let leaf_id = root.child(idx)?;
        let leaf_page = self.store.get(leaf_id)?;
        let leaf = NodeView::decode(&leaf_page)?;

        let mut scratch = PageBuf::scratch();
        let grown = leaf_upsert(&mut scratch, &leaf, key, val)?;
        trace!(leaf = leaf_id.0, size = grown.size(), "Rewrote leaf.");

        let mut pages = SplitPages::new();
        let parts = split(&grown, &mut self.store, &mut pages)?;
        let separators: Vec<Vec<u8>> = parts
            .iter()
            .enumerate()
            .map(|(i, part)| match i {
                0 => root.key(idx).to_vec(),
                _ => part.first_key().unwrap_or_default().to_vec(),
            })
            .collect();
        drop(parts);

        let ids: Vec<PageId> = if pages.is_empty() {
            let mut buf = self.store.allocate()?;
            grown.write_to(&mut buf)?;
            vec![self.store.commit(buf)?]
        } else {
            debug!(leaf = leaf_id.0, parts = pages.len(), "Leaf split.");
            pages.commit(&mut self.store)?.into_iter().collect()
        };

        let new_root = match self.commit_root(&root, idx, &separators, &ids) {
            Ok(id) => id,
            Err(e) => {
                release(&mut self.store, &ids);
                return Err(e);
            }
        };
        if ids.len() > 1 {
            info!(
                root = new_root.0,
                leaves = root.key_count() as usize + ids.len() - 1,
                "Root grew."
            );
        }

        self.store.deallocate(leaf_id)?;
        self.store.deallocate(self.root)?;
        self.root = new_root;
        Ok(())
    }

    fn commit_root(
        &mut self,
        root: &NodeView<'_>,
        idx: u16,
        separators: &[Vec<u8>],
        ids: &[PageId],
    ) -> Result<PageId, Error> {
        let children: Vec<[u8; 8]> = ids.iter().map(|id| id.to_bytes()).collect();
        let entries: Vec<Kv<'_>> = separators
            .iter()
            .zip(&children)
            .map(|(key, child)| Kv::new(key, child))
            .collect();

        let mut scratch = PageBuf::scratch();
        let node = replace_children(&mut scratch, root, idx, &entries)?;
        if !node.fits() {
            return Err(err!(
                Overflow,
                "Root of {} bytes with {} children outgrew its page",
                node.size(),
                node.key_count()
            ));
        }
        let mut page = self.store.allocate()?;
        node.write_to(&mut page)?;
        self.store.commit(page)
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let root_page = self.store.get(self.root)?;
        let root = NodeView::decode(&root_page)?;
        let leaf_page = self.store.get(root.child(root.lookup_le(key))?)?;
        let leaf = NodeView::decode(&leaf_page)?;
        Ok(leaf.search(key).ok().map(|i| leaf.kv(i).val.to_vec()))
    }

    /// All records, in key order.
    pub fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let root_page = self.store.get(self.root)?;
        let root = NodeView::decode(&root_page)?;
        let mut records = Vec::new();
        for kv in root.iter() {
            let leaf_page = self.store.get(kv.child()?)?;
            let leaf = NodeView::decode(&leaf_page)?;
            records.extend(leaf.iter().map(|kv| (kv.key.to_vec(), kv.val.to_vec())));
        }
        Ok(records)
    }

    pub fn stats(&self) -> Result<LoaderStats, Error> {
        let root_page = self.store.get(self.root)?;
        let root = NodeView::decode(&root_page)?;
        let mut stats = LoaderStats {
            root: self.root,
            root_size: root.size(),
            leaves: root.key_count() as usize,
            records: 0,
            leaf_bytes: 0,
        };
        for kv in root.iter() {
            let leaf_page = self.store.get(kv.child()?)?;
            let leaf = NodeView::decode(&leaf_page)?;
            stats.records += leaf.key_count() as usize;
            stats.leaf_bytes += leaf.size();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore, PAGE_SIZE};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn key(i: usize) -> Vec<u8> {
        format!("key{:04}", i).into_bytes()
    }

    #[test]
    fn test_empty_tree() {
        let loader = Loader::create(MemoryStore::new()).unwrap();
        assert_eq!(loader.get(b"missing").unwrap(), None);
        assert!(loader.scan().unwrap().is_empty());
        assert_eq!(loader.store().live_pages(), 2);
        assert_eq!(loader.stats().unwrap().leaves, 1);
    }

    #[test]
    fn test_insert_get_and_overwrite() {
        let mut loader = Loader::create(MemoryStore::new()).unwrap();
        loader.insert(b"b", b"2").unwrap();
        loader.insert(b"a", b"1").unwrap();
        loader.insert(b"b", b"two").unwrap();

        assert_eq!(loader.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(loader.get(b"b").unwrap(), Some(b"two".to_vec()));
        assert_eq!(loader.get(b"c").unwrap(), None);
        assert_eq!(loader.scan().unwrap().len(), 2);
        // Old roots and leaves are released on every insert.
        assert_eq!(loader.store().live_pages(), 2);
    }

    #[test]
    fn test_many_inserts_split_leaves() {
        let mut loader = Loader::create(MemoryStore::new()).unwrap();
        let mut model = BTreeMap::new();
        // Visit 0..101 in a scrambled but deterministic order.
        for n in 0..101usize {
            let i = (n * 37) % 101;
            let val = vec![(i % 251) as u8; 200];
            loader.insert(&key(i), &val).unwrap();
            model.insert(key(i), val);
        }

        let stats = loader.stats().unwrap();
        assert!(stats.leaves > 1);
        assert_eq!(stats.records, 101);
        assert!(stats.root_size <= PAGE_SIZE);
        assert_eq!(loader.store().live_pages(), stats.leaves + 1);

        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
        assert_eq!(loader.scan().unwrap(), expected);
        assert_eq!(loader.get(&key(42)).unwrap(), Some(vec![42u8; 200]));
    }

    #[test]
    fn test_oversized_record_leaves_tree_untouched() {
        let mut loader = Loader::create(MemoryStore::new()).unwrap();
        loader.insert(b"a", b"1").unwrap();
        let root = loader.root();

        let err = loader.insert(b"big", &vec![0u8; PAGE_SIZE]).unwrap_err();
        assert_eq!(err.code(), 3000);
        assert_eq!(loader.root(), root);
        assert_eq!(loader.store().live_pages(), 2);
        assert_eq!(loader.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_record_larger_than_scratch() {
        let mut loader = Loader::create(MemoryStore::new()).unwrap();
        let err = loader.insert(b"k", &vec![0u8; 13_000]).unwrap_err();
        assert_eq!(err.code(), 3000);
        assert_eq!(loader.store().live_pages(), 2);
    }

    #[test]
    fn test_root_overflow() {
        // 1500-byte keys: two records per leaf, two separators per root.
        let long_key = |i: usize| format!("{:04}", i).repeat(375).into_bytes();
        let mut loader = Loader::create(MemoryStore::new()).unwrap();
        for i in 0..6 {
            loader.insert(&long_key(i), b"v").unwrap();
        }
        assert_eq!(loader.stats().unwrap().leaves, 3);
        let live = loader.store().live_pages();
        let root = loader.root();

        let err = loader.insert(&long_key(6), b"v").unwrap_err();
        assert_eq!(err.code(), 6000);
        assert_eq!(loader.root(), root);
        assert_eq!(loader.store().live_pages(), live);
        assert_eq!(loader.scan().unwrap().len(), 6);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.db");

        let store = FileStore::create(&path, None).unwrap();
        let mut loader = Loader::create(store).unwrap();
        for i in 0..60 {
            loader.insert(&key(i), &[i as u8; 100]).unwrap();
        }
        let root = loader.root();
        let mut store = loader.into_store();
        store.set_root(Some(root));
        store.flush().unwrap();
        drop(store);

        let store = FileStore::open(&path, None).unwrap();
        let root = store.root().unwrap();
        let loader = Loader::open(store, root).unwrap();
        assert_eq!(loader.scan().unwrap().len(), 60);
        assert_eq!(loader.get(&key(59)).unwrap(), Some(vec![59u8; 100]));
    }

    #[test]
    fn test_unflushed_inserts_keep_durable_tree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.db");

        let mut loader = Loader::create(FileStore::create(&path, None).unwrap()).unwrap();
        loader.insert(b"a", b"1").unwrap();
        let root = loader.root();
        let mut store = loader.into_store();
        store.set_root(Some(root));
        store.flush().unwrap();
        drop(store);

        // Keep writing, then stop without flushing.
        let store = FileStore::open(&path, None).unwrap();
        let mut loader = Loader::open(store, root).unwrap();
        loader.insert(b"b", b"2").unwrap();
        loader.insert(b"c", b"3").unwrap();
        drop(loader);

        let store = FileStore::open(&path, None).unwrap();
        assert_eq!(store.root(), Some(root));
        let loader = Loader::open(store, root).unwrap();
        assert_eq!(loader.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(loader.get(b"b").unwrap(), None);
        assert_eq!(loader.scan().unwrap().len(), 1);
    }

    #[test]
    fn test_open_rejects_leaf_root() {
        let mut store = MemoryStore::new();
        let mut buf = store.allocate().unwrap();
        NodeWriter::new(&mut buf, NodeKind::Leaf, 0).unwrap().finish().unwrap();
        let id = store.commit(buf).unwrap();
        assert_eq!(Loader::open(store, id).unwrap_err().code(), 2000);
    }
}
