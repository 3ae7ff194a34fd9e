//! Inode management for the FUSE filesystem.
//!
//! Maps kernel inode numbers to remote paths and back. Paths are absolute
//! within the mounted root ("/", "/docs", "/docs/a.txt"). Each entry carries
//! the FUSE `nlookup` count so that `forget()` can reclaim it.

use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Path of the mount root.
pub const ROOT_PATH: &str = "/";

/// Joins a directory path and an entry name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Returns the parent directory of `path`. The root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT_PATH,
        Some(idx) => &path[..idx],
    }
}

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Remote path of the entry.
    pub path: String,
    /// Lookup count for proper `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    /// Creates a new inode entry with nlookup = 1.
    pub fn new(path: String) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(1),
        }
    }

    /// Creates a new inode entry with nlookup = 0.
    /// Used for entries returned from `readdir()`, which must not
    /// increment the lookup count.
    pub fn new_no_lookup(path: String) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(0),
        }
    }

    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count by the given amount and returns the new value.
    /// Returns `None` if the count would go negative.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::AcqRel);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::Relaxed);
            None
        } else {
            Some(old - count)
        }
    }

    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe bidirectional map between inodes and remote paths.
pub struct InodeTable {
    path_to_inode: DashMap<String, u64>,
    inode_to_entry: DashMap<u64, InodeEntry>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Creates a new inode table with the root directory pre-allocated.
    pub fn new() -> Self {
        let table = Self {
            path_to_inode: DashMap::new(),
            inode_to_entry: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_inode.insert(ROOT_PATH.to_string(), ROOT_INODE);
        table
            .inode_to_entry
            .insert(ROOT_INODE, InodeEntry::new(ROOT_PATH.to_string()));
        table
    }

    /// Returns the inode for `path` and whether this call allocated it.
    fn get_or_insert_with<F>(&self, path: &str, make_entry: F) -> (u64, bool)
    where
        F: FnOnce() -> InodeEntry,
    {
        if let Some(inode) = self.path_to_inode.get(path) {
            return (*inode, false);
        }

        // Entry API avoids two threads allocating for the same path.
        let mut inserted = false;
        let inode = self
            .path_to_inode
            .entry(path.to_string())
            .or_insert_with(|| {
                let inode = self.next_inode.fetch_add(1, Ordering::Relaxed);
                self.inode_to_entry.insert(inode, make_entry());
                inserted = true;
                inode
            });
        (*inode, inserted)
    }

    /// Returns the inode for `path`, allocating one if needed, and counts a lookup.
    pub fn get_or_insert(&self, path: &str) -> u64 {
        loop {
            let (inode, inserted) =
                self.get_or_insert_with(path, || InodeEntry::new(path.to_string()));
            if inserted {
                return inode;
            }
            if let Some(entry) = self.inode_to_entry.get(&inode) {
                entry.inc_nlookup();
                return inode;
            }
            // Evicted since the path was read; drop the stale mapping and retry.
            self.path_to_inode.remove_if(path, |_, v| *v == inode);
        }
    }

    /// Returns the inode for `path` without touching its lookup count.
    pub fn get_or_insert_no_lookup_inc(&self, path: &str) -> u64 {
        self.get_or_insert_with(path, || InodeEntry::new_no_lookup(path.to_string()))
            .0
    }

    pub fn get(&self, inode: u64) -> Option<Ref<'_, u64, InodeEntry>> {
        self.inode_to_entry.get(&inode)
    }

    /// Returns a copy of the path for `inode`.
    pub fn path(&self, inode: u64) -> Option<String> {
        self.get(inode).map(|entry| entry.path.clone())
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).map(|r| *r)
    }

    /// Decrements the lookup count for an inode, evicting it at zero.
    /// Returns `true` if the inode was evicted.
    pub fn forget(&self, inode: u64, nlookup: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }

        if let Some(entry) = self.inode_to_entry.get(&inode)
            && let Some(remaining) = entry.dec_nlookup(nlookup)
            && remaining == 0
        {
            drop(entry);
            return self.evict(inode);
        }
        false
    }

    /// Evicts `inode` if the kernel holds no lookup on it.
    ///
    /// Listing entries are allocated with a zero count and the kernel never
    /// forgets them, so they are reclaimed here once their listing is
    /// released. Returns `true` if the inode was evicted.
    pub fn evict_unreferenced(&self, inode: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }
        match self.inode_to_entry.remove_if(&inode, |_, entry| entry.nlookup() == 0) {
            Some((_, entry)) => {
                self.path_to_inode.remove_if(&entry.path, |_, v| *v == inode);
                true
            }
            None => false,
        }
    }

    fn evict(&self, inode: u64) -> bool {
        match self.inode_to_entry.remove(&inode) {
            Some((_, entry)) => {
                self.path_to_inode.remove_if(&entry.path, |_, v| *v == inode);
                true
            }
            None => false,
        }
    }

    /// Drops the path mapping after a delete.
    ///
    /// The inode entry stays until the kernel forgets it, since the kernel
    /// may still pass the number to later operations.
    pub fn invalidate_path(&self, path: &str) {
        if path != ROOT_PATH {
            self.path_to_inode.remove(path);
        }
    }

    /// Returns the number of inodes currently in the table.
    pub fn len(&self) -> usize {
        self.inode_to_entry.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.inode_to_entry.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_inode_exists() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE).as_deref(), Some("/"));
        assert_eq!(table.get_inode("/"), Some(ROOT_INODE));
        assert!(table.is_empty());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/"), "/");
    }

    #[test]
    fn test_allocate_inode() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("/documents");
        assert!(inode > ROOT_INODE);

        // Second call should return same inode
        assert_eq!(table.get_or_insert("/documents"), inode);
        assert_eq!(table.get(inode).unwrap().nlookup(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_forget_evicts() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("/temp");
        assert!(table.forget(inode, 1));
        assert!(table.get(inode).is_none());
        assert!(table.get_inode("/temp").is_none());
    }

    #[test]
    fn test_forget_partial_keeps_entry() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("/f");
        table.get_or_insert("/f");
        assert!(!table.forget(inode, 1));
        assert_eq!(table.get(inode).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_forget_too_many_is_ignored() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("/f");
        assert!(!table.forget(inode, 5));
        assert_eq!(table.get(inode).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_forget_root_never_evicts() {
        let table = InodeTable::new();
        assert!(!table.forget(ROOT_INODE, 1));
        assert!(table.get(ROOT_INODE).is_some());
    }

    #[test]
    fn test_readdir_entries_do_not_count_lookups() {
        let table = InodeTable::new();
        let inode = table.get_or_insert_no_lookup_inc("/listed");
        assert_eq!(table.get(inode).unwrap().nlookup(), 0);
        assert_eq!(table.get_or_insert_no_lookup_inc("/listed"), inode);
        assert_eq!(table.get(inode).unwrap().nlookup(), 0);

        // A later lookup counts.
        assert_eq!(table.get_or_insert("/listed"), inode);
        assert_eq!(table.get(inode).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_evict_unreferenced_spares_looked_up_entries() {
        let table = InodeTable::new();
        let listed = table.get_or_insert_no_lookup_inc("/listed");
        let looked_up = table.get_or_insert_no_lookup_inc("/opened");
        table.get_or_insert("/opened");

        assert!(table.evict_unreferenced(listed));
        assert!(table.get(listed).is_none());
        assert!(table.get_inode("/listed").is_none());

        assert!(!table.evict_unreferenced(looked_up));
        assert_eq!(table.get(looked_up).unwrap().nlookup(), 1);
        assert!(!table.evict_unreferenced(ROOT_INODE));
        assert!(!table.evict_unreferenced(listed));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookup_after_eviction_allocates_fresh() {
        let table = InodeTable::new();
        let listed = table.get_or_insert_no_lookup_inc("/again");
        assert!(table.evict_unreferenced(listed));

        let fresh = table.get_or_insert("/again");
        assert_ne!(fresh, listed);
        assert_eq!(table.get(fresh).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_invalidate_path_keeps_inode() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("/to_delete");
        table.invalidate_path("/to_delete");
        assert!(table.get_inode("/to_delete").is_none());
        assert!(table.get(inode).is_some());

        // A new file at the same path gets a fresh inode.
        let fresh = table.get_or_insert("/to_delete");
        assert_ne!(fresh, inode);

        // Forgetting the stale inode leaves the new mapping alone.
        assert!(table.forget(inode, 1));
        assert_eq!(table.get_inode("/to_delete"), Some(fresh));
    }

    #[test]
    fn test_invalidate_root_is_ignored() {
        let table = InodeTable::new();
        table.invalidate_path("/");
        assert_eq!(table.get_inode("/"), Some(ROOT_INODE));
    }

    proptest::proptest! {
        #[test]
        fn prop_parent_of_child(parts in proptest::collection::vec("[a-z0-9._-]{1,12}", 0..6), name in "[a-z0-9_-]{1,12}") {
            let dir = if parts.is_empty() { ROOT_PATH.to_string() } else { format!("/{}", parts.join("/")) };
            let child = child_path(&dir, &name);
            proptest::prop_assert_eq!(parent_path(&child), dir.as_str());
            proptest::prop_assert!(!child.contains("//"));
        }
    }
}
