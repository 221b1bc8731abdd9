//! Entry table and inode storage of one memory filesystem.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::conf::N_SYMLINK_HOPS_MAX;
use crate::error::{FsError, FsResult};
use crate::path::parse_path_parts;
use crate::posix::{EnumPosixPermission, PermissionSet};
use crate::spec::{EnumFileKind, EnumPathSyntax, FileAttributes};

/// `[root, name1, name2, ...]` of an absolute, normalized location.
pub(crate) type TypeEntryKey = Vec<String>;

/// Lock the store, ignoring poisoning.
pub(crate) fn lock_store(store: &Mutex<MemoryStore>) -> MutexGuard<'_, MemoryStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub(crate) enum EnumInodeData {
    File(Vec<u8>),
    Directory,
    /// Target string, parsed with the store's path model when followed.
    Symlink(String),
}

#[derive(Debug, Clone)]
pub(crate) struct SpecInode {
    pub(crate) data: EnumInodeData,
    pub(crate) permissions: PermissionSet,
    pub(crate) time_modified: SystemTime,
    pub(crate) time_accessed: SystemTime,
    pub(crate) time_created: SystemTime,
    pub(crate) dict_xattrs: BTreeMap<String, Vec<u8>>,
    n_links: u32,
}

impl SpecInode {
    fn new(data: EnumInodeData, permissions: PermissionSet) -> Self {
        let time_now = SystemTime::now();
        Self {
            data,
            permissions,
            time_modified: time_now,
            time_accessed: time_now,
            time_created: time_now,
            dict_xattrs: BTreeMap::new(),
            n_links: 1,
        }
    }

    pub(crate) fn kind(&self) -> EnumFileKind {
        match self.data {
            EnumInodeData::File(_) => EnumFileKind::RegularFile,
            EnumInodeData::Directory => EnumFileKind::Directory,
            EnumInodeData::Symlink(_) => EnumFileKind::SymbolicLink,
        }
    }

    pub(crate) fn is_directory(&self) -> bool {
        matches!(self.data, EnumInodeData::Directory)
    }
}

/// Owner access bit checked before an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnumOwnerAccess {
    Read,
    Write,
    Execute,
}

/// Names map to inode ids; inodes hold content and metadata, so hard links
/// share one inode.
#[derive(Debug)]
pub(crate) struct MemoryStore {
    rule_syntax: EnumPathSyntax,
    if_enforce_permissions: bool,
    pub(crate) perms_file: PermissionSet,
    pub(crate) perms_dir: PermissionSet,
    dict_entries: BTreeMap<TypeEntryKey, u64>,
    dict_inodes: HashMap<u64, SpecInode>,
    n_inode_next: u64,
}

impl MemoryStore {
    pub(crate) fn new(
        rule_syntax: EnumPathSyntax,
        roots: &[String],
        if_enforce_permissions: bool,
        perms_file: PermissionSet,
        perms_dir: PermissionSet,
    ) -> Self {
        let mut store = Self {
            rule_syntax,
            if_enforce_permissions,
            perms_file,
            perms_dir,
            dict_entries: BTreeMap::new(),
            dict_inodes: HashMap::new(),
            n_inode_next: 1,
        };
        for root in roots {
            let n_inode = store._allocate(EnumInodeData::Directory, perms_dir);
            store.dict_entries.insert(vec![root.clone()], n_inode);
        }
        store
    }

    fn _allocate(&mut self, data: EnumInodeData, permissions: PermissionSet) -> u64 {
        let n_inode = self.n_inode_next;
        self.n_inode_next += 1;
        self.dict_inodes
            .insert(n_inode, SpecInode::new(data, permissions));
        n_inode
    }

    ////////////////////////////////////////////////////////////////////////////
    // #region Lookup

    pub(crate) fn inode_id(&self, key: &TypeEntryKey) -> Option<u64> {
        self.dict_entries.get(key).copied()
    }

    pub(crate) fn inode(&self, n_inode: u64) -> Option<&SpecInode> {
        self.dict_inodes.get(&n_inode)
    }

    pub(crate) fn inode_mut(&mut self, n_inode: u64) -> Option<&mut SpecInode> {
        self.dict_inodes.get_mut(&n_inode)
    }

    pub(crate) fn entry(&self, key: &TypeEntryKey) -> Option<&SpecInode> {
        self.inode_id(key).and_then(|n_inode| self.dict_inodes.get(&n_inode))
    }

    pub(crate) fn entry_mut(&mut self, key: &TypeEntryKey) -> Option<&mut SpecInode> {
        let n_inode = self.inode_id(key)?;
        self.dict_inodes.get_mut(&n_inode)
    }

    /// Follow symbolic links along `names` below `root`.
    ///
    /// The final name is followed only when `if_follow_final` is set. A
    /// missing final entry is not an error; a missing intermediate one is.
    pub(crate) fn resolve_key(
        &self,
        root: &str,
        names: &[String],
        if_follow_final: bool,
        c_display: &str,
    ) -> FsResult<TypeEntryKey> {
        let mut key: TypeEntryKey = vec![root.to_string()];
        if !self.dict_entries.contains_key(&key) {
            return Err(FsError::NoSuchFile(c_display.to_string()));
        }
        let mut l_pending = names.iter().cloned().collect::<VecDeque<_>>();
        let mut n_hops = 0;

        while let Some(name) = l_pending.pop_front() {
            if name == "." {
                continue;
            }
            if name == ".." {
                if key.len() > 1 {
                    key.pop();
                }
                continue;
            }
            key.push(name);
            let if_last = l_pending.is_empty();
            let Some(inode) = self.entry(&key) else {
                if if_last {
                    break;
                }
                return Err(FsError::NoSuchFile(c_display.to_string()));
            };
            match &inode.data {
                EnumInodeData::Symlink(c_target) if !if_last || if_follow_final => {
                    n_hops += 1;
                    if n_hops > N_SYMLINK_HOPS_MAX {
                        return Err(FsError::FileSystemLoop(c_display.to_string()));
                    }
                    key.pop();
                    let spec_parts = parse_path_parts(self.rule_syntax, c_target)?;
                    if spec_parts.if_absolute {
                        let Some(c_root) = spec_parts.root else {
                            return Err(FsError::NoSuchFile(c_display.to_string()));
                        };
                        key = vec![c_root];
                        if !self.dict_entries.contains_key(&key) {
                            return Err(FsError::NoSuchFile(c_display.to_string()));
                        }
                    } else if spec_parts.root.is_some() {
                        key.truncate(1);
                    }
                    for name_target in spec_parts.names.into_iter().rev() {
                        l_pending.push_front(name_target);
                    }
                }
                EnumInodeData::Directory | EnumInodeData::Symlink(_) => {}
                EnumInodeData::File(_) if if_last => {}
                EnumInodeData::File(_) => {
                    return Err(FsError::NotDirectory(c_display.to_string()));
                }
            }
        }
        Ok(key)
    }

    /// Sorted names of the direct children of `key`.
    pub(crate) fn child_names(&self, key: &TypeEntryKey) -> Vec<String> {
        let n_depth = key.len() + 1;
        self.dict_entries
            .range::<TypeEntryKey, _>((Bound::Excluded(key), Bound::Unbounded))
            .take_while(|(key_other, _)| key_other.starts_with(key))
            .filter(|(key_other, _)| key_other.len() == n_depth)
            .filter_map(|(key_other, _)| key_other.last().cloned())
            .collect()
    }

    fn _has_children(&self, key: &TypeEntryKey) -> bool {
        self.dict_entries
            .range::<TypeEntryKey, _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .is_some_and(|(key_other, _)| key_other.starts_with(key))
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Permissions

    /// Fail unless the owner bit for `rule_access` is set on the entry.
    pub(crate) fn check_owner_access(
        &self,
        inode: &SpecInode,
        rule_access: EnumOwnerAccess,
        c_display: &str,
    ) -> FsResult<()> {
        if !self.if_enforce_permissions {
            return Ok(());
        }
        let enum_perm = match rule_access {
            EnumOwnerAccess::Read => EnumPosixPermission::OwnerRead,
            EnumOwnerAccess::Write => EnumPosixPermission::OwnerWrite,
            EnumOwnerAccess::Execute => EnumPosixPermission::OwnerExecute,
        };
        if inode.permissions.contains(enum_perm) {
            return Ok(());
        }
        Err(FsError::AccessDenied(c_display.to_string()))
    }

    /// Existing directory holding `key`, writable by the owner.
    fn _check_parent_writable(&self, key: &TypeEntryKey, c_display: &str) -> FsResult<()> {
        let key_parent = &key[..key.len().saturating_sub(1)];
        if key_parent.is_empty() {
            return Err(FsError::AccessDenied(c_display.to_string()));
        }
        let Some(inode_parent) = self.entry(&key_parent.to_vec()) else {
            return Err(FsError::NoSuchFile(c_display.to_string()));
        };
        if !inode_parent.is_directory() {
            return Err(FsError::NotDirectory(c_display.to_string()));
        }
        self.check_owner_access(inode_parent, EnumOwnerAccess::Write, c_display)
    }

    fn _touch_parent(&mut self, key: &TypeEntryKey) {
        if key.len() < 2 {
            return;
        }
        let key_parent = key[..key.len() - 1].to_vec();
        if let Some(inode_parent) = self.entry_mut(&key_parent) {
            inode_parent.time_modified = SystemTime::now();
        }
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Mutations

    /// Link a new inode at `key`; fails if anything exists there.
    pub(crate) fn insert(
        &mut self,
        key: &TypeEntryKey,
        data: EnumInodeData,
        permissions: Option<PermissionSet>,
        c_display: &str,
    ) -> FsResult<u64> {
        if self.dict_entries.contains_key(key) {
            return Err(FsError::FileAlreadyExists(c_display.to_string()));
        }
        self._check_parent_writable(key, c_display)?;
        let permissions = permissions.unwrap_or(match data {
            EnumInodeData::Directory => self.perms_dir,
            EnumInodeData::File(_) | EnumInodeData::Symlink(_) => self.perms_file,
        });
        let n_inode = self._allocate(data, permissions);
        self.dict_entries.insert(key.clone(), n_inode);
        self._touch_parent(key);
        Ok(n_inode)
    }

    /// Add another name for an existing non-directory inode.
    pub(crate) fn link(
        &mut self,
        key: &TypeEntryKey,
        n_inode: u64,
        c_display: &str,
    ) -> FsResult<()> {
        if self.dict_entries.contains_key(key) {
            return Err(FsError::FileAlreadyExists(c_display.to_string()));
        }
        self._check_parent_writable(key, c_display)?;
        let Some(inode) = self.dict_inodes.get_mut(&n_inode) else {
            return Err(FsError::NoSuchFile(c_display.to_string()));
        };
        if inode.is_directory() {
            return Err(FsError::UnsupportedOperation(format!(
                "hard link to directory: {c_display}"
            )));
        }
        inode.n_links += 1;
        self.dict_entries.insert(key.clone(), n_inode);
        self._touch_parent(key);
        Ok(())
    }

    /// Unlink `key`; a directory must be empty.
    pub(crate) fn remove(&mut self, key: &TypeEntryKey, c_display: &str) -> FsResult<()> {
        let Some(n_inode) = self.inode_id(key) else {
            return Err(FsError::NoSuchFile(c_display.to_string()));
        };
        self._check_parent_writable(key, c_display)?;
        if self._has_children(key) {
            return Err(FsError::DirectoryNotEmpty(c_display.to_string()));
        }
        self.dict_entries.remove(key);
        if let Some(inode) = self.dict_inodes.get_mut(&n_inode) {
            inode.n_links -= 1;
            if inode.n_links == 0 {
                self.dict_inodes.remove(&n_inode);
            }
        }
        self._touch_parent(key);
        Ok(())
    }

    /// Rename the entry at `key_src` (and its whole subtree) to `key_dst`.
    pub(crate) fn rename(
        &mut self,
        key_src: &TypeEntryKey,
        key_dst: &TypeEntryKey,
        c_display: &str,
    ) -> FsResult<()> {
        if key_dst.starts_with(key_src) && key_dst.len() > key_src.len() {
            return Err(FsError::InvalidPath {
                path: c_display.to_string(),
                reason: "cannot move a directory into itself".to_string(),
            });
        }
        self._check_parent_writable(key_src, c_display)?;
        self._check_parent_writable(key_dst, c_display)?;
        let l_moved = self
            .dict_entries
            .range::<TypeEntryKey, _>((Bound::Included(key_src), Bound::Unbounded))
            .take_while(|(key_other, _)| key_other.starts_with(key_src))
            .map(|(key_other, n_inode)| (key_other.clone(), *n_inode))
            .collect::<Vec<_>>();
        for (key_old, _) in &l_moved {
            self.dict_entries.remove(key_old);
        }
        for (key_old, n_inode) in l_moved {
            let mut key_new = key_dst.clone();
            key_new.extend(key_old[key_src.len()..].iter().cloned());
            self.dict_entries.insert(key_new, n_inode);
        }
        self._touch_parent(key_src);
        self._touch_parent(key_dst);
        Ok(())
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////

    pub(crate) fn attributes(&self, n_inode: u64, c_display: &str) -> FsResult<FileAttributes> {
        let Some(inode) = self.inode(n_inode) else {
            return Err(FsError::NoSuchFile(c_display.to_string()));
        };
        let n_size = match &inode.data {
            EnumInodeData::File(data) => data.len() as u64,
            EnumInodeData::Symlink(c_target) => c_target.len() as u64,
            EnumInodeData::Directory => 0,
        };
        Ok(FileAttributes {
            enum_kind: inode.kind(),
            n_size,
            time_modified: inode.time_modified,
            time_accessed: inode.time_accessed,
            time_created: inode.time_created,
            permissions: Some(inode.permissions),
            n_file_key: Some(n_inode),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix_store() -> MemoryStore {
        MemoryStore::new(
            EnumPathSyntax::Unix,
            &["/".to_string()],
            true,
            PermissionSet::from_int_mode(0o644).expect("mode"),
            PermissionSet::from_int_mode(0o755).expect("mode"),
        )
    }

    fn key(names: &[&str]) -> TypeEntryKey {
        std::iter::once("/")
            .chain(names.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn children_are_sorted_and_direct() {
        let mut store = unix_store();
        for names in [&["b"][..], &["a"], &["a", "x"], &["c"]] {
            let data = if names.len() == 1 && names[0] == "a" {
                EnumInodeData::Directory
            } else {
                EnumInodeData::File(Vec::new())
            };
            store.insert(&key(names), data, None, "p").expect("insert");
        }
        assert_eq!(store.child_names(&key(&[])), vec!["a", "b", "c"]);
        assert_eq!(store.child_names(&key(&["a"])), vec!["x"]);
    }

    #[test]
    fn symlink_loops_are_detected() {
        let mut store = unix_store();
        store
            .insert(&key(&["l1"]), EnumInodeData::Symlink("/l2".into()), None, "l1")
            .expect("insert");
        store
            .insert(&key(&["l2"]), EnumInodeData::Symlink("/l1".into()), None, "l2")
            .expect("insert");
        let err = store
            .resolve_key("/", &["l1".to_string()], true, "/l1")
            .expect_err("must fail");
        assert!(matches!(err, FsError::FileSystemLoop(_)));
        assert_eq!(
            store
                .resolve_key("/", &["l1".to_string()], false, "/l1")
                .expect("key"),
            key(&["l1"])
        );
    }

    #[test]
    fn relative_symlink_is_followed_from_its_directory() {
        let mut store = unix_store();
        store
            .insert(&key(&["d"]), EnumInodeData::Directory, None, "d")
            .expect("insert");
        store
            .insert(&key(&["d", "f"]), EnumInodeData::File(vec![1]), None, "f")
            .expect("insert");
        store
            .insert(&key(&["d", "l"]), EnumInodeData::Symlink("f".into()), None, "l")
            .expect("insert");
        let names = ["d".to_string(), "l".to_string()];
        assert_eq!(
            store.resolve_key("/", &names, true, "/d/l").expect("key"),
            key(&["d", "f"])
        );
    }

    #[test]
    fn hard_links_share_one_inode() {
        let mut store = unix_store();
        let n_inode = store
            .insert(&key(&["f"]), EnumInodeData::File(vec![7]), None, "f")
            .expect("insert");
        store.link(&key(&["g"]), n_inode, "g").expect("link");
        store.remove(&key(&["f"]), "f").expect("remove");
        assert_eq!(store.inode_id(&key(&["g"])), Some(n_inode));
        assert!(store.inode(n_inode).is_some());
    }

    #[test]
    fn rename_moves_subtree() {
        let mut store = unix_store();
        store
            .insert(&key(&["d"]), EnumInodeData::Directory, None, "d")
            .expect("insert");
        store
            .insert(&key(&["d", "f"]), EnumInodeData::File(vec![]), None, "f")
            .expect("insert");
        store.rename(&key(&["d"]), &key(&["e"]), "d").expect("rename");
        assert!(store.inode_id(&key(&["e", "f"])).is_some());
        assert!(store.inode_id(&key(&["d"])).is_none());
        assert!(store.rename(&key(&["e"]), &key(&["e", "x"]), "e").is_err());
    }
}
