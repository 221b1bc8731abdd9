use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tracing::debug;

use super::MemoryFileSystem;
use super::channel::MemoryByteChannel;
use super::store::{EnumInodeData, EnumOwnerAccess, MemoryStore, lock_store};
use crate::conf::{C_ATTRIBUTE_VIEW_BASIC, C_ATTRIBUTE_VIEW_POSIX, C_ATTRIBUTE_VIEW_USER};
use crate::conf::{C_SCHEME_MEMORY, C_SCHEME_MEMORY_WINDOWS};
use crate::error::{FsError, FsResult};
use crate::fs::{
    DirectoryStream, FileSystem, FileSystemProvider, FileSystemRef, InputStream, OutputStream,
    SeekableByteChannel, is_same_file_system,
};
use crate::path::{FsPath, parse_path_parts};
use crate::posix::PermissionSet;
use crate::spec::{
    AttributeValue, EnumAccessMode, EnumCopyOption, EnumFsOperation, EnumOpenOption,
    EnumPathSyntax, FileAttributes, FileStore, SpecMemoryFsOptions,
};
use crate::util::{
    check_input_options, derive_attribute_map, derive_open_flags, derive_output_options,
    split_attribute_name,
};

static PROVIDER_UNIX: OnceLock<Arc<MemoryFileSystemProvider>> = OnceLock::new();
static PROVIDER_WINDOWS: OnceLock<Arc<MemoryFileSystemProvider>> = OnceLock::new();
static CNT_ANONYMOUS: AtomicU64 = AtomicU64::new(0);

/// Provider of every memory filesystem sharing one path model.
#[derive(Debug)]
pub struct MemoryFileSystemProvider {
    rule_syntax: EnumPathSyntax,
    dict_registry: Mutex<HashMap<String, Weak<MemoryFileSystem>>>,
}

impl MemoryFileSystemProvider {
    /// Singleton provider for `rule_syntax`.
    pub fn instance(rule_syntax: EnumPathSyntax) -> Arc<Self> {
        let cell = match rule_syntax {
            EnumPathSyntax::Unix => &PROVIDER_UNIX,
            EnumPathSyntax::Windows => &PROVIDER_WINDOWS,
        };
        cell.get_or_init(|| {
            Arc::new(Self {
                rule_syntax,
                dict_registry: Mutex::new(HashMap::new()),
            })
        })
        .clone()
    }

    pub(crate) fn scheme_name(&self) -> &'static str {
        match self.rule_syntax {
            EnumPathSyntax::Unix => C_SCHEME_MEMORY,
            EnumPathSyntax::Windows => C_SCHEME_MEMORY_WINDOWS,
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // #region Registry

    pub(crate) fn mount(
        self: &Arc<Self>,
        spec_options: SpecMemoryFsOptions,
    ) -> FsResult<Arc<MemoryFileSystem>> {
        if spec_options.rule_syntax != self.rule_syntax {
            return Err(FsError::ProviderMismatch(self.scheme_name().to_string()));
        }
        let l_roots = self._validate_roots(&spec_options.roots)?;
        let spec_work = parse_path_parts(self.rule_syntax, &spec_options.working_directory)?;
        let c_work_root = match spec_work.root {
            Some(c_root) if spec_work.if_absolute && l_roots.contains(&c_root) => c_root,
            _ => {
                return Err(FsError::InvalidPath {
                    path: spec_options.working_directory.clone(),
                    reason: "working directory must be absolute on a configured root".to_string(),
                });
            }
        };
        let perms_file = PermissionSet::from_int_mode(spec_options.n_mode_file)?;
        let perms_dir = PermissionSet::from_int_mode(spec_options.n_mode_dir)?;

        let mut store = MemoryStore::new(
            self.rule_syntax,
            &l_roots,
            spec_options.if_enforce_permissions,
            perms_file,
            perms_dir,
        );
        let mut key = vec![c_work_root.clone()];
        for name in &spec_work.names {
            key.push(name.clone());
            if store.inode_id(&key).is_none() {
                store.insert(&key, EnumInodeData::Directory, None, &spec_options.working_directory)?;
            }
        }

        let c_name = spec_options.name.clone().unwrap_or_else(|| {
            format!("anonymous-{}", CNT_ANONYMOUS.fetch_add(1, Ordering::Relaxed))
        });
        let mut dict_registry = self
            .dict_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Filesystems dropped without `close()` leave dead entries behind.
        dict_registry.retain(|_, fs| fs.strong_count() > 0);
        if dict_registry
            .get(&c_name)
            .and_then(Weak::upgrade)
            .is_some_and(|fs| fs.is_open())
        {
            return Err(FsError::FileSystemAlreadyExists(format!(
                "{}:{c_name}",
                self.scheme_name()
            )));
        }
        let fs = Arc::new(MemoryFileSystem {
            c_name: c_name.clone(),
            spec_options,
            store: Arc::new(Mutex::new(store)),
            provider: self.clone(),
            if_open: AtomicBool::new(true),
            c_work_root,
            l_work_names: spec_work.names,
        });
        dict_registry.insert(c_name.clone(), Arc::downgrade(&fs));
        debug!(name = %c_name, scheme = self.scheme_name(), "memory filesystem created");
        Ok(fs)
    }

    fn _validate_roots(&self, roots: &[String]) -> FsResult<Vec<String>> {
        if roots.is_empty() {
            return Err(FsError::InvalidPath {
                path: String::new(),
                reason: "at least one root is required".to_string(),
            });
        }
        roots
            .iter()
            .map(|c_root| {
                let spec_parts = parse_path_parts(self.rule_syntax, c_root)?;
                match spec_parts.root {
                    Some(c_parsed) if spec_parts.if_absolute && spec_parts.names.is_empty() => {
                        Ok(c_parsed)
                    }
                    _ => Err(FsError::InvalidPath {
                        path: c_root.clone(),
                        reason: "not a root directory".to_string(),
                    }),
                }
            })
            .collect()
    }

    pub(crate) fn unregister(&self, c_name: &str) {
        self.dict_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(c_name);
    }

    /// Name part of `memory:<name>[!<path>]`, and the path part if any.
    fn _split_uri<'a>(&self, uri: &'a str) -> FsResult<(&'a str, Option<&'a str>)> {
        let c_prefix = format!("{}:", self.scheme_name());
        let Some(c_rest) = uri.strip_prefix(&c_prefix) else {
            return Err(FsError::InvalidPath {
                path: uri.to_string(),
                reason: format!("expected scheme `{}`", self.scheme_name()),
            });
        };
        match c_rest.split_once('!') {
            Some((c_name, c_path)) => Ok((c_name, Some(c_path))),
            None => Ok((c_rest, None)),
        }
    }

    fn _options_from_env(
        &self,
        c_name: &str,
        env: &BTreeMap<String, String>,
    ) -> FsResult<SpecMemoryFsOptions> {
        let mut spec_options = match self.rule_syntax {
            EnumPathSyntax::Unix => SpecMemoryFsOptions::unix(),
            EnumPathSyntax::Windows => SpecMemoryFsOptions::windows(),
        };
        spec_options.name = Some(c_name.to_string());
        let parse_bool = |key: &str, value: &str| match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(FsError::InvalidAttribute(format!("{key}={value}"))),
        };
        let mut if_work_set = false;
        for (key, value) in env {
            match key.as_str() {
                // `;` never occurs in a root.
                "roots" => {
                    spec_options.roots = value
                        .split(';')
                        .filter(|c_root| !c_root.is_empty())
                        .map(String::from)
                        .collect();
                }
                "working_directory" => {
                    spec_options.working_directory = value.clone();
                    if_work_set = true;
                }
                "read_only" => spec_options.if_read_only = parse_bool(key, value)?,
                "enforce_permissions" => {
                    spec_options.if_enforce_permissions = parse_bool(key, value)?;
                }
                "owner" => spec_options.owner = value.clone(),
                _ => return Err(FsError::InvalidAttribute(format!("{key}={value}"))),
            }
        }
        if !if_work_set && let Some(c_root) = spec_options.roots.first() {
            spec_options.working_directory = c_root.clone();
        }
        Ok(spec_options)
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Helpers

    fn _memory_fs<'a>(&self, path: &'a FsPath) -> FsResult<&'a MemoryFileSystem> {
        let Some(fs) = path
            .file_system()
            .as_any()
            .downcast_ref::<MemoryFileSystem>()
        else {
            return Err(FsError::ProviderMismatch(self.scheme_name().to_string()));
        };
        if fs.syntax() != self.rule_syntax {
            return Err(FsError::ProviderMismatch(self.scheme_name().to_string()));
        }
        fs.check_open()?;
        Ok(fs)
    }

    /// Both paths on one memory filesystem.
    fn _same_memory_fs<'a>(
        &self,
        path_a: &'a FsPath,
        path_b: &FsPath,
    ) -> FsResult<&'a MemoryFileSystem> {
        let fs = self._memory_fs(path_a)?;
        if !is_same_file_system(path_a.file_system(), path_b.file_system()) {
            return Err(FsError::ProviderMismatch(self.scheme_name().to_string()));
        }
        Ok(fs)
    }

    fn _open(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
        rule_operation: EnumFsOperation,
    ) -> FsResult<MemoryByteChannel> {
        let spec_flags = derive_open_flags(options)?;
        let fs = self._memory_fs(path)?;
        if spec_flags.if_write {
            fs.check_writable(rule_operation)?;
        }
        let c_display = path.to_string();
        let mut store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, !spec_flags.if_nofollow)?;

        let n_inode = match store.inode_id(&key) {
            Some(_) if spec_flags.if_create_new => {
                return Err(FsError::FileAlreadyExists(c_display));
            }
            Some(n_inode) => n_inode,
            None if spec_flags.if_create || spec_flags.if_create_new => {
                store.insert(&key, EnumInodeData::File(Vec::new()), None, &c_display)?
            }
            None => return Err(FsError::NoSuchFile(c_display)),
        };

        let Some(inode) = store.inode(n_inode) else {
            return Err(FsError::NoSuchFile(c_display));
        };
        match inode.data {
            EnumInodeData::File(_) => {}
            EnumInodeData::Directory => return Err(FsError::IsDirectory(c_display)),
            // Only reachable with NoFollowLinks.
            EnumInodeData::Symlink(_) => return Err(FsError::FileSystemLoop(c_display)),
        }
        if spec_flags.if_read {
            store.check_owner_access(inode, EnumOwnerAccess::Read, &c_display)?;
        }
        if spec_flags.if_write {
            store.check_owner_access(inode, EnumOwnerAccess::Write, &c_display)?;
        }
        if spec_flags.if_truncate
            && let Some(inode) = store.inode_mut(n_inode)
            && let EnumInodeData::File(data) = &mut inode.data
        {
            data.clear();
            inode.time_modified = std::time::SystemTime::now();
        }
        Ok(MemoryByteChannel::new(fs.store.clone(), n_inode, spec_flags))
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
}

impl FileSystemProvider for MemoryFileSystemProvider {
    fn scheme(&self) -> &str {
        self.scheme_name()
    }

    fn new_file_system(
        &self,
        uri: &str,
        env: &BTreeMap<String, String>,
    ) -> FsResult<FileSystemRef> {
        let (c_name, _) = self._split_uri(uri)?;
        let spec_options = self._options_from_env(c_name, env)?;
        let fs: FileSystemRef = Self::instance(self.rule_syntax).mount(spec_options)?;
        Ok(fs)
    }

    fn get_file_system(&self, uri: &str) -> FsResult<FileSystemRef> {
        let (c_name, _) = self._split_uri(uri)?;
        let fs = self
            .dict_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(c_name)
            .and_then(Weak::upgrade)
            .filter(|fs| fs.is_open());
        match fs {
            Some(fs) => Ok(fs),
            None => Err(FsError::FileSystemNotFound(uri.to_string())),
        }
    }

    fn get_path(&self, uri: &str) -> FsResult<FsPath> {
        let (_, c_path) = self._split_uri(uri)?;
        let Some(c_path) = c_path else {
            return Err(FsError::InvalidPath {
                path: uri.to_string(),
                reason: "missing `!<path>` part".to_string(),
            });
        };
        let fs = self.get_file_system(uri)?;
        FsPath::parse(&fs, c_path, &[])
    }

    fn new_input_stream(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<InputStream> {
        check_input_options(options)?;
        Ok(Box::new(self._open(
            path,
            options,
            EnumFsOperation::NewInputStream,
        )?))
    }

    fn new_output_stream(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<OutputStream> {
        let l_options = derive_output_options(options)?;
        Ok(Box::new(self._open(
            path,
            &l_options,
            EnumFsOperation::NewOutputStream,
        )?))
    }

    fn new_byte_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        Ok(Box::new(self._open(
            path,
            options,
            EnumFsOperation::NewByteChannel,
        )?))
    }

    fn new_file_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        Ok(Box::new(self._open(
            path,
            options,
            EnumFsOperation::NewFileChannel,
        )?))
    }

    fn new_directory_stream(&self, dir: &FsPath) -> FsResult<DirectoryStream> {
        let fs = self._memory_fs(dir)?;
        let c_display = dir.to_string();
        let store = lock_store(&fs.store);
        let key = fs.key_of(&store, dir, true)?;
        let Some(inode) = store.entry(&key) else {
            return Err(FsError::NoSuchFile(c_display));
        };
        if !inode.is_directory() {
            return Err(FsError::NotDirectory(c_display));
        }
        store.check_owner_access(inode, EnumOwnerAccess::Read, &c_display)?;
        let l_entries = store
            .child_names(&key)
            .into_iter()
            .map(|name| Ok(dir.child(&name)))
            .collect::<Vec<FsResult<FsPath>>>();
        Ok(Box::new(l_entries.into_iter()))
    }

    fn create_directory(&self, dir: &FsPath, permissions: Option<PermissionSet>) -> FsResult<()> {
        let fs = self._memory_fs(dir)?;
        fs.check_writable(EnumFsOperation::CreateDirectory)?;
        let mut store = lock_store(&fs.store);
        let key = fs.key_of(&store, dir, false)?;
        store.insert(&key, EnumInodeData::Directory, permissions, &dir.to_string())?;
        Ok(())
    }

    fn create_symbolic_link(&self, link: &FsPath, target: &FsPath) -> FsResult<()> {
        let fs = self._memory_fs(link)?;
        fs.check_writable(EnumFsOperation::CreateSymbolicLink)?;
        let mut store = lock_store(&fs.store);
        let key = fs.key_of(&store, link, false)?;
        store.insert(
            &key,
            EnumInodeData::Symlink(target.to_string()),
            None,
            &link.to_string(),
        )?;
        Ok(())
    }

    fn create_link(&self, link: &FsPath, existing: &FsPath) -> FsResult<()> {
        let fs = self._same_memory_fs(link, existing)?;
        fs.check_writable(EnumFsOperation::CreateLink)?;
        let mut store = lock_store(&fs.store);
        let key_existing = fs.key_of(&store, existing, true)?;
        let Some(n_inode) = store.inode_id(&key_existing) else {
            return Err(FsError::NoSuchFile(existing.to_string()));
        };
        let key = fs.key_of(&store, link, false)?;
        store.link(&key, n_inode, &link.to_string())
    }

    fn delete(&self, path: &FsPath) -> FsResult<()> {
        let fs = self._memory_fs(path)?;
        fs.check_writable(EnumFsOperation::Delete)?;
        let mut store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, false)?;
        store.remove(&key, &path.to_string())
    }

    fn delete_if_exists(&self, path: &FsPath) -> FsResult<bool> {
        let fs = self._memory_fs(path)?;
        fs.check_writable(EnumFsOperation::DeleteIfExists)?;
        let mut store = lock_store(&fs.store);
        let key = match fs.key_of(&store, path, false) {
            Ok(key) => key,
            Err(FsError::NoSuchFile(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if store.inode_id(&key).is_none() {
            return Ok(false);
        }
        store.remove(&key, &path.to_string())?;
        Ok(true)
    }

    fn read_symbolic_link(&self, link: &FsPath) -> FsResult<FsPath> {
        let fs = self._memory_fs(link)?;
        let store = lock_store(&fs.store);
        let key = fs.key_of(&store, link, false)?;
        match store.entry(&key).map(|inode| &inode.data) {
            Some(EnumInodeData::Symlink(c_target)) => {
                FsPath::parse(link.file_system(), c_target, &[])
            }
            Some(_) => Err(FsError::InvalidPath {
                path: link.to_string(),
                reason: "not a symbolic link".to_string(),
            }),
            None => Err(FsError::NoSuchFile(link.to_string())),
        }
    }

    fn copy(&self, source: &FsPath, target: &FsPath, options: &[EnumCopyOption]) -> FsResult<()> {
        let fs = self._same_memory_fs(source, target)?;
        fs.check_writable(EnumFsOperation::Copy)?;
        let if_nofollow = options.contains(&EnumCopyOption::NoFollowLinks);
        let if_copy_attrs = options.contains(&EnumCopyOption::CopyAttributes);
        let c_display_src = source.to_string();
        let c_display_dst = target.to_string();

        let mut store = lock_store(&fs.store);
        let key_src = fs.key_of(&store, source, !if_nofollow)?;
        let Some(inode_src) = store.entry(&key_src).cloned() else {
            return Err(FsError::NoSuchFile(c_display_src));
        };
        if matches!(inode_src.data, EnumInodeData::File(_)) {
            store.check_owner_access(&inode_src, EnumOwnerAccess::Read, &c_display_src)?;
        }
        let key_dst = fs.key_of(&store, target, false)?;
        if key_src == key_dst {
            return Ok(());
        }
        if store.inode_id(&key_dst).is_some() {
            if !options.contains(&EnumCopyOption::ReplaceExisting) {
                return Err(FsError::FileAlreadyExists(c_display_dst));
            }
            store.remove(&key_dst, &c_display_dst)?;
        }

        let permissions = if_copy_attrs.then_some(inode_src.permissions);
        let n_inode = store.insert(&key_dst, inode_src.data, permissions, &c_display_dst)?;
        if if_copy_attrs && let Some(inode_dst) = store.inode_mut(n_inode) {
            inode_dst.time_modified = inode_src.time_modified;
            inode_dst.time_accessed = inode_src.time_accessed;
            inode_dst.time_created = inode_src.time_created;
            inode_dst.dict_xattrs = inode_src.dict_xattrs;
        }
        Ok(())
    }

    fn move_path(
        &self,
        source: &FsPath,
        target: &FsPath,
        options: &[EnumCopyOption],
    ) -> FsResult<()> {
        let fs = self._same_memory_fs(source, target)?;
        fs.check_writable(EnumFsOperation::Move)?;
        let c_display_dst = target.to_string();
        let mut store = lock_store(&fs.store);
        let key_src = fs.key_of(&store, source, false)?;
        if store.inode_id(&key_src).is_none() {
            return Err(FsError::NoSuchFile(source.to_string()));
        }
        let key_dst = fs.key_of(&store, target, false)?;
        if key_src == key_dst {
            return Ok(());
        }
        if store.inode_id(&key_dst).is_some() {
            if !options.contains(&EnumCopyOption::ReplaceExisting) {
                return Err(FsError::FileAlreadyExists(c_display_dst));
            }
            store.remove(&key_dst, &c_display_dst)?;
        }
        store.rename(&key_src, &key_dst, &c_display_dst)
    }

    fn is_same_file(&self, path_a: &FsPath, path_b: &FsPath) -> FsResult<bool> {
        if path_a == path_b {
            return Ok(true);
        }
        if !is_same_file_system(path_a.file_system(), path_b.file_system()) {
            return Ok(false);
        }
        let fs = self._memory_fs(path_a)?;
        let store = lock_store(&fs.store);
        let mut l_inodes = Vec::with_capacity(2);
        for path in [path_a, path_b] {
            let key = fs.key_of(&store, path, true)?;
            let Some(n_inode) = store.inode_id(&key) else {
                return Err(FsError::NoSuchFile(path.to_string()));
            };
            l_inodes.push(n_inode);
        }
        Ok(l_inodes[0] == l_inodes[1])
    }

    fn is_hidden(&self, path: &FsPath) -> FsResult<bool> {
        self._memory_fs(path)?;
        Ok(self.rule_syntax == EnumPathSyntax::Unix
            && path.file_name().is_some_and(|name| name.starts_with('.')))
    }

    fn get_file_store(&self, path: &FsPath) -> FsResult<FileStore> {
        let fs = self._memory_fs(path)?;
        self.read_attributes(path, true)?;
        fs.file_stores()
            .into_iter()
            .next()
            .ok_or_else(|| FsError::NoSuchFile(path.to_string()))
    }

    fn check_access(&self, path: &FsPath, modes: &[EnumAccessMode]) -> FsResult<()> {
        let fs = self._memory_fs(path)?;
        let c_display = path.to_string();
        let store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, true)?;
        let Some(inode) = store.entry(&key) else {
            return Err(FsError::NoSuchFile(c_display));
        };
        for enum_mode in modes {
            let rule_access = match enum_mode {
                EnumAccessMode::Read => EnumOwnerAccess::Read,
                EnumAccessMode::Write => {
                    if fs.is_read_only() {
                        return Err(FsError::AccessDenied(c_display));
                    }
                    EnumOwnerAccess::Write
                }
                EnumAccessMode::Execute => EnumOwnerAccess::Execute,
            };
            store.check_owner_access(inode, rule_access, &c_display)?;
        }
        Ok(())
    }

    fn read_attributes(&self, path: &FsPath, if_follow_links: bool) -> FsResult<FileAttributes> {
        let fs = self._memory_fs(path)?;
        let c_display = path.to_string();
        let store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, if_follow_links)?;
        let Some(n_inode) = store.inode_id(&key) else {
            return Err(FsError::NoSuchFile(c_display));
        };
        store.attributes(n_inode, &c_display)
    }

    fn read_attribute_map(
        &self,
        path: &FsPath,
        attributes: &str,
        if_follow_links: bool,
    ) -> FsResult<BTreeMap<String, AttributeValue>> {
        let fs = self._memory_fs(path)?;
        let c_display = path.to_string();
        let store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, if_follow_links)?;
        let Some(n_inode) = store.inode_id(&key) else {
            return Err(FsError::NoSuchFile(c_display));
        };
        let attrs = store.attributes(n_inode, &c_display)?;
        derive_attribute_map(&attrs, attributes, || {
            Ok(store
                .inode(n_inode)
                .map(|inode| inode.dict_xattrs.clone())
                .unwrap_or_default())
        })
    }

    fn set_attribute(
        &self,
        path: &FsPath,
        attribute: &str,
        value: AttributeValue,
        if_follow_links: bool,
    ) -> FsResult<()> {
        let fs = self._memory_fs(path)?;
        fs.check_writable(EnumFsOperation::SetAttribute)?;
        let (c_view, c_name) = split_attribute_name(attribute);
        if ![C_ATTRIBUTE_VIEW_BASIC, C_ATTRIBUTE_VIEW_POSIX, C_ATTRIBUTE_VIEW_USER]
            .contains(&c_view)
        {
            return Err(FsError::UnsupportedOperation(format!(
                "attribute view `{c_view}`"
            )));
        }
        let mut store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, if_follow_links)?;
        let Some(inode) = store.entry_mut(&key) else {
            return Err(FsError::NoSuchFile(path.to_string()));
        };
        match (c_view, c_name, value) {
            (C_ATTRIBUTE_VIEW_USER, _, AttributeValue::Bytes(raw)) => {
                inode.dict_xattrs.insert(c_name.to_string(), raw);
            }
            (C_ATTRIBUTE_VIEW_USER, _, _) => {
                return Err(FsError::InvalidAttribute(attribute.to_string()));
            }
            (_, "lastModifiedTime", AttributeValue::Time(time)) => inode.time_modified = time,
            (_, "lastAccessTime", AttributeValue::Time(time)) => inode.time_accessed = time,
            (_, "creationTime", AttributeValue::Time(time)) => inode.time_created = time,
            (C_ATTRIBUTE_VIEW_POSIX, "permissions", AttributeValue::Permissions(perms)) => {
                inode.permissions = perms;
            }
            _ => return Err(FsError::InvalidAttribute(attribute.to_string())),
        }
        Ok(())
    }

    fn to_real_path(&self, path: &FsPath) -> FsResult<FsPath> {
        let fs = self._memory_fs(path)?;
        let store = lock_store(&fs.store);
        let key = fs.key_of(&store, path, true)?;
        if store.inode_id(&key).is_none() {
            return Err(FsError::NoSuchFile(path.to_string()));
        }
        Ok(MemoryFileSystem::path_of_key(path.file_system(), &key))
    }

    fn to_absolute_path(&self, path: &FsPath) -> FsResult<FsPath> {
        let fs = self._memory_fs(path)?;
        let (c_root, l_names) = fs.absolute_parts(path);
        Ok(FsPath::from_parts(
            path.file_system(),
            Some(c_root),
            l_names,
            true,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_registered(provider: &MemoryFileSystemProvider, c_name: &str) -> bool {
        provider
            .dict_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(c_name)
    }

    #[test]
    fn dropped_filesystems_are_pruned_on_mount() {
        let provider = MemoryFileSystemProvider::instance(EnumPathSyntax::Unix);
        let fs = provider
            .mount(SpecMemoryFsOptions {
                name: Some("pruned-on-mount".to_string()),
                ..SpecMemoryFsOptions::unix()
            })
            .expect("mount");
        assert!(is_registered(&provider, "pruned-on-mount"));
        drop(fs);

        let fs_other = provider
            .mount(SpecMemoryFsOptions::unix())
            .expect("mount");
        assert!(!is_registered(&provider, "pruned-on-mount"));
        assert!(is_registered(&provider, fs_other.name()));
    }
}
