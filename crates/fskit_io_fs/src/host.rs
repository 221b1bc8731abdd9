//! Backend over the native OS filesystem.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use filetime::FileTime;

use crate::conf::{
    C_ATTRIBUTE_VIEW_BASIC, C_ATTRIBUTE_VIEW_POSIX, C_ATTRIBUTE_VIEW_USER, C_SCHEME_HOST,
};
use crate::error::{FsError, FsResult};
use crate::fs::{
    DirectoryStream, FileSystem, FileSystemProvider, FileSystemRef, InputStream, OutputStream,
    ProviderRef, SeekableByteChannel,
};
use crate::path::FsPath;
use crate::posix::PermissionSet;
use crate::spec::{
    AttributeValue, EnumAccessMode, EnumCopyOption, EnumFileKind, EnumOpenOption,
    EnumPathSyntax, FileAttributes, FileStore,
};
use crate::util::{
    check_input_options, derive_attribute_map, derive_open_flags, derive_output_options,
    split_attribute_name,
};

static HOST_FILE_SYSTEM: OnceLock<Arc<HostFileSystem>> = OnceLock::new();
static HOST_PROVIDER: OnceLock<Arc<HostFileSystemProvider>> = OnceLock::new();

/// The process-wide host filesystem.
pub fn default_file_system() -> FileSystemRef {
    HOST_FILE_SYSTEM
        .get_or_init(|| Arc::new(HostFileSystem))
        .clone()
}

fn _host_provider() -> Arc<HostFileSystemProvider> {
    HOST_PROVIDER
        .get_or_init(|| Arc::new(HostFileSystemProvider))
        .clone()
}

/// Native path of a host-bound `FsPath`.
pub fn to_native_path(path: &FsPath) -> PathBuf {
    PathBuf::from(path.to_string())
}

/// Host-bound `FsPath` of a native path.
pub fn from_native_path(path: &Path) -> FsResult<FsPath> {
    FsPath::parse(&default_file_system(), &path.to_string_lossy(), &[])
}

fn _io_error(path: &FsPath) -> impl FnOnce(io::Error) -> FsError + '_ {
    move |e| FsError::from_io(path.to_string(), e)
}

////////////////////////////////////////////////////////////////////////////////
// #region FileSystem

#[derive(Debug)]
pub struct HostFileSystem;

impl FileSystem for HostFileSystem {
    fn provider(&self) -> ProviderRef {
        _host_provider()
    }

    fn syntax(&self) -> EnumPathSyntax {
        EnumPathSyntax::native()
    }

    fn root_directories(&self) -> Vec<String> {
        if cfg!(windows) {
            return (b'A'..=b'Z')
                .map(|c_drive| format!("{}:\\", c_drive as char))
                .filter(|c_root| Path::new(c_root).exists())
                .collect();
        }
        vec!["/".to_string()]
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&self) -> FsResult<()> {
        Err(FsError::UnsupportedOperation(
            "the host filesystem cannot be closed".to_string(),
        ))
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn file_stores(&self) -> Vec<FileStore> {
        self.root_directories()
            .into_iter()
            .map(|c_root| FileStore {
                name: c_root,
                kind: C_SCHEME_HOST.to_string(),
                if_read_only: false,
            })
            .collect()
    }

    fn supported_file_attribute_views(&self) -> BTreeSet<String> {
        let mut set_views = BTreeSet::from([C_ATTRIBUTE_VIEW_BASIC.to_string()]);
        if cfg!(unix) {
            set_views.insert(C_ATTRIBUTE_VIEW_POSIX.to_string());
            set_views.insert(C_ATTRIBUTE_VIEW_USER.to_string());
        }
        set_views
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Provider

#[derive(Debug)]
pub struct HostFileSystemProvider;

impl HostFileSystemProvider {
    fn _check_host(&self, path: &FsPath) -> FsResult<PathBuf> {
        if path.file_system().as_any().is::<HostFileSystem>() {
            return Ok(to_native_path(path));
        }
        Err(FsError::ProviderMismatch(C_SCHEME_HOST.to_string()))
    }

    fn _open(&self, path: &FsPath, options: &[EnumOpenOption]) -> FsResult<File> {
        let path_native = self._check_host(path)?;
        let spec_flags = derive_open_flags(options)?;
        let mut open_options = OpenOptions::new();
        open_options
            .read(spec_flags.if_read)
            .write(spec_flags.if_write && !spec_flags.if_append)
            .append(spec_flags.if_append)
            .truncate(spec_flags.if_truncate)
            .create(spec_flags.if_create)
            .create_new(spec_flags.if_create_new);
        if spec_flags.if_nofollow {
            let meta = fs::symlink_metadata(&path_native);
            if meta.is_ok_and(|meta| meta.file_type().is_symlink()) {
                return Err(FsError::FileSystemLoop(path.to_string()));
            }
        }
        let file = open_options.open(&path_native).map_err(_io_error(path))?;
        if file.metadata().is_ok_and(|meta| meta.is_dir()) {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        Ok(file)
    }

    fn _attributes(&self, path: &FsPath, if_follow_links: bool) -> FsResult<FileAttributes> {
        let path_native = self._check_host(path)?;
        let meta = if if_follow_links {
            fs::metadata(&path_native)
        } else {
            fs::symlink_metadata(&path_native)
        }
        .map_err(_io_error(path))?;
        let file_type = meta.file_type();
        let enum_kind = if file_type.is_symlink() {
            EnumFileKind::SymbolicLink
        } else if file_type.is_dir() {
            EnumFileKind::Directory
        } else if file_type.is_file() {
            EnumFileKind::RegularFile
        } else {
            EnumFileKind::Other
        };
        let time_modified = FileTime::from_last_modification_time(&meta);
        let time_accessed = FileTime::from_last_access_time(&meta);
        let time_created = FileTime::from_creation_time(&meta).unwrap_or(time_modified);
        Ok(FileAttributes {
            enum_kind,
            n_size: meta.len(),
            time_modified: _to_system_time(time_modified),
            time_accessed: _to_system_time(time_accessed),
            time_created: _to_system_time(time_created),
            permissions: _native_permissions(&meta),
            n_file_key: _file_key(&meta),
        })
    }
}

fn _to_system_time(time: FileTime) -> std::time::SystemTime {
    let n_seconds = time.unix_seconds();
    let duration = std::time::Duration::new(n_seconds.unsigned_abs(), time.nanoseconds());
    if n_seconds >= 0 {
        std::time::UNIX_EPOCH + duration
    } else {
        std::time::UNIX_EPOCH - duration
    }
}

#[cfg(unix)]
fn _native_permissions(meta: &fs::Metadata) -> Option<PermissionSet> {
    use std::os::unix::fs::PermissionsExt;
    Some(PermissionSet::from_native_mode(meta.permissions().mode()))
}

#[cfg(not(unix))]
fn _native_permissions(_meta: &fs::Metadata) -> Option<PermissionSet> {
    None
}

#[cfg(unix)]
fn _file_key(meta: &fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn _file_key(_meta: &fs::Metadata) -> Option<u64> {
    None
}

#[cfg(unix)]
fn _set_native_permissions(path_native: &Path, permissions: PermissionSet) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(
        path_native,
        fs::Permissions::from_mode(permissions.to_int_mode()),
    )
}

#[cfg(not(unix))]
fn _set_native_permissions(_path_native: &Path, _permissions: PermissionSet) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(unix)]
fn _load_xattrs(path_native: &Path) -> io::Result<BTreeMap<String, Vec<u8>>> {
    let mut dict_xattrs = BTreeMap::new();
    for c_full in xattr::list(path_native)? {
        let c_full = c_full.to_string_lossy().to_string();
        let Some(c_name) = c_full.strip_prefix("user.") else {
            continue;
        };
        if let Some(raw) = xattr::get(path_native, &c_full)? {
            dict_xattrs.insert(c_name.to_string(), raw);
        }
    }
    Ok(dict_xattrs)
}

#[cfg(not(unix))]
fn _load_xattrs(_path_native: &Path) -> io::Result<BTreeMap<String, Vec<u8>>> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(unix)]
fn _store_xattr(path_native: &Path, c_name: &str, raw: &[u8]) -> io::Result<()> {
    xattr::set(path_native, format!("user.{c_name}"), raw)
}

#[cfg(not(unix))]
fn _store_xattr(_path_native: &Path, _c_name: &str, _raw: &[u8]) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(unix)]
fn _create_native_symlink(path_link: &Path, path_target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(path_target, path_link)
}

#[cfg(windows)]
fn _create_native_symlink(path_link: &Path, path_target: &Path) -> io::Result<()> {
    if path_target.is_dir() {
        return std::os::windows::fs::symlink_dir(path_target, path_link);
    }
    std::os::windows::fs::symlink_file(path_target, path_link)
}

impl SeekableByteChannel for File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, n_size: u64) -> io::Result<()> {
        if n_size < self.size()? {
            self.set_len(n_size)?;
            let n_position = self.stream_position()?;
            if n_position > n_size {
                self.seek(io::SeekFrom::Start(n_size))?;
            }
        }
        Ok(())
    }
}

impl FileSystemProvider for HostFileSystemProvider {
    fn scheme(&self) -> &str {
        C_SCHEME_HOST
    }

    fn new_file_system(
        &self,
        uri: &str,
        _env: &BTreeMap<String, String>,
    ) -> FsResult<FileSystemRef> {
        Err(FsError::FileSystemAlreadyExists(uri.to_string()))
    }

    fn get_file_system(&self, uri: &str) -> FsResult<FileSystemRef> {
        if uri.starts_with("file:") {
            return Ok(default_file_system());
        }
        Err(FsError::FileSystemNotFound(uri.to_string()))
    }

    fn get_path(&self, uri: &str) -> FsResult<FsPath> {
        let Some(c_path) = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
        else {
            return Err(FsError::InvalidPath {
                path: uri.to_string(),
                reason: format!("expected scheme `{C_SCHEME_HOST}`"),
            });
        };
        FsPath::parse(&default_file_system(), c_path, &[])
    }

    fn new_input_stream(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<InputStream> {
        check_input_options(options)?;
        Ok(Box::new(self._open(path, options)?))
    }

    fn new_output_stream(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<OutputStream> {
        let l_options = derive_output_options(options)?;
        Ok(Box::new(self._open(path, &l_options)?))
    }

    fn new_byte_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        Ok(Box::new(self._open(path, options)?))
    }

    fn new_directory_stream(&self, dir: &FsPath) -> FsResult<DirectoryStream> {
        let path_native = self._check_host(dir)?;
        let iter_entries = fs::read_dir(&path_native).map_err(_io_error(dir))?;
        let mut l_entries = iter_entries
            .map(|entry| {
                let entry = entry.map_err(_io_error(dir))?;
                Ok(dir.child(&entry.file_name().to_string_lossy()))
            })
            .collect::<Vec<FsResult<FsPath>>>();
        // `read_dir` order is unspecified.
        l_entries.sort_by_key(|entry| match entry {
            Ok(path) => path.file_name().map(String::from),
            Err(_) => None,
        });
        Ok(Box::new(l_entries.into_iter()))
    }

    fn create_directory(&self, dir: &FsPath, permissions: Option<PermissionSet>) -> FsResult<()> {
        let path_native = self._check_host(dir)?;
        fs::create_dir(&path_native).map_err(_io_error(dir))?;
        if let Some(permissions) = permissions {
            _set_native_permissions(&path_native, permissions).map_err(_io_error(dir))?;
        }
        Ok(())
    }

    fn create_symbolic_link(&self, link: &FsPath, target: &FsPath) -> FsResult<()> {
        let path_native = self._check_host(link)?;
        _create_native_symlink(&path_native, &to_native_path(target)).map_err(_io_error(link))
    }

    fn create_link(&self, link: &FsPath, existing: &FsPath) -> FsResult<()> {
        let path_native = self._check_host(link)?;
        let path_existing = self._check_host(existing)?;
        fs::hard_link(&path_existing, &path_native).map_err(_io_error(link))
    }

    fn delete(&self, path: &FsPath) -> FsResult<()> {
        let path_native = self._check_host(path)?;
        let meta = fs::symlink_metadata(&path_native).map_err(_io_error(path))?;
        if meta.is_dir() {
            return fs::remove_dir(&path_native).map_err(_io_error(path));
        }
        fs::remove_file(&path_native).map_err(_io_error(path))
    }

    fn read_symbolic_link(&self, link: &FsPath) -> FsResult<FsPath> {
        let path_native = self._check_host(link)?;
        let path_target = fs::read_link(&path_native).map_err(_io_error(link))?;
        FsPath::parse(link.file_system(), &path_target.to_string_lossy(), &[])
    }

    fn copy(&self, source: &FsPath, target: &FsPath, options: &[EnumCopyOption]) -> FsResult<()> {
        let path_src = self._check_host(source)?;
        let path_dst = self._check_host(target)?;
        let if_nofollow = options.contains(&EnumCopyOption::NoFollowLinks);
        let attrs_src = self._attributes(source, !if_nofollow)?;

        if fs::symlink_metadata(&path_dst).is_ok() {
            if !options.contains(&EnumCopyOption::ReplaceExisting) {
                return Err(FsError::FileAlreadyExists(target.to_string()));
            }
            self.delete(target)?;
        }

        match attrs_src.enum_kind {
            EnumFileKind::Directory => fs::create_dir(&path_dst).map_err(_io_error(target))?,
            EnumFileKind::SymbolicLink => {
                let path_link_target = fs::read_link(&path_src).map_err(_io_error(source))?;
                _create_native_symlink(&path_dst, &path_link_target).map_err(_io_error(target))?;
                return Ok(());
            }
            EnumFileKind::RegularFile => {
                fs::copy(&path_src, &path_dst).map_err(_io_error(target))?;
            }
            EnumFileKind::Other => {
                return Err(FsError::UnsupportedOperation(format!(
                    "cannot copy special file {source}"
                )));
            }
        }

        if options.contains(&EnumCopyOption::CopyAttributes) {
            let time_modified = FileTime::from_system_time(attrs_src.time_modified);
            let time_accessed = FileTime::from_system_time(attrs_src.time_accessed);
            filetime::set_file_times(&path_dst, time_accessed, time_modified)
                .map_err(_io_error(target))?;
            if let Some(permissions) = attrs_src.permissions {
                _set_native_permissions(&path_dst, permissions).map_err(_io_error(target))?;
            }
        }
        Ok(())
    }

    fn move_path(
        &self,
        source: &FsPath,
        target: &FsPath,
        options: &[EnumCopyOption],
    ) -> FsResult<()> {
        let path_src = self._check_host(source)?;
        let path_dst = self._check_host(target)?;
        if fs::symlink_metadata(&path_dst).is_ok()
            && !options.contains(&EnumCopyOption::AtomicMove)
        {
            if !options.contains(&EnumCopyOption::ReplaceExisting) {
                return Err(FsError::FileAlreadyExists(target.to_string()));
            }
            self.delete(target)?;
        }
        fs::rename(&path_src, &path_dst).map_err(_io_error(target))
    }

    fn is_same_file(&self, path_a: &FsPath, path_b: &FsPath) -> FsResult<bool> {
        if path_a == path_b {
            return Ok(true);
        }
        if self._check_host(path_a).is_err() || self._check_host(path_b).is_err() {
            return Ok(false);
        }
        let attrs_a = self._attributes(path_a, true)?;
        let attrs_b = self._attributes(path_b, true)?;
        match (attrs_a.n_file_key, attrs_b.n_file_key) {
            (Some(n_a), Some(n_b)) => Ok(n_a == n_b),
            _ => Ok(self.to_real_path(path_a)? == self.to_real_path(path_b)?),
        }
    }

    fn is_hidden(&self, path: &FsPath) -> FsResult<bool> {
        self._check_host(path)?;
        Ok(path.file_name().is_some_and(|name| name.starts_with('.')))
    }

    fn get_file_store(&self, path: &FsPath) -> FsResult<FileStore> {
        let path_real = self.to_real_path(path)?;
        Ok(FileStore {
            name: path_real.root_name().unwrap_or_default().to_string(),
            kind: C_SCHEME_HOST.to_string(),
            if_read_only: false,
        })
    }

    fn check_access(&self, path: &FsPath, modes: &[EnumAccessMode]) -> FsResult<()> {
        let path_native = self._check_host(path)?;
        let meta = fs::metadata(&path_native).map_err(_io_error(path))?;
        for enum_mode in modes {
            match enum_mode {
                EnumAccessMode::Read => {
                    if meta.is_dir() {
                        fs::read_dir(&path_native).map_err(_io_error(path))?;
                    } else {
                        File::open(&path_native).map_err(_io_error(path))?;
                    }
                }
                EnumAccessMode::Write => {
                    if meta.permissions().readonly() {
                        return Err(FsError::AccessDenied(path.to_string()));
                    }
                }
                EnumAccessMode::Execute => {
                    let if_executable = _native_permissions(&meta)
                        .is_none_or(|perms| perms.to_int_mode() & 0o111 != 0);
                    if !if_executable {
                        return Err(FsError::AccessDenied(path.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    fn read_attributes(&self, path: &FsPath, if_follow_links: bool) -> FsResult<FileAttributes> {
        self._attributes(path, if_follow_links)
    }

    fn read_attribute_map(
        &self,
        path: &FsPath,
        attributes: &str,
        if_follow_links: bool,
    ) -> FsResult<BTreeMap<String, AttributeValue>> {
        let attrs = self._attributes(path, if_follow_links)?;
        derive_attribute_map(&attrs, attributes, || {
            _load_xattrs(&to_native_path(path)).map_err(_io_error(path))
        })
    }

    fn set_attribute(
        &self,
        path: &FsPath,
        attribute: &str,
        value: AttributeValue,
        if_follow_links: bool,
    ) -> FsResult<()> {
        let path_native = self._check_host(path)?;
        let (c_view, c_name) = split_attribute_name(attribute);
        let set_time = |time| -> FsResult<()> {
            let time = FileTime::from_system_time(time);
            let res = match c_name {
                "lastModifiedTime" if if_follow_links => filetime::set_file_mtime(&path_native, time),
                "lastModifiedTime" => {
                    let meta = fs::symlink_metadata(&path_native).map_err(_io_error(path))?;
                    filetime::set_symlink_file_times(
                        &path_native,
                        FileTime::from_last_access_time(&meta),
                        time,
                    )
                }
                "lastAccessTime" => filetime::set_file_atime(&path_native, time),
                _ => return Err(FsError::InvalidAttribute(attribute.to_string())),
            };
            res.map_err(_io_error(path))
        };
        match (c_view, c_name, value) {
            (C_ATTRIBUTE_VIEW_BASIC | C_ATTRIBUTE_VIEW_POSIX, _, AttributeValue::Time(time)) => {
                set_time(time)
            }
            (C_ATTRIBUTE_VIEW_POSIX, "permissions", AttributeValue::Permissions(perms)) => {
                _set_native_permissions(&path_native, perms).map_err(_io_error(path))
            }
            (C_ATTRIBUTE_VIEW_USER, _, AttributeValue::Bytes(raw)) => {
                _store_xattr(&path_native, c_name, &raw).map_err(_io_error(path))
            }
            (C_ATTRIBUTE_VIEW_BASIC | C_ATTRIBUTE_VIEW_POSIX | C_ATTRIBUTE_VIEW_USER, _, _) => {
                Err(FsError::InvalidAttribute(attribute.to_string()))
            }
            (other, _, _) => Err(FsError::UnsupportedOperation(format!(
                "attribute view `{other}`"
            ))),
        }
    }

    fn to_real_path(&self, path: &FsPath) -> FsResult<FsPath> {
        let path_native = self._check_host(path)?;
        let path_real = fs::canonicalize(&path_native).map_err(_io_error(path))?;
        from_native_path(&path_real)
    }

    fn to_absolute_path(&self, path: &FsPath) -> FsResult<FsPath> {
        let path_native = self._check_host(path)?;
        let path_abs = std::path::absolute(&path_native).map_err(_io_error(path))?;
        from_native_path(&path_abs)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
