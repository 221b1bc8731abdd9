//! Filesystem handle and provider abstractions.
//!
//! A [`FileSystem`] is a backend instance (roots, path model, capability
//! queries). Its [`FileSystemProvider`] performs every I/O operation on
//! paths bound to that instance. Helpers in [`crate::files`] always route a
//! call through `path.file_system().provider()`, so a decorating provider
//! sees every operation on the paths it hands out.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

use globset::GlobMatcher;
use regex::Regex;

use crate::error::{FsError, FsResult};
use crate::path::FsPath;
use crate::posix::PermissionSet;
use crate::spec::{
    AttributeValue, EnumAccessMode, EnumCopyOption, EnumOpenOption, EnumPathSyntax,
    FileAttributeView, FileAttributes, FileStore, UserPrincipal,
};
use crate::util::{TypePathPattern, compile_path_pattern};

pub type FileSystemRef = Arc<dyn FileSystem>;
pub type ProviderRef = Arc<dyn FileSystemProvider>;
pub type InputStream = Box<dyn Read + Send>;
pub type OutputStream = Box<dyn Write + Send>;
/// Lazily yielded directory entries; iteration errors are reported in-band.
pub type DirectoryStream = Box<dyn Iterator<Item = FsResult<FsPath>> + Send>;

/// Identity of two handles (not mere equivalence).
pub fn is_same_file_system(fs_a: &FileSystemRef, fs_b: &FileSystemRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(fs_a), Arc::as_ptr(fs_b))
}

/// Both handles are served by the same backend kind.
pub fn is_same_provider_family(fs_a: &FileSystemRef, fs_b: &FileSystemRef) -> bool {
    fs_a.provider().scheme() == fs_b.provider().scheme()
}

////////////////////////////////////////////////////////////////////////////////
// #region Channels

/// Byte channel with a position that can be read, written and resized.
pub trait SeekableByteChannel: Read + Write + Seek + Send {
    /// Current size of the underlying entry.
    fn size(&mut self) -> io::Result<u64>;
    /// Shrink to `n_size` bytes; a larger value leaves the entry unchanged.
    fn truncate(&mut self, n_size: u64) -> io::Result<()>;
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileSystem

/// One backend instance.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Provider performing I/O for paths bound to this handle.
    fn provider(&self) -> ProviderRef;

    fn syntax(&self) -> EnumPathSyntax;

    fn separator(&self) -> &'static str {
        self.syntax().separator()
    }

    /// String forms of the root directories.
    fn root_directories(&self) -> Vec<String>;

    fn is_open(&self) -> bool;

    /// Close the backend instance; further operations fail.
    fn close(&self) -> FsResult<()>;

    fn is_read_only(&self) -> bool;

    fn file_stores(&self) -> Vec<FileStore>;

    /// Names of the attribute views understood by `read_attribute_map`.
    fn supported_file_attribute_views(&self) -> BTreeSet<String>;

    /// Compile a `glob:` or `regex:` matcher.
    fn path_matcher(&self, syntax_and_pattern: &str) -> FsResult<PathMatcher> {
        PathMatcher::compile(syntax_and_pattern)
    }

    fn lookup_user_principal(&self, name: &str) -> FsResult<UserPrincipal> {
        Err(FsError::UnsupportedOperation(format!(
            "user principal lookup of `{name}`"
        )))
    }

    fn as_any(&self) -> &dyn Any;
}

/// Path construction on a shared handle.
pub trait FileSystemExt {
    /// Parse a path bound to this handle.
    fn get_path(&self, first: &str, more: &[&str]) -> FsResult<FsPath>;

    /// Root directories as paths bound to this handle.
    fn root_paths(&self) -> FsResult<Vec<FsPath>>;
}

impl FileSystemExt for FileSystemRef {
    fn get_path(&self, first: &str, more: &[&str]) -> FsResult<FsPath> {
        FsPath::parse(self, first, more)
    }

    fn root_paths(&self) -> FsResult<Vec<FsPath>> {
        self.root_directories()
            .iter()
            .map(|root| FsPath::parse(self, root, &[]))
            .collect()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileSystemProvider

/// Every I/O operation of one backend kind.
pub trait FileSystemProvider: Send + Sync + fmt::Debug {
    /// Backend kind identifier.
    fn scheme(&self) -> &str;

    /// Mount a new backend instance.
    fn new_file_system(
        &self,
        uri: &str,
        env: &BTreeMap<String, String>,
    ) -> FsResult<FileSystemRef>;

    /// Mount a backend instance stored in a file.
    fn new_file_system_from_path(
        &self,
        path: &FsPath,
        env: &BTreeMap<String, String>,
    ) -> FsResult<FileSystemRef> {
        let _ = env;
        Err(FsError::UnsupportedOperation(format!(
            "`{}` cannot mount {path}",
            self.scheme()
        )))
    }

    /// Look up an open backend instance.
    fn get_file_system(&self, uri: &str) -> FsResult<FileSystemRef>;

    fn get_path(&self, uri: &str) -> FsResult<FsPath>;

    fn new_input_stream(&self, path: &FsPath, options: &[EnumOpenOption])
    -> FsResult<InputStream>;

    /// Open for writing; no options means create, truncate and write.
    fn new_output_stream(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<OutputStream>;

    fn new_byte_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>>;

    fn new_file_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        self.new_byte_channel(path, options)
    }

    fn new_asynchronous_file_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        let _ = options;
        Err(FsError::UnsupportedOperation(format!(
            "asynchronous channel on {path}"
        )))
    }

    /// Entries of `dir`, bound to the same handle as `dir`.
    fn new_directory_stream(&self, dir: &FsPath) -> FsResult<DirectoryStream>;

    fn create_directory(&self, dir: &FsPath, permissions: Option<PermissionSet>) -> FsResult<()>;

    fn create_symbolic_link(&self, link: &FsPath, target: &FsPath) -> FsResult<()>;

    fn create_link(&self, link: &FsPath, existing: &FsPath) -> FsResult<()>;

    /// Delete one entry; a symbolic link is removed, never its target.
    fn delete(&self, path: &FsPath) -> FsResult<()>;

    /// Delete one entry if present; `false` when nothing existed.
    fn delete_if_exists(&self, path: &FsPath) -> FsResult<bool> {
        match self.delete(path) {
            Ok(()) => Ok(true),
            Err(FsError::NoSuchFile(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_symbolic_link(&self, link: &FsPath) -> FsResult<FsPath>;

    /// Copy one entry within this backend; directories are copied empty.
    fn copy(&self, source: &FsPath, target: &FsPath, options: &[EnumCopyOption])
    -> FsResult<()>;

    fn move_path(
        &self,
        source: &FsPath,
        target: &FsPath,
        options: &[EnumCopyOption],
    ) -> FsResult<()>;

    fn is_same_file(&self, path_a: &FsPath, path_b: &FsPath) -> FsResult<bool>;

    fn is_hidden(&self, path: &FsPath) -> FsResult<bool>;

    fn get_file_store(&self, path: &FsPath) -> FsResult<FileStore>;

    /// Fail unless every requested access mode is granted.
    fn check_access(&self, path: &FsPath, modes: &[EnumAccessMode]) -> FsResult<()>;

    /// Snapshot of one attribute view.
    fn get_file_attribute_view(
        &self,
        path: &FsPath,
        c_view: &str,
        if_follow_links: bool,
    ) -> FsResult<FileAttributeView> {
        let dict_values = self.read_attribute_map(path, &format!("{c_view}:*"), if_follow_links)?;
        Ok(FileAttributeView {
            name: c_view.to_string(),
            dict_values,
        })
    }

    fn read_attributes(&self, path: &FsPath, if_follow_links: bool) -> FsResult<FileAttributes>;

    /// Read `view:name1,name2` or `view:*`; a bare list reads the basic view.
    fn read_attribute_map(
        &self,
        path: &FsPath,
        attributes: &str,
        if_follow_links: bool,
    ) -> FsResult<BTreeMap<String, AttributeValue>>;

    /// Set one `view:name` attribute.
    fn set_attribute(
        &self,
        path: &FsPath,
        attribute: &str,
        value: AttributeValue,
        if_follow_links: bool,
    ) -> FsResult<()>;

    /// Absolute path with every symbolic link resolved; the entry must exist.
    fn to_real_path(&self, path: &FsPath) -> FsResult<FsPath>;

    fn to_absolute_path(&self, path: &FsPath) -> FsResult<FsPath>;
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathMatcher

/// Compiled `glob:` or `regex:` path matcher.
///
/// Globs are matched against the `/`-separated rendering of a path and `*`
/// never crosses a separator; regexes are matched against the native
/// rendering.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: TypePathPattern,
}

impl PathMatcher {
    pub fn compile(syntax_and_pattern: &str) -> FsResult<Self> {
        Ok(Self {
            pattern: compile_path_pattern(syntax_and_pattern)?,
        })
    }

    pub fn matches(&self, path: &FsPath) -> bool {
        match &self.pattern {
            TypePathPattern::Glob(matcher) => _is_glob_matching(matcher, path),
            TypePathPattern::Regex(regex) => _is_regex_matching(regex, path),
        }
    }
}

fn _is_glob_matching(matcher: &GlobMatcher, path: &FsPath) -> bool {
    let c_path = match path.syntax() {
        EnumPathSyntax::Unix => path.to_string(),
        EnumPathSyntax::Windows => path.to_string().replace('\\', "/"),
    };
    matcher.is_match(c_path)
}

fn _is_regex_matching(regex: &Regex, path: &FsPath) -> bool {
    regex.is_match(&path.to_string())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
