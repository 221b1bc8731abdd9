//! Operation enums, option models and attribute snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::conf::{N_MODE_DIR_DEFAULT, N_MODE_FILE_DEFAULT};
use crate::posix::PermissionSet;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Failure policy of a recursive copy or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumRecursionMode {
    /// Abort on the first error and propagate it.
    FailFast,
    /// Record every error, finish the walk, then report them together.
    KeepGoing,
}

/// Option accepted by copy and move operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumCopyOption {
    /// Replace an existing target (a lone file or an empty directory).
    ReplaceExisting,
    /// Copy timestamps and permissions along with the content.
    CopyAttributes,
    /// Move atomically or fail.
    AtomicMove,
    /// Operate on a symbolic link itself, not on its target.
    NoFollowLinks,
}

/// Option accepted when opening streams and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumOpenOption {
    Read,
    Write,
    Append,
    TruncateExisting,
    /// Create the file if it does not exist.
    Create,
    /// Create the file, failing if it already exists.
    CreateNew,
    DeleteOnClose,
    Sparse,
    Sync,
    Dsync,
    /// Fail if the final path component is a symbolic link.
    NoFollowLinks,
}

/// Access mode checked by `check_access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumAccessMode {
    Read,
    Write,
    Execute,
}

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumFileKind {
    RegularFile,
    Directory,
    SymbolicLink,
    /// Device, socket, fifo or anything else.
    Other,
}

/// Path model of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumPathSyntax {
    /// `/` root and separator.
    Unix,
    /// Drive letter and UNC roots, `\` separator (`/` accepted on input).
    Windows,
}

impl EnumPathSyntax {
    /// Separator used when rendering paths.
    pub fn separator(self) -> &'static str {
        match self {
            Self::Unix => "/",
            Self::Windows => "\\",
        }
    }

    /// Syntax of the platform this crate is compiled for.
    pub fn native() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }
}

/// Identity of every provider-level operation.
///
/// Used both as the payload of read-only rejections and as the key of the
/// read-only classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumFsOperation {
    NewFileSystem,
    NewFileSystemFromPath,
    GetFileSystem,
    GetPath,
    NewInputStream,
    NewOutputStream,
    NewByteChannel,
    NewFileChannel,
    NewAsynchronousFileChannel,
    NewDirectoryStream,
    CreateDirectory,
    CreateSymbolicLink,
    CreateLink,
    Delete,
    DeleteIfExists,
    ReadSymbolicLink,
    Copy,
    Move,
    IsSameFile,
    IsHidden,
    GetFileStore,
    CheckAccess,
    GetFileAttributeView,
    ReadAttributes,
    ReadAttributeMap,
    SetAttribute,
    ToRealPath,
    ToAbsolutePath,
}

impl EnumFsOperation {
    /// Snake-case operation name.
    pub fn name(self) -> &'static str {
        match self {
            Self::NewFileSystem => "new_file_system",
            Self::NewFileSystemFromPath => "new_file_system_from_path",
            Self::GetFileSystem => "get_file_system",
            Self::GetPath => "get_path",
            Self::NewInputStream => "new_input_stream",
            Self::NewOutputStream => "new_output_stream",
            Self::NewByteChannel => "new_byte_channel",
            Self::NewFileChannel => "new_file_channel",
            Self::NewAsynchronousFileChannel => "new_asynchronous_file_channel",
            Self::NewDirectoryStream => "new_directory_stream",
            Self::CreateDirectory => "create_directory",
            Self::CreateSymbolicLink => "create_symbolic_link",
            Self::CreateLink => "create_link",
            Self::Delete => "delete",
            Self::DeleteIfExists => "delete_if_exists",
            Self::ReadSymbolicLink => "read_symbolic_link",
            Self::Copy => "copy",
            Self::Move => "move_path",
            Self::IsSameFile => "is_same_file",
            Self::IsHidden => "is_hidden",
            Self::GetFileStore => "get_file_store",
            Self::CheckAccess => "check_access",
            Self::GetFileAttributeView => "get_file_attribute_view",
            Self::ReadAttributes => "read_attributes",
            Self::ReadAttributeMap => "read_attribute_map",
            Self::SetAttribute => "set_attribute",
            Self::ToRealPath => "to_real_path",
            Self::ToAbsolutePath => "to_absolute_path",
        }
    }
}

impl fmt::Display for EnumFsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region AttributeModels

/// Snapshot of the basic and POSIX attributes of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// Entry kind, as seen with or without following links.
    pub enum_kind: EnumFileKind,
    /// Size in bytes (`0` for directories in the memory backend).
    pub n_size: u64,
    pub time_modified: SystemTime,
    pub time_accessed: SystemTime,
    pub time_created: SystemTime,
    /// POSIX permissions, when the backend has them.
    pub permissions: Option<PermissionSet>,
    /// Backend-unique identity of the entry (inode number on Unix).
    pub n_file_key: Option<u64>,
}

impl FileAttributes {
    pub fn is_regular_file(&self) -> bool {
        self.enum_kind == EnumFileKind::RegularFile
    }

    pub fn is_directory(&self) -> bool {
        self.enum_kind == EnumFileKind::Directory
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.enum_kind == EnumFileKind::SymbolicLink
    }

    pub fn is_other(&self) -> bool {
        self.enum_kind == EnumFileKind::Other
    }
}

/// Value of one named attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Bool(bool),
    Size(u64),
    Time(SystemTime),
    Text(String),
    Bytes(Vec<u8>),
    Permissions(PermissionSet),
}

/// Read-only snapshot of one attribute view of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributeView {
    /// View name (`basic`, `posix`, `user`).
    pub name: String,
    pub dict_values: BTreeMap<String, AttributeValue>,
}

/// Descriptor of the storage backing an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    pub name: String,
    /// Backend kind (`host`, `memory`).
    pub kind: String,
    pub if_read_only: bool,
}

/// Named identity returned by user lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserPrincipal {
    pub name: String,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Input options for building a memory filesystem.
#[derive(Debug, Clone)]
pub struct SpecMemoryFsOptions {
    /// Registry name; a unique one is generated when `None`.
    pub name: Option<String>,
    /// Path model.
    pub rule_syntax: EnumPathSyntax,
    /// Root directory strings, rendered in the chosen path model.
    pub roots: Vec<String>,
    /// Directory relative paths are resolved against.
    pub working_directory: String,
    /// Reject every mutation with a read-only error.
    pub if_read_only: bool,
    /// Enforce owner permission bits on reads, writes and listings.
    pub if_enforce_permissions: bool,
    /// Permissions of newly created files.
    pub n_mode_file: u32,
    /// Permissions of newly created directories.
    pub n_mode_dir: u32,
    /// Name of the single user principal known to the filesystem.
    pub owner: String,
}

impl SpecMemoryFsOptions {
    /// Unix path model rooted at `/`.
    pub fn unix() -> Self {
        Self {
            name: None,
            rule_syntax: EnumPathSyntax::Unix,
            roots: vec!["/".to_string()],
            working_directory: "/".to_string(),
            if_read_only: false,
            if_enforce_permissions: true,
            n_mode_file: N_MODE_FILE_DEFAULT,
            n_mode_dir: N_MODE_DIR_DEFAULT,
            owner: "root".to_string(),
        }
    }

    /// Windows path model with a single `C:\` drive.
    pub fn windows() -> Self {
        Self {
            rule_syntax: EnumPathSyntax::Windows,
            roots: vec!["C:\\".to_string()],
            working_directory: "C:\\".to_string(),
            ..Self::unix()
        }
    }
}

impl Default for SpecMemoryFsOptions {
    fn default() -> Self {
        Self::unix()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
