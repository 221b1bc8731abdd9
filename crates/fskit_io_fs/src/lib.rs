//! `fskit_io_fs` v1:
//! Provider-based filesystem layer with recursive copy/delete and
//! read-only views.
//!
//! Architecture:
//! - `fs`       : filesystem handle and provider traits
//! - `path`     : paths bound to one filesystem handle
//! - `resolve`  : cross-filesystem path resolution
//! - `walk`     : four-hook tree walker
//! - `copy`     : recursive copy visitors and orchestration
//! - `delete`   : recursive deletion visitors and orchestration
//! - `readonly` : read-only filesystem and provider decorators
//! - `posix`    : permission sets, integer modes and chmod instructions
//! - `files`    : provider-routed path helpers
//! - `host`     : native OS backend
//! - `memory`   : in-memory backend (Unix or Windows path model)
//! - `content`  : write-then-rename content modification
//! - `detect`   : content-sniffing file type detection
//! - `spec`     : enums/options/attribute models
//! - `report`   : aggregate error of keep-going traversals
//! - `error`    : crate-wide error type
//! - `util`     : shared helper functions

pub mod conf;
pub mod content;
pub mod copy;
pub mod delete;
pub mod detect;
pub mod error;
pub mod files;
pub mod fs;
pub mod host;
pub mod memory;
pub mod path;
pub mod posix;
pub mod readonly;
pub mod report;
pub mod resolve;
pub mod spec;
mod util;
pub mod walk;

pub use content::ContentModifier;
pub use copy::copy_recursive;
pub use delete::delete_recursive;
pub use detect::probe_content_type;
pub use error::{FsError, FsResult};
pub use fs::{
    FileSystem, FileSystemExt, FileSystemProvider, FileSystemRef, PathMatcher, ProviderRef,
    is_same_file_system, is_same_provider_family,
};
pub use memory::MemoryFileSystem;
pub use path::FsPath;
pub use posix::{PermissionSet, SpecModeChange};
pub use readonly::wrap_read_only;
pub use report::{EnumRecursiveOperation, RecursiveOperationError};
pub use resolve::resolve_path;
pub use spec::{
    EnumAccessMode, EnumCopyOption, EnumFileKind, EnumFsOperation, EnumOpenOption,
    EnumPathSyntax, EnumRecursionMode, FileAttributes, SpecMemoryFsOptions,
};
pub use walk::{EnumVisitResult, FileVisitor, walk_file_tree};
