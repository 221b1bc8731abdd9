//! Crate-wide error type.

use std::io;

use thiserror::Error;

use crate::report::RecursiveOperationError;
use crate::spec::EnumFsOperation;

pub type FsResult<T> = Result<T, FsError>;

/// Every failure surfaced by filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file: {0}")]
    NoSuchFile(String),
    #[error("file already exists: {0}")]
    FileAlreadyExists(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// Mutation attempted through a read-only view.
    #[error("read-only filesystem: `{0}` rejected")]
    ReadOnlyFileSystem(EnumFsOperation),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Cross-filesystem resolution failed.
    #[error("{0}")]
    UnresolvablePath(&'static str),
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("invalid integer mode: {0:#o}")]
    InvalidIntMode(u32),
    /// Carries the offending clause as its whole message.
    #[error("{0}")]
    InvalidModeInstruction(String),
    #[error("invalid permission string: `{0}`")]
    InvalidPermissionString(String),
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("filesystem is closed")]
    ClosedFileSystem,
    #[error("path is not handled by provider `{0}`")]
    ProviderMismatch(String),
    #[error("filesystem not found: {0}")]
    FileSystemNotFound(String),
    #[error("filesystem already exists: {0}")]
    FileSystemAlreadyExists(String),
    #[error("too many levels of symbolic links: {0}")]
    FileSystemLoop(String),
    #[error("user principal not found: {0}")]
    UserPrincipalNotFound(String),
    #[error("one or more I/O operation(s) failed, will not rename")]
    ContentModification,
    #[error("failed to rename temporary file over {path}")]
    RenameFailure {
        path: String,
        #[source]
        source: Box<FsError>,
    },
    #[error(transparent)]
    Recursive(#[from] RecursiveOperationError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Map a native I/O error onto the matching error kind.
    pub fn from_io(path: impl Into<String>, exception: io::Error) -> Self {
        let path = path.into();
        match exception.kind() {
            io::ErrorKind::NotFound => Self::NoSuchFile(path),
            io::ErrorKind::AlreadyExists => Self::FileAlreadyExists(path),
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                Self::AccessDenied(path)
            }
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(path),
            io::ErrorKind::NotADirectory => Self::NotDirectory(path),
            io::ErrorKind::IsADirectory => Self::IsDirectory(path),
            io::ErrorKind::Unsupported => Self::UnsupportedOperation(path),
            _ => Self::Io {
                path,
                source: exception,
            },
        }
    }

    /// Convert back into an `io::Error`, for `Read`/`Write` implementations.
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io { source, .. } => source,
            other => {
                let enum_kind = match &other {
                    Self::NoSuchFile(_) => io::ErrorKind::NotFound,
                    Self::FileAlreadyExists(_) => io::ErrorKind::AlreadyExists,
                    Self::AccessDenied(_) | Self::ReadOnlyFileSystem(_) => {
                        io::ErrorKind::PermissionDenied
                    }
                    Self::DirectoryNotEmpty(_) => io::ErrorKind::DirectoryNotEmpty,
                    Self::NotDirectory(_) => io::ErrorKind::NotADirectory,
                    Self::IsDirectory(_) => io::ErrorKind::IsADirectory,
                    Self::UnsupportedOperation(_) => io::ErrorKind::Unsupported,
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(enum_kind, other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::FsError;

    #[test]
    fn io_errors_map_to_specific_kinds() {
        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, FsError::NoSuchFile(ref p) if p == "/a"));

        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, FsError::AccessDenied(_)));

        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::DirectoryNotEmpty));
        assert!(matches!(err, FsError::DirectoryNotEmpty(_)));

        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(err, FsError::Io { .. }));
    }

    #[test]
    fn mode_instruction_message_is_the_clause() {
        let err = FsError::InvalidModeInstruction("ur".to_string());
        assert_eq!(err.to_string(), "ur");
    }

    #[test]
    fn into_io_keeps_kind() {
        let err = FsError::NoSuchFile("/x".to_string()).into_io();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
