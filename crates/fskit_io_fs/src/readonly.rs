//! Read-only decorator over any filesystem and its provider.
//!
//! Every provider operation is classified once, in [`classify_operation`].
//! Mutating operations are rejected before reaching the delegate; channel
//! openings are rejected only when their options ask for write access.
//! Everything else is forwarded unchanged.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::error::{FsError, FsResult};
use crate::fs::{
    DirectoryStream, FileSystem, FileSystemProvider, FileSystemRef, InputStream, OutputStream,
    PathMatcher, ProviderRef, SeekableByteChannel, is_same_file_system,
};
use crate::path::FsPath;
use crate::posix::PermissionSet;
use crate::spec::{
    AttributeValue, EnumAccessMode, EnumCopyOption, EnumFsOperation, EnumOpenOption,
    EnumPathSyntax, FileAttributeView, FileAttributes, FileStore, UserPrincipal,
};

////////////////////////////////////////////////////////////////////////////////
// #region Classification

/// Read-only treatment of one provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumAccessClass {
    /// Always forwarded.
    NonMutating,
    /// Always rejected.
    Mutating,
    /// Rejected when the open options request write access.
    ConditionallyMutating,
}

/// Open options that request write access.
pub const L_WRITE_OPEN_OPTIONS: [EnumOpenOption; 4] = [
    EnumOpenOption::Create,
    EnumOpenOption::CreateNew,
    EnumOpenOption::Write,
    EnumOpenOption::Append,
];

pub fn classify_operation(rule_operation: EnumFsOperation) -> EnumAccessClass {
    use EnumFsOperation as Op;
    match rule_operation {
        Op::NewOutputStream
        | Op::CreateDirectory
        | Op::CreateSymbolicLink
        | Op::CreateLink
        | Op::Delete
        | Op::DeleteIfExists
        | Op::Copy
        | Op::Move
        | Op::SetAttribute => EnumAccessClass::Mutating,
        Op::NewByteChannel | Op::NewFileChannel | Op::NewAsynchronousFileChannel => {
            EnumAccessClass::ConditionallyMutating
        }
        Op::NewFileSystem
        | Op::NewFileSystemFromPath
        | Op::GetFileSystem
        | Op::GetPath
        | Op::NewInputStream
        | Op::NewDirectoryStream
        | Op::ReadSymbolicLink
        | Op::IsSameFile
        | Op::IsHidden
        | Op::GetFileStore
        | Op::CheckAccess
        | Op::GetFileAttributeView
        | Op::ReadAttributes
        | Op::ReadAttributeMap
        | Op::ToRealPath
        | Op::ToAbsolutePath => EnumAccessClass::NonMutating,
    }
}

pub fn is_write_access(options: &[EnumOpenOption]) -> bool {
    options.iter().any(|option| L_WRITE_OPEN_OPTIONS.contains(option))
}

fn _check(rule_operation: EnumFsOperation, options: &[EnumOpenOption]) -> FsResult<()> {
    let if_reject = match classify_operation(rule_operation) {
        EnumAccessClass::NonMutating => false,
        EnumAccessClass::Mutating => true,
        EnumAccessClass::ConditionallyMutating => is_write_access(options),
    };
    if if_reject {
        trace!(operation = %rule_operation, "read-only view rejected operation");
        return Err(FsError::ReadOnlyFileSystem(rule_operation));
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Wrapping

/// Read-only view of `fs`; a filesystem that already reports itself as
/// read-only is returned unchanged.
pub fn wrap_read_only(fs: &FileSystemRef) -> FileSystemRef {
    if fs.is_read_only() {
        return fs.clone();
    }
    debug!(provider = fs.provider().scheme(), "wrap filesystem read-only");
    let fs_view: FileSystemRef = ReadOnlyFileSystem::new(fs.clone());
    fs_view
}

/// Filesystem view rejecting every mutation.
///
/// Paths handed out by the view are bound to the view, so helpers routing
/// through `path.file_system().provider()` always reach the read-only
/// provider.
#[derive(Debug)]
pub struct ReadOnlyFileSystem {
    delegate: FileSystemRef,
    provider: Arc<ReadOnlyFileSystemProvider>,
}

impl ReadOnlyFileSystem {
    fn new(delegate: FileSystemRef) -> Arc<Self> {
        Arc::new_cyclic(|fs_view: &Weak<Self>| Self {
            provider: Arc::new(ReadOnlyFileSystemProvider {
                delegate: delegate.provider(),
                fs_delegate: delegate.clone(),
                fs_view: fs_view.clone(),
            }),
            delegate,
        })
    }

    /// The wrapped filesystem.
    pub fn delegate(&self) -> &FileSystemRef {
        &self.delegate
    }
}

impl FileSystem for ReadOnlyFileSystem {
    fn provider(&self) -> ProviderRef {
        self.provider.clone()
    }

    fn syntax(&self) -> EnumPathSyntax {
        self.delegate.syntax()
    }

    fn root_directories(&self) -> Vec<String> {
        self.delegate.root_directories()
    }

    fn is_open(&self) -> bool {
        self.delegate.is_open()
    }

    fn close(&self) -> FsResult<()> {
        self.delegate.close()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn file_stores(&self) -> Vec<FileStore> {
        self.delegate
            .file_stores()
            .into_iter()
            .map(|store| FileStore {
                if_read_only: true,
                ..store
            })
            .collect()
    }

    fn supported_file_attribute_views(&self) -> BTreeSet<String> {
        self.delegate.supported_file_attribute_views()
    }

    fn path_matcher(&self, syntax_and_pattern: &str) -> FsResult<PathMatcher> {
        self.delegate.path_matcher(syntax_and_pattern)
    }

    fn lookup_user_principal(&self, name: &str) -> FsResult<UserPrincipal> {
        self.delegate.lookup_user_principal(name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Provider

/// Provider checking the classification table before forwarding.
#[derive(Debug)]
pub struct ReadOnlyFileSystemProvider {
    delegate: ProviderRef,
    fs_delegate: FileSystemRef,
    fs_view: Weak<ReadOnlyFileSystem>,
}

impl ReadOnlyFileSystemProvider {
    fn _view(&self) -> FsResult<FileSystemRef> {
        match self.fs_view.upgrade() {
            Some(fs_view) => Ok(fs_view),
            None => Err(FsError::ClosedFileSystem),
        }
    }

    /// Same components bound to the wrapped filesystem.
    fn _to_delegate(&self, path: &FsPath) -> FsPath {
        let if_view = self.fs_view.upgrade().is_some_and(|fs_view| {
            let fs_view: FileSystemRef = fs_view;
            is_same_file_system(path.file_system(), &fs_view)
        });
        if if_view {
            return path.rebind(&self.fs_delegate);
        }
        path.clone()
    }

    /// Same components bound to the view.
    fn _to_view(&self, path: &FsPath) -> FsResult<FsPath> {
        if is_same_file_system(path.file_system(), &self.fs_delegate) {
            return Ok(path.rebind(&self._view()?));
        }
        Ok(path.clone())
    }
}

impl FileSystemProvider for ReadOnlyFileSystemProvider {
    fn scheme(&self) -> &str {
        self.delegate.scheme()
    }

    fn new_file_system(
        &self,
        uri: &str,
        env: &BTreeMap<String, String>,
    ) -> FsResult<FileSystemRef> {
        _check(EnumFsOperation::NewFileSystem, &[])?;
        self.delegate.new_file_system(uri, env)
    }

    fn new_file_system_from_path(
        &self,
        path: &FsPath,
        env: &BTreeMap<String, String>,
    ) -> FsResult<FileSystemRef> {
        _check(EnumFsOperation::NewFileSystemFromPath, &[])?;
        self.delegate
            .new_file_system_from_path(&self._to_delegate(path), env)
    }

    fn get_file_system(&self, uri: &str) -> FsResult<FileSystemRef> {
        _check(EnumFsOperation::GetFileSystem, &[])?;
        self.delegate.get_file_system(uri)
    }

    fn get_path(&self, uri: &str) -> FsResult<FsPath> {
        _check(EnumFsOperation::GetPath, &[])?;
        let path = self.delegate.get_path(uri)?;
        self._to_view(&path)
    }

    fn new_input_stream(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<InputStream> {
        _check(EnumFsOperation::NewInputStream, options)?;
        self.delegate
            .new_input_stream(&self._to_delegate(path), options)
    }

    fn new_output_stream(
        &self,
        _path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<OutputStream> {
        _check(EnumFsOperation::NewOutputStream, options)?;
        Err(FsError::ReadOnlyFileSystem(EnumFsOperation::NewOutputStream))
    }

    fn new_byte_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        _check(EnumFsOperation::NewByteChannel, options)?;
        self.delegate
            .new_byte_channel(&self._to_delegate(path), options)
    }

    fn new_file_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        _check(EnumFsOperation::NewFileChannel, options)?;
        self.delegate
            .new_file_channel(&self._to_delegate(path), options)
    }

    fn new_asynchronous_file_channel(
        &self,
        path: &FsPath,
        options: &[EnumOpenOption],
    ) -> FsResult<Box<dyn SeekableByteChannel>> {
        _check(EnumFsOperation::NewAsynchronousFileChannel, options)?;
        self.delegate
            .new_asynchronous_file_channel(&self._to_delegate(path), options)
    }

    fn new_directory_stream(&self, dir: &FsPath) -> FsResult<DirectoryStream> {
        _check(EnumFsOperation::NewDirectoryStream, &[])?;
        let iter_entries = self.delegate.new_directory_stream(&self._to_delegate(dir))?;
        let fs_view = self._view()?;
        let fs_delegate = self.fs_delegate.clone();
        Ok(Box::new(iter_entries.map(move |entry| {
            let path = entry?;
            if is_same_file_system(path.file_system(), &fs_delegate) {
                return Ok(path.rebind(&fs_view));
            }
            Ok(path)
        })))
    }

    fn create_directory(&self, dir: &FsPath, permissions: Option<PermissionSet>) -> FsResult<()> {
        _check(EnumFsOperation::CreateDirectory, &[])?;
        self.delegate
            .create_directory(&self._to_delegate(dir), permissions)
    }

    fn create_symbolic_link(&self, link: &FsPath, target: &FsPath) -> FsResult<()> {
        _check(EnumFsOperation::CreateSymbolicLink, &[])?;
        self.delegate
            .create_symbolic_link(&self._to_delegate(link), &self._to_delegate(target))
    }

    fn create_link(&self, link: &FsPath, existing: &FsPath) -> FsResult<()> {
        _check(EnumFsOperation::CreateLink, &[])?;
        self.delegate
            .create_link(&self._to_delegate(link), &self._to_delegate(existing))
    }

    fn delete(&self, path: &FsPath) -> FsResult<()> {
        _check(EnumFsOperation::Delete, &[])?;
        self.delegate.delete(&self._to_delegate(path))
    }

    fn delete_if_exists(&self, path: &FsPath) -> FsResult<bool> {
        _check(EnumFsOperation::DeleteIfExists, &[])?;
        self.delegate.delete_if_exists(&self._to_delegate(path))
    }

    fn read_symbolic_link(&self, link: &FsPath) -> FsResult<FsPath> {
        _check(EnumFsOperation::ReadSymbolicLink, &[])?;
        let path_target = self
            .delegate
            .read_symbolic_link(&self._to_delegate(link))?;
        self._to_view(&path_target)
    }

    fn copy(&self, source: &FsPath, target: &FsPath, options: &[EnumCopyOption]) -> FsResult<()> {
        _check(EnumFsOperation::Copy, &[])?;
        self.delegate
            .copy(&self._to_delegate(source), &self._to_delegate(target), options)
    }

    fn move_path(
        &self,
        source: &FsPath,
        target: &FsPath,
        options: &[EnumCopyOption],
    ) -> FsResult<()> {
        _check(EnumFsOperation::Move, &[])?;
        self.delegate
            .move_path(&self._to_delegate(source), &self._to_delegate(target), options)
    }

    fn is_same_file(&self, path_a: &FsPath, path_b: &FsPath) -> FsResult<bool> {
        _check(EnumFsOperation::IsSameFile, &[])?;
        self.delegate
            .is_same_file(&self._to_delegate(path_a), &self._to_delegate(path_b))
    }

    fn is_hidden(&self, path: &FsPath) -> FsResult<bool> {
        _check(EnumFsOperation::IsHidden, &[])?;
        self.delegate.is_hidden(&self._to_delegate(path))
    }

    fn get_file_store(&self, path: &FsPath) -> FsResult<FileStore> {
        _check(EnumFsOperation::GetFileStore, &[])?;
        let store = self.delegate.get_file_store(&self._to_delegate(path))?;
        Ok(FileStore {
            if_read_only: true,
            ..store
        })
    }

    fn check_access(&self, path: &FsPath, modes: &[EnumAccessMode]) -> FsResult<()> {
        _check(EnumFsOperation::CheckAccess, &[])?;
        self.delegate.check_access(&self._to_delegate(path), modes)
    }

    fn get_file_attribute_view(
        &self,
        path: &FsPath,
        c_view: &str,
        if_follow_links: bool,
    ) -> FsResult<FileAttributeView> {
        _check(EnumFsOperation::GetFileAttributeView, &[])?;
        self.delegate
            .get_file_attribute_view(&self._to_delegate(path), c_view, if_follow_links)
    }

    fn read_attributes(&self, path: &FsPath, if_follow_links: bool) -> FsResult<FileAttributes> {
        _check(EnumFsOperation::ReadAttributes, &[])?;
        self.delegate
            .read_attributes(&self._to_delegate(path), if_follow_links)
    }

    fn read_attribute_map(
        &self,
        path: &FsPath,
        attributes: &str,
        if_follow_links: bool,
    ) -> FsResult<BTreeMap<String, AttributeValue>> {
        _check(EnumFsOperation::ReadAttributeMap, &[])?;
        self.delegate
            .read_attribute_map(&self._to_delegate(path), attributes, if_follow_links)
    }

    fn set_attribute(
        &self,
        path: &FsPath,
        attribute: &str,
        value: AttributeValue,
        if_follow_links: bool,
    ) -> FsResult<()> {
        _check(EnumFsOperation::SetAttribute, &[])?;
        self.delegate
            .set_attribute(&self._to_delegate(path), attribute, value, if_follow_links)
    }

    fn to_real_path(&self, path: &FsPath) -> FsResult<FsPath> {
        _check(EnumFsOperation::ToRealPath, &[])?;
        let path_real = self.delegate.to_real_path(&self._to_delegate(path))?;
        self._to_view(&path_real)
    }

    fn to_absolute_path(&self, path: &FsPath) -> FsResult<FsPath> {
        _check(EnumFsOperation::ToAbsolutePath, &[])?;
        let path_abs = self.delegate.to_absolute_path(&self._to_delegate(path))?;
        self._to_view(&path_abs)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::files;
    use crate::fs::FileSystemExt;
    use crate::memory::MemoryFileSystem;
    use crate::spec::SpecMemoryFsOptions;

    fn populated_fs() -> FileSystemRef {
        let fs = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_dir = fs.get_path("/data", &[]).expect("path");
        files::create_directory(&path_dir).expect("mkdir");
        files::write_bytes(&path_dir.child("a.txt"), b"alpha").expect("write");
        files::write_bytes(&path_dir.child("b.txt"), b"beta").expect("write");
        fs
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify_operation(EnumFsOperation::Delete),
            EnumAccessClass::Mutating
        );
        assert_eq!(
            classify_operation(EnumFsOperation::NewFileChannel),
            EnumAccessClass::ConditionallyMutating
        );
        assert_eq!(
            classify_operation(EnumFsOperation::ToRealPath),
            EnumAccessClass::NonMutating
        );
        assert!(is_write_access(&[EnumOpenOption::Read, EnumOpenOption::Append]));
        assert!(!is_write_access(&[EnumOpenOption::Read, EnumOpenOption::Sync]));
    }

    #[test]
    fn creating_a_file_is_rejected() {
        let fs_view = wrap_read_only(&populated_fs());
        let path = fs_view.get_path("/data/new.txt", &[]).expect("path");
        let err = files::create_file(&path).expect_err("must fail");
        assert!(matches!(
            err,
            FsError::ReadOnlyFileSystem(EnumFsOperation::NewOutputStream)
        ));
    }

    #[test]
    fn reads_match_the_delegate() {
        let fs = populated_fs();
        let fs_view = wrap_read_only(&fs);
        let path_dir = fs.get_path("/data", &[]).expect("path");
        let path_view_dir = fs_view.get_path("/data", &[]).expect("path");

        let l_entries = files::list_directory(&path_view_dir, None).expect("list");
        assert_eq!(l_entries.len(), 2);
        for path_entry in &l_entries {
            assert!(is_same_file_system(path_entry.file_system(), &fs_view));
            let path_plain = path_dir.child(path_entry.file_name().expect("name"));
            assert_eq!(
                files::read_all_bytes(path_entry).expect("read"),
                files::read_all_bytes(&path_plain).expect("read")
            );
            assert_eq!(
                files::read_attributes(path_entry, true).expect("attrs"),
                files::read_attributes(&path_plain, true).expect("attrs")
            );
        }
        let path_real = files::to_real_path(&path_view_dir).expect("real");
        assert!(is_same_file_system(path_real.file_system(), &fs_view));
    }

    #[test]
    fn channels_are_checked_by_options() {
        let fs_view = wrap_read_only(&populated_fs());
        let path = fs_view.get_path("/data/a.txt", &[]).expect("path");
        let provider = fs_view.provider();

        let mut channel = provider
            .new_byte_channel(&path, &[EnumOpenOption::Read])
            .expect("channel");
        let mut buf = String::new();
        channel.read_to_string(&mut buf).expect("read");
        assert_eq!(buf, "alpha");

        for options in [
            &[EnumOpenOption::Write][..],
            &[EnumOpenOption::Read, EnumOpenOption::Create],
            &[EnumOpenOption::CreateNew],
            &[EnumOpenOption::Append],
        ] {
            let err = provider
                .new_file_channel(&path, options)
                .err()
                .expect("must fail");
            assert!(matches!(
                err,
                FsError::ReadOnlyFileSystem(EnumFsOperation::NewFileChannel)
            ));
        }
    }

    #[test]
    fn mutations_leave_the_delegate_untouched() {
        let fs = populated_fs();
        let fs_view = wrap_read_only(&fs);
        let path_view = fs_view.get_path("/data/a.txt", &[]).expect("path");

        let err = files::delete(&path_view).expect_err("must fail");
        assert!(matches!(err, FsError::ReadOnlyFileSystem(EnumFsOperation::Delete)));
        let err = files::set_mode(&path_view, 0o600).expect_err("must fail");
        assert!(matches!(
            err,
            FsError::ReadOnlyFileSystem(EnumFsOperation::SetAttribute)
        ));
        let err = files::create_directory(&fs_view.get_path("/x", &[]).expect("path"))
            .expect_err("must fail");
        assert!(matches!(
            err,
            FsError::ReadOnlyFileSystem(EnumFsOperation::CreateDirectory)
        ));
        assert!(files::exists(&fs.get_path("/data/a.txt", &[]).expect("path"), false));
    }

    #[test]
    fn wrapping_is_idempotent() {
        let fs = populated_fs();
        let fs_view = wrap_read_only(&fs);
        assert!(fs_view.is_read_only());
        assert!(!is_same_file_system(&fs, &fs_view));
        assert!(is_same_file_system(&wrap_read_only(&fs_view), &fs_view));

        let fs_ro = MemoryFileSystem::build(SpecMemoryFsOptions {
            if_read_only: true,
            ..SpecMemoryFsOptions::unix()
        })
        .expect("fs");
        assert!(is_same_file_system(&wrap_read_only(&fs_ro), &fs_ro));
        assert_eq!(fs_view.provider().scheme(), fs.provider().scheme());
    }

    #[test]
    fn closing_the_view_closes_the_delegate() {
        let fs = populated_fs();
        let fs_view = wrap_read_only(&fs);
        fs_view.close().expect("close");
        assert!(!fs.is_open());
        let path = fs.get_path("/data/a.txt", &[]).expect("path");
        assert!(matches!(
            files::read_all_bytes(&path),
            Err(FsError::ClosedFileSystem)
        ));
    }
}
