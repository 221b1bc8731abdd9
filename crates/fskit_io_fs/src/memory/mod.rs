//! In-memory backend.
//!
//! Two provider singletons exist, one per path model: scheme `memory` (Unix)
//! and scheme `memory-windows` (Windows). Filesystems are registered by name
//! in their provider and addressed as `memory:<name>!/a/b`.
//!
//! Owner permission bits are enforced when enabled: listing a directory and
//! reading a file need `r`, writing a file needs `w`, and creating or
//! deleting an entry needs `w` on its parent directory.

mod channel;
mod provider;
mod store;

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::conf::{C_ATTRIBUTE_VIEW_BASIC, C_ATTRIBUTE_VIEW_POSIX, C_ATTRIBUTE_VIEW_USER};
use crate::error::{FsError, FsResult};
use crate::fs::{FileSystem, FileSystemRef, ProviderRef};
use crate::path::FsPath;
use crate::spec::{EnumFsOperation, EnumPathSyntax, FileStore, SpecMemoryFsOptions, UserPrincipal};

pub use provider::MemoryFileSystemProvider;
use store::{MemoryStore, TypeEntryKey};

/// One named in-memory filesystem.
pub struct MemoryFileSystem {
    c_name: String,
    spec_options: SpecMemoryFsOptions,
    store: Arc<Mutex<MemoryStore>>,
    provider: Arc<MemoryFileSystemProvider>,
    if_open: AtomicBool,
    c_work_root: String,
    l_work_names: Vec<String>,
}

impl MemoryFileSystem {
    /// Create and register a filesystem with the provider of its path model.
    pub fn build(spec_options: SpecMemoryFsOptions) -> FsResult<FileSystemRef> {
        let provider = MemoryFileSystemProvider::instance(spec_options.rule_syntax);
        let fs: FileSystemRef = provider.mount(spec_options)?;
        Ok(fs)
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.c_name
    }

    pub fn options(&self) -> &SpecMemoryFsOptions {
        &self.spec_options
    }

    pub(crate) fn check_open(&self) -> FsResult<()> {
        if self.is_open() {
            return Ok(());
        }
        Err(FsError::ClosedFileSystem)
    }

    pub(crate) fn check_writable(&self, rule_operation: EnumFsOperation) -> FsResult<()> {
        if self.spec_options.if_read_only {
            return Err(FsError::ReadOnlyFileSystem(rule_operation));
        }
        Ok(())
    }

    /// Root and names of `path` made absolute against the working directory.
    pub(crate) fn absolute_parts(&self, path: &FsPath) -> (String, Vec<String>) {
        let l_names = path.names().to_vec();
        let with_work_dir = |l_names: Vec<String>| {
            let mut l_joined = self.l_work_names.clone();
            l_joined.extend(l_names);
            (self.c_work_root.clone(), l_joined)
        };
        match (path.is_absolute(), path.root_name()) {
            (true, Some(c_root)) => (c_root.to_string(), l_names),
            (true, None) => (self.c_work_root.clone(), l_names),
            (false, None) => with_work_dir(l_names),
            // `\a`: rooted on the working directory's drive.
            (false, Some("\\")) => (self.c_work_root.clone(), l_names),
            // `C:a`: relative to the working directory when it is on that drive.
            (false, Some(c_drive)) => {
                if self.c_work_root.starts_with(c_drive) {
                    with_work_dir(l_names)
                } else {
                    (format!("{c_drive}\\"), l_names)
                }
            }
        }
    }

    /// Store key of `path`, following symbolic links as requested.
    pub(crate) fn key_of(
        &self,
        store: &MemoryStore,
        path: &FsPath,
        if_follow_links: bool,
    ) -> FsResult<TypeEntryKey> {
        let (c_root, l_names) = self.absolute_parts(path);
        store.resolve_key(&c_root, &l_names, if_follow_links, &path.to_string())
    }

    pub(crate) fn path_of_key(fs: &FileSystemRef, key: &TypeEntryKey) -> FsPath {
        FsPath::from_parts(fs, key.first().cloned(), key[1..].to_vec(), true)
    }
}

impl fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryFileSystem")
            .field("name", &self.c_name)
            .field("syntax", &self.spec_options.rule_syntax)
            .field("open", &self.is_open())
            .finish()
    }
}

impl FileSystem for MemoryFileSystem {
    fn provider(&self) -> ProviderRef {
        self.provider.clone()
    }

    fn syntax(&self) -> EnumPathSyntax {
        self.spec_options.rule_syntax
    }

    fn root_directories(&self) -> Vec<String> {
        self.spec_options.roots.clone()
    }

    fn is_open(&self) -> bool {
        self.if_open.load(Ordering::Acquire)
    }

    fn close(&self) -> FsResult<()> {
        if self.if_open.swap(false, Ordering::AcqRel) {
            self.provider.unregister(&self.c_name);
            debug!(name = %self.c_name, scheme = self.provider.scheme_name(), "memory filesystem closed");
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.spec_options.if_read_only
    }

    fn file_stores(&self) -> Vec<FileStore> {
        vec![FileStore {
            name: self.c_name.clone(),
            kind: self.provider.scheme_name().to_string(),
            if_read_only: self.spec_options.if_read_only,
        }]
    }

    fn supported_file_attribute_views(&self) -> BTreeSet<String> {
        [C_ATTRIBUTE_VIEW_BASIC, C_ATTRIBUTE_VIEW_POSIX, C_ATTRIBUTE_VIEW_USER]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn lookup_user_principal(&self, name: &str) -> FsResult<UserPrincipal> {
        if name == self.spec_options.owner {
            return Ok(UserPrincipal {
                name: name.to_string(),
            });
        }
        Err(FsError::UserPrincipalNotFound(name.to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::{Read, Seek, SeekFrom, Write};

    use super::*;
    use crate::files;
    use crate::fs::{FileSystemExt, FileSystemProvider, is_same_file_system};
    use crate::spec::{AttributeValue, EnumAccessMode, EnumCopyOption, EnumOpenOption};

    fn unix_fs() -> FileSystemRef {
        MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs")
    }

    #[test]
    fn registry_lookup_by_uri() {
        let spec_options = SpecMemoryFsOptions {
            name: Some("registry-lookup".to_string()),
            ..SpecMemoryFsOptions::unix()
        };
        let fs = MemoryFileSystem::build(spec_options.clone()).expect("fs");
        let provider = fs.provider();
        assert_eq!(provider.scheme(), "memory");

        let fs_found = provider
            .get_file_system("memory:registry-lookup")
            .expect("lookup");
        assert!(is_same_file_system(&fs, &fs_found));

        let err = MemoryFileSystem::build(spec_options).expect_err("must fail");
        assert!(matches!(err, FsError::FileSystemAlreadyExists(_)));

        let path = provider
            .get_path("memory:registry-lookup!/a/b")
            .expect("path");
        assert_eq!(path.to_string(), "/a/b");
        assert!(is_same_file_system(path.file_system(), &fs));

        fs.close().expect("close");
        let err = provider
            .get_file_system("memory:registry-lookup")
            .expect_err("must fail");
        assert!(matches!(err, FsError::FileSystemNotFound(_)));
    }

    #[test]
    fn new_file_system_reads_environment() {
        let provider = MemoryFileSystemProvider::instance(EnumPathSyntax::Windows);
        let env = BTreeMap::from([
            ("roots".to_string(), "C:\\;D:\\".to_string()),
            ("working_directory".to_string(), "D:\\work".to_string()),
            ("owner".to_string(), "alice".to_string()),
        ]);
        let fs = provider
            .new_file_system("memory-windows:env-fs", &env)
            .expect("fs");
        assert_eq!(fs.root_directories(), vec!["C:\\", "D:\\"]);
        assert!(fs.lookup_user_principal("alice").is_ok());
        assert!(matches!(
            fs.lookup_user_principal("bob"),
            Err(FsError::UserPrincipalNotFound(_))
        ));

        let path_rel = fs.get_path("notes.txt", &[]).expect("path");
        let path_abs = files::to_absolute_path(&path_rel).expect("absolute");
        assert_eq!(path_abs.to_string(), "D:\\work\\notes.txt");

        let env_bad = BTreeMap::from([("colour".to_string(), "blue".to_string())]);
        assert!(provider.new_file_system("memory-windows:bad", &env_bad).is_err());
        assert!(provider.new_file_system("memory:wrong-scheme", &BTreeMap::new()).is_err());
    }

    #[test]
    fn closed_filesystem_rejects_operations() {
        let fs = unix_fs();
        let path = fs.get_path("/x", &[]).expect("path");
        fs.close().expect("close");
        fs.close().expect("close twice");
        assert!(!fs.is_open());
        let err = files::write_bytes(&path, b"x").expect_err("must fail");
        assert!(matches!(err, FsError::ClosedFileSystem));
    }

    #[test]
    fn read_only_filesystem_rejects_mutations() {
        let spec_options = SpecMemoryFsOptions {
            if_read_only: true,
            ..SpecMemoryFsOptions::unix()
        };
        let fs = MemoryFileSystem::build(spec_options).expect("fs");
        assert!(fs.is_read_only());
        let path = fs.get_path("/x", &[]).expect("path");
        let err = files::create_directory(&path).expect_err("must fail");
        assert!(matches!(
            err,
            FsError::ReadOnlyFileSystem(EnumFsOperation::CreateDirectory)
        ));
        assert!(files::exists(&fs.get_path("/", &[]).expect("path"), false));
    }

    #[test]
    fn owner_permissions_are_enforced() {
        let fs = unix_fs();
        let path_dir = fs.get_path("/locked", &[]).expect("path");
        files::create_directory(&path_dir).expect("mkdir");
        let path_file = path_dir.child("f");
        files::write_bytes(&path_file, b"secret").expect("write");

        files::set_mode(&path_file, 0o200).expect("chmod");
        let err = files::read_all_bytes(&path_file).expect_err("must fail");
        assert!(matches!(err, FsError::AccessDenied(ref p) if p == "/locked/f"));
        files::write_bytes(&path_file, b"still writable").expect("write");

        files::set_mode(&path_dir, 0o500).expect("chmod");
        let err = files::write_bytes(&path_dir.child("g"), b"").expect_err("must fail");
        assert!(matches!(err, FsError::AccessDenied(_)));
        let err = files::delete(&path_file).expect_err("must fail");
        assert!(matches!(err, FsError::AccessDenied(_)));

        files::set_mode(&path_dir, 0o300).expect("chmod");
        let err = files::list_directory(&path_dir, None).expect_err("must fail");
        assert!(matches!(err, FsError::AccessDenied(_)));
        // Attributes need no permission.
        assert!(files::is_directory(&path_dir));

        let provider = fs.provider();
        assert!(matches!(
            provider.check_access(&path_dir, &[EnumAccessMode::Read]),
            Err(FsError::AccessDenied(_))
        ));
        provider
            .check_access(&path_dir, &[EnumAccessMode::Write, EnumAccessMode::Execute])
            .expect("access");
    }

    #[test]
    fn disabled_enforcement_ignores_modes() {
        let spec_options = SpecMemoryFsOptions {
            if_enforce_permissions: false,
            ..SpecMemoryFsOptions::unix()
        };
        let fs = MemoryFileSystem::build(spec_options).expect("fs");
        let path_file = fs.get_path("/f", &[]).expect("path");
        files::create_file_with_mode(&path_file, 0o000).expect("create");
        assert!(files::read_all_bytes(&path_file).expect("read").is_empty());
    }

    #[test]
    fn symbolic_links_resolve_and_loop() {
        let fs = unix_fs();
        let path_dir = fs.get_path("/real/dir", &[]).expect("path");
        files::create_directories(&path_dir).expect("mkdir");
        files::write_bytes(&path_dir.child("f"), b"via link").expect("write");

        let path_link = fs.get_path("/alias", &[]).expect("path");
        files::create_symbolic_link(&path_link, &fs.get_path("real/dir", &[]).expect("path"))
            .expect("symlink");
        assert!(files::is_symbolic_link(&path_link));
        assert!(files::is_directory(&path_link));
        assert_eq!(
            files::read_all_bytes(&path_link.child("f")).expect("read"),
            b"via link"
        );
        assert_eq!(
            files::to_real_path(&path_link.child("f"))
                .expect("real")
                .to_string(),
            "/real/dir/f"
        );
        assert_eq!(
            fs.provider()
                .read_symbolic_link(&path_link)
                .expect("readlink")
                .to_string(),
            "real/dir"
        );

        let path_loop = fs.get_path("/loop", &[]).expect("path");
        files::create_symbolic_link(&path_loop, &path_loop).expect("symlink");
        let err = files::read_attributes(&path_loop, true).expect_err("must fail");
        assert!(matches!(err, FsError::FileSystemLoop(_)));
        files::delete(&path_loop).expect("delete link itself");
    }

    #[test]
    fn byte_channel_reads_writes_and_seeks() {
        let fs = unix_fs();
        let path = fs.get_path("/chan", &[]).expect("path");
        let provider = fs.provider();
        let mut channel = provider
            .new_byte_channel(
                &path,
                &[EnumOpenOption::Create, EnumOpenOption::Read, EnumOpenOption::Write],
            )
            .expect("channel");
        channel.write_all(b"hello world").expect("write");
        assert_eq!(channel.size().expect("size"), 11);
        channel.seek(SeekFrom::Start(6)).expect("seek");
        let mut buf = String::new();
        channel.read_to_string(&mut buf).expect("read");
        assert_eq!(buf, "world");
        channel.truncate(5).expect("truncate");
        drop(channel);
        assert_eq!(files::read_to_string(&path).expect("read"), "hello");

        let mut appender = provider
            .new_output_stream(&path, &[EnumOpenOption::Append])
            .expect("append");
        appender.write_all(b"!").expect("write");
        drop(appender);
        assert_eq!(files::read_to_string(&path).expect("read"), "hello!");

        let err = provider
            .new_output_stream(&path, &[EnumOpenOption::CreateNew])
            .err()
            .expect("must fail");
        assert!(matches!(err, FsError::FileAlreadyExists(_)));
        let err = provider
            .new_input_stream(&fs.get_path("/none", &[]).expect("path"), &[])
            .err()
            .expect("must fail");
        assert!(matches!(err, FsError::NoSuchFile(_)));
    }

    #[test]
    fn copy_move_and_links_within_filesystem() {
        let fs = unix_fs();
        let path_a = fs.get_path("/a", &[]).expect("path");
        let path_b = fs.get_path("/b", &[]).expect("path");
        files::write_bytes(&path_a, b"a").expect("write");
        files::set_mode(&path_a, 0o600).expect("chmod");

        files::copy(&path_a, &path_b, &[EnumCopyOption::CopyAttributes]).expect("copy");
        assert_eq!(files::get_posix_permissions(&path_b).expect("perms").to_int_mode(), 0o600);
        let err = files::copy(&path_a, &path_b, &[]).expect_err("must fail");
        assert!(matches!(err, FsError::FileAlreadyExists(_)));

        let path_c = fs.get_path("/c", &[]).expect("path");
        files::move_path(&path_b, &path_c, &[EnumCopyOption::AtomicMove]).expect("move");
        assert!(files::not_exists(&path_b, false));
        assert_eq!(files::read_all_bytes(&path_c).expect("read"), b"a");

        let provider = fs.provider();
        let path_hard = fs.get_path("/hard", &[]).expect("path");
        provider.create_link(&path_hard, &path_a).expect("link");
        assert!(provider.is_same_file(&path_a, &path_hard).expect("same"));
        assert!(!provider.is_same_file(&path_a, &path_c).expect("same"));
    }

    #[test]
    fn attribute_views() {
        let fs = unix_fs();
        let path = fs.get_path("/.hidden", &[]).expect("path");
        files::write_bytes(&path, b"abc").expect("write");
        let provider = fs.provider();
        assert!(provider.is_hidden(&path).expect("hidden"));

        provider
            .set_attribute(&path, "user:tag", AttributeValue::Bytes(b"v".to_vec()), true)
            .expect("set");
        let dict_user = provider
            .read_attribute_map(&path, "user:*", true)
            .expect("read");
        assert_eq!(dict_user["tag"], AttributeValue::Bytes(b"v".to_vec()));

        let view = provider
            .get_file_attribute_view(&path, "basic", true)
            .expect("view");
        assert_eq!(view.dict_values["size"], AttributeValue::Size(3));

        let err = provider
            .set_attribute(&path, "basic:size", AttributeValue::Size(1), true)
            .expect_err("must fail");
        assert!(matches!(err, FsError::InvalidAttribute(_)));
        assert_eq!(
            provider.get_file_store(&path).expect("store").kind,
            "memory"
        );
    }

    #[test]
    fn windows_paths_and_drives() {
        let spec_options = SpecMemoryFsOptions {
            roots: vec!["C:\\".to_string(), "D:\\".to_string()],
            ..SpecMemoryFsOptions::windows()
        };
        let fs = MemoryFileSystem::build(spec_options).expect("fs");
        assert_eq!(fs.provider().scheme(), "memory-windows");
        let path = fs.get_path("D:/data/file.txt", &[]).expect("path");
        files::create_directories(&path.parent().expect("parent")).expect("mkdir");
        files::write_bytes(&path, b"w").expect("write");
        assert_eq!(
            files::read_all_bytes(&fs.get_path("D:\\data\\file.txt", &[]).expect("path"))
                .expect("read"),
            b"w"
        );
        let err = files::read_all_bytes(&fs.get_path("E:\\x", &[]).expect("path"))
            .expect_err("must fail");
        assert!(matches!(err, FsError::NoSuchFile(_)));
    }

    #[test]
    fn paths_of_other_backends_are_rejected() {
        let fs_unix = unix_fs();
        let fs_windows = MemoryFileSystem::build(SpecMemoryFsOptions::windows()).expect("fs");
        let path_windows = fs_windows.get_path("C:\\x", &[]).expect("path");
        let err = fs_unix
            .provider()
            .read_attributes(&path_windows, false)
            .expect_err("must fail");
        assert!(matches!(err, FsError::ProviderMismatch(_)));
    }
}
