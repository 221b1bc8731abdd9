//! Recursive deletion: visitors and orchestration.

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::fs::ProviderRef;
use crate::path::FsPath;
use crate::report::{EnumRecursiveOperation, RecursiveOperationError};
use crate::spec::{EnumRecursionMode, FileAttributes};
use crate::walk::{EnumVisitResult, FileVisitor, walk_file_tree};

////////////////////////////////////////////////////////////////////////////////
// #region Visitors

/// Deletion visitor propagating the first error.
///
/// Uses the provider of the victim's filesystem for every entry.
#[derive(Debug, Clone)]
pub struct FailFastDeletionVisitor {
    provider: ProviderRef,
}

impl FailFastDeletionVisitor {
    pub fn new(path_victim: &FsPath) -> Self {
        Self {
            provider: path_victim.file_system().provider(),
        }
    }
}

impl FileVisitor for FailFastDeletionVisitor {
    fn pre_visit_directory(
        &mut self,
        _dir: &FsPath,
        _attrs: &FileAttributes,
    ) -> FsResult<EnumVisitResult> {
        Ok(EnumVisitResult::Continue)
    }

    fn visit_file(&mut self, file: &FsPath, _attrs: &FileAttributes) -> FsResult<EnumVisitResult> {
        self.provider.delete(file)?;
        Ok(EnumVisitResult::Continue)
    }

    fn visit_file_failed(
        &mut self,
        _file: &FsPath,
        exception: FsError,
    ) -> FsResult<EnumVisitResult> {
        Err(exception)
    }

    fn post_visit_directory(
        &mut self,
        dir: &FsPath,
        exception: Option<FsError>,
    ) -> FsResult<EnumVisitResult> {
        if let Some(e) = exception {
            return Err(e);
        }
        self.provider.delete(dir)?;
        Ok(EnumVisitResult::Continue)
    }
}

/// Deletion visitor recording every error into a caller-supplied aggregate.
#[derive(Debug)]
pub struct KeepGoingDeletionVisitor<'a> {
    provider: ProviderRef,
    report_errors: &'a mut RecursiveOperationError,
}

impl<'a> KeepGoingDeletionVisitor<'a> {
    pub fn new(path_victim: &FsPath, report_errors: &'a mut RecursiveOperationError) -> Self {
        Self {
            provider: path_victim.file_system().provider(),
            report_errors,
        }
    }
}

impl FileVisitor for KeepGoingDeletionVisitor<'_> {
    fn pre_visit_directory(
        &mut self,
        _dir: &FsPath,
        _attrs: &FileAttributes,
    ) -> FsResult<EnumVisitResult> {
        Ok(EnumVisitResult::Continue)
    }

    fn visit_file(&mut self, file: &FsPath, _attrs: &FileAttributes) -> FsResult<EnumVisitResult> {
        if let Err(e) = self.provider.delete(file) {
            self.report_errors.add_error(e);
        }
        Ok(EnumVisitResult::Continue)
    }

    fn visit_file_failed(
        &mut self,
        _file: &FsPath,
        exception: FsError,
    ) -> FsResult<EnumVisitResult> {
        self.report_errors.add_error(exception);
        Ok(EnumVisitResult::Continue)
    }

    fn post_visit_directory(
        &mut self,
        dir: &FsPath,
        exception: Option<FsError>,
    ) -> FsResult<EnumVisitResult> {
        // A directory whose listing failed is left in place.
        if let Some(e) = exception {
            self.report_errors.add_error(e);
            return Ok(EnumVisitResult::Continue);
        }
        if let Err(e) = self.provider.delete(dir) {
            self.report_errors.add_error(e);
        }
        Ok(EnumVisitResult::Continue)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Orchestration

/// Delete `path_victim` and everything below it. Symbolic links are removed,
/// never followed.
pub fn delete_recursive(path_victim: &FsPath, rule_recursion: EnumRecursionMode) -> FsResult<()> {
    debug!(victim = %path_victim, policy = ?rule_recursion, "delete recursive start");
    match rule_recursion {
        EnumRecursionMode::FailFast => {
            let mut visitor = FailFastDeletionVisitor::new(path_victim);
            walk_file_tree(path_victim, &mut visitor)
        }
        EnumRecursionMode::KeepGoing => {
            let mut report_errors = RecursiveOperationError::new(EnumRecursiveOperation::Deletion);
            let mut visitor = KeepGoingDeletionVisitor::new(path_victim, &mut report_errors);
            walk_file_tree(path_victim, &mut visitor)?;
            debug!(errors = report_errors.error_count(), "delete recursive done");
            report_errors.into_result()
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{self, create_directories, set_mode, write_bytes};
    use crate::fs::{FileSystemExt, FileSystemRef};
    use crate::host::default_file_system;
    use crate::memory::MemoryFileSystem;
    use crate::spec::SpecMemoryFsOptions;

    fn memory_fs() -> FileSystemRef {
        MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs")
    }

    fn build_tree(fs: &FileSystemRef) -> FsPath {
        let path_root = fs.get_path("/victim", &[]).expect("path");
        create_directories(&path_root.child("a").child("b")).expect("mkdir");
        write_bytes(&path_root.child("a").child("b").child("f"), b"f").expect("write");
        write_bytes(&path_root.child("g"), b"g").expect("write");
        path_root
    }

    #[test]
    fn both_policies_remove_everything() {
        for rule_recursion in [EnumRecursionMode::FailFast, EnumRecursionMode::KeepGoing] {
            let fs = memory_fs();
            let path_root = build_tree(&fs);
            delete_recursive(&path_root, rule_recursion).expect("delete");
            assert!(files::not_exists(&path_root, false));
        }
    }

    #[test]
    fn lone_file_is_deleted() {
        let fs = memory_fs();
        let path_file = fs.get_path("/solo", &[]).expect("path");
        write_bytes(&path_file, b"x").expect("write");
        delete_recursive(&path_file, EnumRecursionMode::FailFast).expect("delete");
        assert!(files::not_exists(&path_file, false));
    }

    #[test]
    fn missing_victim_fails_under_both_policies() {
        let fs = memory_fs();
        let path_missing = fs.get_path("/missing", &[]).expect("path");

        let err = delete_recursive(&path_missing, EnumRecursionMode::FailFast)
            .expect_err("must fail");
        assert!(matches!(err, FsError::NoSuchFile(_)));

        let err = delete_recursive(&path_missing, EnumRecursionMode::KeepGoing)
            .expect_err("must fail");
        let FsError::Recursive(report_errors) = err else {
            panic!("expected aggregate, got {err:?}");
        };
        assert_eq!(report_errors.error_count(), 1);
    }

    #[test]
    fn keep_going_leaves_unreadable_branch() {
        let fs = memory_fs();
        let path_root = build_tree(&fs);
        set_mode(&path_root.child("a"), 0o300).expect("chmod");

        let err = delete_recursive(&path_root, EnumRecursionMode::KeepGoing)
            .expect_err("must fail");
        let FsError::Recursive(report_errors) = err else {
            panic!("expected aggregate, got {err:?}");
        };
        // Listing `a` fails, then `victim` itself is not empty.
        assert_eq!(report_errors.error_count(), 2);
        assert!(matches!(report_errors.errors()[0], FsError::AccessDenied(_)));
        assert!(matches!(
            report_errors.errors()[1],
            FsError::DirectoryNotEmpty(_)
        ));
        assert!(files::not_exists(&path_root.child("g"), false));
        assert!(files::exists(&path_root.child("a"), false));
    }

    #[test]
    fn symbolic_links_are_removed_not_followed() {
        let fs = memory_fs();
        let path_keep = fs.get_path("/keep", &[]).expect("path");
        create_directories(&path_keep).expect("mkdir");
        write_bytes(&path_keep.child("inside"), b"x").expect("write");
        let path_root = build_tree(&fs);
        files::create_symbolic_link(&path_root.child("link"), &path_keep).expect("symlink");

        delete_recursive(&path_root, EnumRecursionMode::FailFast).expect("delete");
        assert!(files::exists(&path_keep.child("inside"), false));
    }

    #[test]
    fn host_tree_is_deleted() {
        let dir_tmp = tempfile::tempdir().expect("tempdir");
        let fs = default_file_system();
        let c_root = dir_tmp.path().join("victim");
        let path_root = fs
            .get_path(&c_root.to_string_lossy(), &[])
            .expect("path");
        create_directories(&path_root.child("x")).expect("mkdir");
        write_bytes(&path_root.child("x").child("y.txt"), b"y").expect("write");

        delete_recursive(&path_root, EnumRecursionMode::KeepGoing).expect("delete");
        assert!(!c_root.exists());
    }
}
