//! Recursive copy: visitors and orchestration.

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::files;
use crate::path::FsPath;
use crate::report::{EnumRecursiveOperation, RecursiveOperationError};
use crate::resolve::resolve_path;
use crate::spec::{EnumCopyOption, EnumRecursionMode, FileAttributes};
use crate::walk::{EnumVisitResult, FileVisitor, walk_file_tree};

/// Destination counterpart of `path_entry`, bound to the destination's
/// filesystem.
fn derive_destination_path(
    path_src: &FsPath,
    path_dst: &FsPath,
    path_entry: &FsPath,
) -> FsResult<FsPath> {
    let path_relative = path_src.relativize(path_entry)?;
    resolve_path(path_dst, &path_relative)
}

fn _check_regular_file(file: &FsPath, attrs: &FileAttributes) -> FsResult<()> {
    if attrs.is_regular_file() {
        return Ok(());
    }
    Err(FsError::UnsupportedOperation(format!(
        "only regular files can be copied: {file}"
    )))
}

fn _copy_file(path_src: &FsPath, path_dst: &FsPath, file: &FsPath) -> FsResult<()> {
    let path_target = derive_destination_path(path_src, path_dst, file)?;
    files::copy(file, &path_target, &[])
}

fn _create_directory(path_src: &FsPath, path_dst: &FsPath, dir: &FsPath) -> FsResult<()> {
    let path_target = derive_destination_path(path_src, path_dst, dir)?;
    files::create_directories(&path_target)
}

////////////////////////////////////////////////////////////////////////////////
// #region Visitors

/// Copy visitor propagating the first error.
#[derive(Debug, Clone)]
pub struct FailFastCopyVisitor {
    path_src: FsPath,
    path_dst: FsPath,
}

impl FailFastCopyVisitor {
    pub fn new(path_src: FsPath, path_dst: FsPath) -> Self {
        Self { path_src, path_dst }
    }
}

impl FileVisitor for FailFastCopyVisitor {
    fn pre_visit_directory(
        &mut self,
        dir: &FsPath,
        _attrs: &FileAttributes,
    ) -> FsResult<EnumVisitResult> {
        _create_directory(&self.path_src, &self.path_dst, dir)?;
        Ok(EnumVisitResult::Continue)
    }

    fn visit_file(&mut self, file: &FsPath, attrs: &FileAttributes) -> FsResult<EnumVisitResult> {
        _check_regular_file(file, attrs)?;
        _copy_file(&self.path_src, &self.path_dst, file)?;
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
        _dir: &FsPath,
        exception: Option<FsError>,
    ) -> FsResult<EnumVisitResult> {
        match exception {
            Some(e) => Err(e),
            None => Ok(EnumVisitResult::Continue),
        }
    }
}

/// Copy visitor recording every error into a caller-supplied aggregate.
///
/// Entries that are not regular files still abort the walk.
#[derive(Debug)]
pub struct KeepGoingCopyVisitor<'a> {
    path_src: FsPath,
    path_dst: FsPath,
    report_errors: &'a mut RecursiveOperationError,
}

impl<'a> KeepGoingCopyVisitor<'a> {
    pub fn new(
        path_src: FsPath,
        path_dst: FsPath,
        report_errors: &'a mut RecursiveOperationError,
    ) -> Self {
        Self {
            path_src,
            path_dst,
            report_errors,
        }
    }
}

impl FileVisitor for KeepGoingCopyVisitor<'_> {
    fn pre_visit_directory(
        &mut self,
        dir: &FsPath,
        _attrs: &FileAttributes,
    ) -> FsResult<EnumVisitResult> {
        if let Err(e) = _create_directory(&self.path_src, &self.path_dst, dir) {
            self.report_errors.add_error(e);
        }
        Ok(EnumVisitResult::Continue)
    }

    fn visit_file(&mut self, file: &FsPath, attrs: &FileAttributes) -> FsResult<EnumVisitResult> {
        _check_regular_file(file, attrs)?;
        if let Err(e) = _copy_file(&self.path_src, &self.path_dst, file) {
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
        _dir: &FsPath,
        exception: Option<FsError>,
    ) -> FsResult<EnumVisitResult> {
        if let Some(e) = exception {
            self.report_errors.add_error(e);
        }
        Ok(EnumVisitResult::Continue)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Orchestration

/// At most one option, and only `ReplaceExisting`. Returns whether
/// replacing was requested.
fn _validate_copy_options(options: &[EnumCopyOption]) -> FsResult<bool> {
    match options {
        [] => Ok(false),
        [EnumCopyOption::ReplaceExisting] => Ok(true),
        [option] => Err(FsError::UnsupportedOperation(format!(
            "unsupported copy option: {option:?}"
        ))),
        _ => Err(FsError::UnsupportedOperation(
            "at most one copy option is supported".to_string(),
        )),
    }
}

/// Copy the tree at `path_source` to `path_destination`, possibly across
/// filesystems.
///
/// The source is taken as its real path (symbolic links followed). An
/// existing destination is an error unless `ReplaceExisting` is given, in
/// which case it is deleted first; a non-empty destination directory then
/// fails with `DirectoryNotEmpty`.
pub fn copy_recursive(
    path_source: &FsPath,
    path_destination: &FsPath,
    rule_recursion: EnumRecursionMode,
    options: &[EnumCopyOption],
) -> FsResult<()> {
    let if_replace = _validate_copy_options(options)?;

    let path_src = files::to_real_path(path_source)?;
    let path_dst = files::to_absolute_path(path_destination)?;

    if if_replace {
        files::delete_if_exists(&path_dst)?;
    } else if files::exists(&path_dst, false) {
        return Err(FsError::FileAlreadyExists(path_destination.to_string()));
    }

    debug!(
        source = %path_src,
        destination = %path_dst,
        policy = ?rule_recursion,
        "copy recursive start"
    );
    match rule_recursion {
        EnumRecursionMode::FailFast => {
            let mut visitor = FailFastCopyVisitor::new(path_src.clone(), path_dst);
            walk_file_tree(&path_src, &mut visitor)
        }
        EnumRecursionMode::KeepGoing => {
            let mut report_errors = RecursiveOperationError::new(EnumRecursiveOperation::Copy);
            let mut visitor =
                KeepGoingCopyVisitor::new(path_src.clone(), path_dst, &mut report_errors);
            walk_file_tree(&path_src, &mut visitor)?;
            debug!(errors = report_errors.error_count(), "copy recursive done");
            report_errors.into_result()
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
