//! Path resolution across filesystem handles and backend kinds.

use crate::conf::{
    C_MSG_RESOLVE_ABSOLUTE_NO_ROOT, C_MSG_RESOLVE_INCOMPATIBLE_ROOT,
    C_MSG_RESOLVE_RELATIVE_WITH_ROOT,
};
use crate::error::{FsError, FsResult};
use crate::fs::{FileSystemExt, is_same_file_system, is_same_provider_family};
use crate::path::FsPath;

/// Resolve `path_target` against `path_base`; the result is always bound to
/// `path_base`'s filesystem.
///
/// - Same handle: native resolve.
/// - Same backend kind, other handle: the target's string form is re-parsed
///   in the base filesystem, then resolved natively.
/// - Other backend kind: the target's root (if any) must textually match one
///   of the base filesystem's roots, then every name of the target is
///   resolved one by one, by its string form.
pub fn resolve_path(path_base: &FsPath, path_target: &FsPath) -> FsResult<FsPath> {
    let fs_base = path_base.file_system();
    let fs_target = path_target.file_system();

    if is_same_file_system(fs_base, fs_target) {
        return Ok(path_base.resolve(path_target));
    }
    if is_same_provider_family(fs_base, fs_target) {
        let path_reparsed = fs_base.get_path(&path_target.to_string(), &[])?;
        return Ok(path_base.resolve(&path_reparsed));
    }

    let mut path_resolved = if path_target.is_absolute() {
        let Some(c_root_target) = path_target.root_name() else {
            return Err(FsError::UnresolvablePath(C_MSG_RESOLVE_ABSOLUTE_NO_ROOT));
        };
        // Textual match only: `C:\` and `c:\` are different roots here.
        let Some(c_root_base) = fs_base
            .root_directories()
            .into_iter()
            .find(|c_root| c_root == c_root_target)
        else {
            return Err(FsError::UnresolvablePath(C_MSG_RESOLVE_INCOMPATIBLE_ROOT));
        };
        fs_base.get_path(&c_root_base, &[])?
    } else {
        if path_target.root_name().is_some() {
            return Err(FsError::UnresolvablePath(C_MSG_RESOLVE_RELATIVE_WITH_ROOT));
        }
        if path_target.to_string().is_empty() {
            return Ok(path_base.clone());
        }
        path_base.clone()
    };

    for name in path_target.names() {
        let path_name = fs_base.get_path(name, &[])?;
        path_resolved = path_resolved.resolve(&path_name);
    }
    Ok(path_resolved)
}
