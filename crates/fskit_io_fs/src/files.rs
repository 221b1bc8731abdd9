//! Path operations routed through each path's own provider.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::fs::{PathMatcher, ProviderRef, is_same_file_system};
use crate::path::FsPath;
use crate::posix::{PermissionSet, build_mode_change};
use crate::spec::{AttributeValue, EnumCopyOption, EnumOpenOption, FileAttributes};

////////////////////////////////////////////////////////////////////////////////
// #region Queries

pub fn provider_of(path: &FsPath) -> ProviderRef {
    path.file_system().provider()
}

pub fn read_attributes(path: &FsPath, if_follow_links: bool) -> FsResult<FileAttributes> {
    provider_of(path).read_attributes(path, if_follow_links)
}

/// `false` on any error, not only when the entry is missing.
pub fn exists(path: &FsPath, if_follow_links: bool) -> bool {
    read_attributes(path, if_follow_links).is_ok()
}

/// `true` only when the entry is known to be missing.
pub fn not_exists(path: &FsPath, if_follow_links: bool) -> bool {
    matches!(
        read_attributes(path, if_follow_links),
        Err(FsError::NoSuchFile(_))
    )
}

pub fn is_directory(path: &FsPath) -> bool {
    read_attributes(path, true).is_ok_and(|attrs| attrs.is_directory())
}

pub fn is_regular_file(path: &FsPath) -> bool {
    read_attributes(path, true).is_ok_and(|attrs| attrs.is_regular_file())
}

pub fn is_symbolic_link(path: &FsPath) -> bool {
    read_attributes(path, false).is_ok_and(|attrs| attrs.is_symbolic_link())
}

/// Entries of `dir`, optionally filtered by a path matcher.
pub fn list_directory(dir: &FsPath, matcher: Option<&PathMatcher>) -> FsResult<Vec<FsPath>> {
    let mut l_entries = Vec::new();
    for entry in provider_of(dir).new_directory_stream(dir)? {
        let path_entry = entry?;
        if matcher.is_none_or(|m| m.matches(&path_entry)) {
            l_entries.push(path_entry);
        }
    }
    Ok(l_entries)
}

pub fn to_real_path(path: &FsPath) -> FsResult<FsPath> {
    provider_of(path).to_real_path(path)
}

pub fn to_absolute_path(path: &FsPath) -> FsResult<FsPath> {
    provider_of(path).to_absolute_path(path)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Mutations

pub fn create_directory(dir: &FsPath) -> FsResult<()> {
    provider_of(dir).create_directory(dir, None)
}

/// Create `dir` and every missing parent; an existing directory is fine.
pub fn create_directories(dir: &FsPath) -> FsResult<()> {
    match read_attributes(dir, true) {
        Ok(attrs) if attrs.is_directory() => return Ok(()),
        Ok(_) => return Err(FsError::FileAlreadyExists(dir.to_string())),
        Err(FsError::NoSuchFile(_)) => {}
        Err(e) => return Err(e),
    }
    if let Some(path_parent) = dir.parent() {
        create_directories(&path_parent)?;
    }
    match create_directory(dir) {
        Err(FsError::FileAlreadyExists(_)) if is_directory(dir) => Ok(()),
        res => res,
    }
}

/// Create an empty regular file; fails if anything exists at `path`.
pub fn create_file(path: &FsPath) -> FsResult<()> {
    let mut writer = provider_of(path)
        .new_output_stream(path, &[EnumOpenOption::CreateNew, EnumOpenOption::Write])?;
    writer
        .flush()
        .map_err(|e| FsError::from_io(path.to_string(), e))
}

pub fn create_symbolic_link(link: &FsPath, target: &FsPath) -> FsResult<()> {
    provider_of(link).create_symbolic_link(link, target)
}

pub fn delete(path: &FsPath) -> FsResult<()> {
    provider_of(path).delete(path)
}

pub fn delete_if_exists(path: &FsPath) -> FsResult<bool> {
    provider_of(path).delete_if_exists(path)
}

/// Copy one entry; directories are copied empty.
///
/// Within one filesystem the provider copies natively. Across filesystems
/// the content is streamed into a newly created target.
pub fn copy(path_src: &FsPath, path_dst: &FsPath, options: &[EnumCopyOption]) -> FsResult<()> {
    if is_same_file_system(path_src.file_system(), path_dst.file_system()) {
        return provider_of(path_src).copy(path_src, path_dst, options);
    }
    _copy_to_foreign_target(path_src, path_dst, options)
}

fn _copy_to_foreign_target(
    path_src: &FsPath,
    path_dst: &FsPath,
    options: &[EnumCopyOption],
) -> FsResult<()> {
    let if_nofollow = options.contains(&EnumCopyOption::NoFollowLinks);
    let attrs_src = read_attributes(path_src, !if_nofollow)?;
    if attrs_src.is_symbolic_link() {
        return Err(FsError::UnsupportedOperation(format!(
            "cannot copy symbolic link {path_src} to another filesystem"
        )));
    }

    if options.contains(&EnumCopyOption::ReplaceExisting) {
        delete_if_exists(path_dst)?;
    } else if exists(path_dst, false) {
        return Err(FsError::FileAlreadyExists(path_dst.to_string()));
    }

    if attrs_src.is_directory() {
        return create_directory(path_dst);
    }

    let mut reader = provider_of(path_src).new_input_stream(path_src, &[])?;
    let mut writer = provider_of(path_dst)
        .new_output_stream(path_dst, &[EnumOpenOption::CreateNew, EnumOpenOption::Write])?;
    io::copy(&mut reader, &mut writer).map_err(|e| FsError::from_io(path_dst.to_string(), e))?;
    writer
        .flush()
        .map_err(|e| FsError::from_io(path_dst.to_string(), e))?;

    if options.contains(&EnumCopyOption::CopyAttributes) {
        set_last_modified_time(path_dst, attrs_src.time_modified)?;
        if let Some(permissions) = attrs_src.permissions {
            // Targets without POSIX permissions keep their defaults.
            match set_posix_permissions(path_dst, permissions) {
                Ok(()) | Err(FsError::UnsupportedOperation(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Move one entry; across filesystems this is a copy followed by a delete.
pub fn move_path(path_src: &FsPath, path_dst: &FsPath, options: &[EnumCopyOption]) -> FsResult<()> {
    if is_same_file_system(path_src.file_system(), path_dst.file_system()) {
        return provider_of(path_src).move_path(path_src, path_dst, options);
    }
    if options.contains(&EnumCopyOption::AtomicMove) {
        return Err(FsError::UnsupportedOperation(format!(
            "atomic move of {path_src} to another filesystem"
        )));
    }
    let mut l_options = options.to_vec();
    l_options.push(EnumCopyOption::CopyAttributes);
    _copy_to_foreign_target(path_src, path_dst, &l_options)?;
    delete(path_src)
}

pub fn read_all_bytes(path: &FsPath) -> FsResult<Vec<u8>> {
    let mut reader = provider_of(path).new_input_stream(path, &[])?;
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| FsError::from_io(path.to_string(), e))?;
    Ok(buf)
}

pub fn read_to_string(path: &FsPath) -> FsResult<String> {
    let buf = read_all_bytes(path)?;
    String::from_utf8(buf).map_err(|e| {
        FsError::from_io(
            path.to_string(),
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })
}

/// Create or truncate `path`, then write `data`.
pub fn write_bytes(path: &FsPath, data: &[u8]) -> FsResult<()> {
    let mut writer = provider_of(path).new_output_stream(path, &[])?;
    writer
        .write_all(data)
        .and_then(|_| writer.flush())
        .map_err(|e| FsError::from_io(path.to_string(), e))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Permissions

pub fn get_posix_permissions(path: &FsPath) -> FsResult<PermissionSet> {
    read_attributes(path, true)?
        .permissions
        .ok_or_else(|| FsError::UnsupportedOperation(format!("POSIX permissions of {path}")))
}

pub fn set_posix_permissions(path: &FsPath, permissions: PermissionSet) -> FsResult<()> {
    provider_of(path).set_attribute(
        path,
        "posix:permissions",
        AttributeValue::Permissions(permissions),
        true,
    )
}

pub fn set_last_modified_time(path: &FsPath, time: SystemTime) -> FsResult<()> {
    provider_of(path).set_attribute(
        path,
        "basic:lastModifiedTime",
        AttributeValue::Time(time),
        true,
    )
}

/// Set permissions from an integer mode in `0..=0o777`.
pub fn set_mode(path: &FsPath, mode: u32) -> FsResult<()> {
    set_posix_permissions(path, PermissionSet::from_int_mode(mode)?)
}

/// Set permissions from a `rw-r-----` string.
pub fn set_mode_from_string(path: &FsPath, permissions: &str) -> FsResult<()> {
    set_posix_permissions(path, PermissionSet::from_permission_string(permissions)?)
}

pub fn create_file_with_mode(path: &FsPath, mode: u32) -> FsResult<()> {
    let permissions = PermissionSet::from_int_mode(mode)?;
    create_file(path)?;
    set_posix_permissions(path, permissions)
}

pub fn create_directory_with_mode(dir: &FsPath, mode: u32) -> FsResult<()> {
    let permissions = PermissionSet::from_int_mode(mode)?;
    provider_of(dir).create_directory(dir, Some(permissions))
}

/// Like [`create_directories`]; only directories created here get `mode`.
pub fn create_directories_with_mode(dir: &FsPath, mode: u32) -> FsResult<()> {
    let permissions = PermissionSet::from_int_mode(mode)?;
    let mut l_missing = Vec::new();
    let mut path_cursor = Some(dir.clone());
    while let Some(path_current) = path_cursor {
        match read_attributes(&path_current, true) {
            Ok(attrs) if attrs.is_directory() => break,
            Ok(_) => return Err(FsError::FileAlreadyExists(path_current.to_string())),
            Err(FsError::NoSuchFile(_)) => {}
            Err(e) => return Err(e),
        }
        path_cursor = path_current.parent();
        l_missing.push(path_current);
    }
    for path_missing in l_missing.iter().rev() {
        provider_of(path_missing).create_directory(path_missing, Some(permissions))?;
    }
    Ok(())
}

/// Create an empty file, or bump the modification time of an existing one.
pub fn touch(path: &FsPath) -> FsResult<()> {
    if exists(path, true) {
        return set_last_modified_time(path, SystemTime::now());
    }
    create_file(path)
}

/// Apply chmod-style instructions (`o-rwx,g+r`) to the current permissions.
pub fn change_mode(path: &FsPath, instructions: &str) -> FsResult<()> {
    let spec_change = build_mode_change(instructions)?;
    let perms_before = get_posix_permissions(path)?;
    let perms_after = spec_change.modify(perms_before);
    debug!(path = %path, before = %perms_before, after = %perms_after, "change mode");
    set_posix_permissions(path, perms_after)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileSystemExt, FileSystemRef};
    use crate::memory::MemoryFileSystem;
    use crate::spec::SpecMemoryFsOptions;

    fn memory_fs() -> FileSystemRef {
        MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs")
    }

    #[test]
    fn create_directories_tolerates_existing() {
        let fs = memory_fs();
        let path_dir = fs.get_path("/a/b/c", &[]).expect("path");
        create_directories(&path_dir).expect("mkdirs");
        create_directories(&path_dir).expect("mkdirs again");
        assert!(is_directory(&path_dir));

        let path_file = fs.get_path("/a/f", &[]).expect("path");
        write_bytes(&path_file, b"x").expect("write");
        let err = create_directories(&path_file).expect_err("must fail");
        assert!(matches!(err, FsError::FileAlreadyExists(_)));
    }

    #[test]
    fn copy_across_filesystems_streams_content() {
        let fs_a = memory_fs();
        let fs_b = MemoryFileSystem::build(SpecMemoryFsOptions::windows()).expect("fs");
        let path_src = fs_a.get_path("/src.txt", &[]).expect("path");
        let path_dst = fs_b.get_path("C:\\dst.txt", &[]).expect("path");
        write_bytes(&path_src, b"payload").expect("write");

        copy(&path_src, &path_dst, &[]).expect("copy");
        assert_eq!(read_all_bytes(&path_dst).expect("read"), b"payload");

        let err = copy(&path_src, &path_dst, &[]).expect_err("must fail");
        assert!(matches!(err, FsError::FileAlreadyExists(_)));
        write_bytes(&path_src, b"second").expect("write");
        copy(&path_src, &path_dst, &[EnumCopyOption::ReplaceExisting]).expect("copy");
        assert_eq!(read_to_string(&path_dst).expect("read"), "second");
    }

    #[test]
    fn move_across_filesystems_removes_source() {
        let fs_a = memory_fs();
        let fs_b = memory_fs();
        let path_src = fs_a.get_path("/m.txt", &[]).expect("path");
        let path_dst = fs_b.get_path("/m.txt", &[]).expect("path");
        write_bytes(&path_src, b"m").expect("write");
        move_path(&path_src, &path_dst, &[]).expect("move");
        assert!(not_exists(&path_src, false));
        assert_eq!(read_all_bytes(&path_dst).expect("read"), b"m");
    }

    #[test]
    fn modes_and_change_mode() {
        let fs = memory_fs();
        let path_file = fs.get_path("/perm.txt", &[]).expect("path");
        create_file_with_mode(&path_file, 0o607).expect("create");
        assert_eq!(
            get_posix_permissions(&path_file).expect("perms").to_int_mode(),
            0o607
        );

        change_mode(&path_file, "o-rwx,g+r").expect("chmod");
        assert_eq!(
            get_posix_permissions(&path_file).expect("perms").to_int_mode(),
            0o640
        );

        set_mode_from_string(&path_file, "rw-r-----").expect("set");
        assert_eq!(
            get_posix_permissions(&path_file).expect("perms").to_int_mode(),
            0o640
        );

        let err = set_mode(&path_file, 0o1000).expect_err("must fail");
        assert!(matches!(err, FsError::InvalidIntMode(_)));
        let err = change_mode(&path_file, "a+r").expect_err("must fail");
        assert!(matches!(err, FsError::UnsupportedOperation(_)));
    }

    #[test]
    fn create_directories_with_mode_only_touches_new_dirs() {
        let fs = memory_fs();
        let path_existing = fs.get_path("/keep", &[]).expect("path");
        create_directory_with_mode(&path_existing, 0o755).expect("mkdir");
        let path_new = path_existing.child("x").child("y");
        create_directories_with_mode(&path_new, 0o700).expect("mkdirs");

        let get_mode =
            |p: &FsPath| get_posix_permissions(p).expect("perms").to_int_mode();
        assert_eq!(get_mode(&path_existing), 0o755);
        assert_eq!(get_mode(&path_existing.child("x")), 0o700);
        assert_eq!(get_mode(&path_new), 0o700);
    }

    #[test]
    fn touch_creates_then_updates() {
        let fs = memory_fs();
        let path_file = fs.get_path("/t", &[]).expect("path");
        touch(&path_file).expect("create");
        assert!(is_regular_file(&path_file));

        let time_old = SystemTime::UNIX_EPOCH;
        set_last_modified_time(&path_file, time_old).expect("set");
        touch(&path_file).expect("update");
        let attrs = read_attributes(&path_file, true).expect("attrs");
        assert!(attrs.time_modified > time_old);
    }

    #[test]
    fn list_directory_with_matcher() {
        let fs = memory_fs();
        let path_dir = fs.get_path("/d", &[]).expect("path");
        create_directory(&path_dir).expect("mkdir");
        for name in ["a.txt", "b.md", "c.txt"] {
            write_bytes(&path_dir.child(name), b"").expect("write");
        }
        let matcher = fs.path_matcher("glob:/d/*.txt").expect("matcher");
        let l_names = list_directory(&path_dir, Some(&matcher))
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name().map(String::from))
            .collect::<Vec<_>>();
        assert_eq!(l_names, vec!["a.txt", "c.txt"]);
        assert_eq!(list_directory(&path_dir, None).expect("list").len(), 3);
    }
}
