//! Path values bound to one filesystem handle.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::conf::TUP_WINDOWS_ILLEGAL;
use crate::error::{FsError, FsResult};
use crate::fs::{FileSystemRef, is_same_file_system};
use crate::spec::EnumPathSyntax;

////////////////////////////////////////////////////////////////////////////////
// #region Parsing

/// Root, names and absoluteness of a parsed path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpecPathParts {
    pub(crate) root: Option<String>,
    pub(crate) names: Vec<String>,
    pub(crate) if_absolute: bool,
}

/// Split a path string according to the given path model.
pub(crate) fn parse_path_parts(rule_syntax: EnumPathSyntax, value: &str) -> FsResult<SpecPathParts> {
    if value.contains('\0') {
        return Err(_invalid(value, "nul character in path"));
    }
    match rule_syntax {
        EnumPathSyntax::Unix => {
            let root = value.starts_with('/').then(|| "/".to_string());
            let if_absolute = root.is_some();
            Ok(SpecPathParts {
                root,
                names: _split_names(value, '/'),
                if_absolute,
            })
        }
        EnumPathSyntax::Windows => {
            let c_normalized = value.replace('/', "\\");
            let (root, c_rest, if_absolute) = _split_windows_root(&c_normalized, value)?;
            let names = _split_names(c_rest, '\\');
            for name in &names {
                if name.contains(TUP_WINDOWS_ILLEGAL) {
                    return Err(_invalid(value, "illegal character in name"));
                }
            }
            Ok(SpecPathParts {
                root,
                names,
                if_absolute,
            })
        }
    }
}

fn _invalid(value: &str, reason: &str) -> FsError {
    FsError::InvalidPath {
        path: value.to_string(),
        reason: reason.to_string(),
    }
}

fn _split_names(value: &str, c_sep: char) -> Vec<String> {
    value
        .split(c_sep)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn _split_windows_root<'a>(
    c_normalized: &'a str,
    value: &str,
) -> FsResult<(Option<String>, &'a str, bool)> {
    if let Some(c_unc) = c_normalized.strip_prefix("\\\\") {
        let mut iter_parts = c_unc.splitn(3, '\\');
        let c_server = iter_parts.next().unwrap_or("");
        let c_share = iter_parts.next().unwrap_or("");
        if c_server.is_empty() || c_share.is_empty() {
            return Err(_invalid(value, "UNC path is missing server or share name"));
        }
        let c_rest = iter_parts.next().unwrap_or("");
        return Ok((Some(format!("\\\\{c_server}\\{c_share}\\")), c_rest, true));
    }

    let bytes = c_normalized.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let c_drive = &c_normalized[..2];
        if bytes.get(2) == Some(&b'\\') {
            return Ok((Some(format!("{c_drive}\\")), &c_normalized[3..], true));
        }
        return Ok((Some(c_drive.to_string()), &c_normalized[2..], false));
    }

    if let Some(c_rest) = c_normalized.strip_prefix('\\') {
        return Ok((Some("\\".to_string()), c_rest, false));
    }
    Ok((None, c_normalized, false))
}

/// `C:` of a `C:` or `C:\` root.
fn _drive_of(c_root: &str) -> Option<&str> {
    let bytes = c_root.as_bytes();
    (bytes.len() >= 2 && bytes[1] == b':').then(|| &c_root[..2])
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FsPath

/// An ordered sequence of names, optionally anchored to a root, always bound
/// to exactly one filesystem handle.
#[derive(Clone)]
pub struct FsPath {
    fs: FileSystemRef,
    root: Option<String>,
    names: Vec<String>,
    if_absolute: bool,
}

impl FsPath {
    /// Parse `first` joined with `more` using the filesystem's path model.
    pub fn parse(fs: &FileSystemRef, first: &str, more: &[&str]) -> FsResult<Self> {
        let c_sep = fs.syntax().separator();
        let mut c_joined = first.to_string();
        for part in more.iter().filter(|p| !p.is_empty()) {
            if !c_joined.is_empty() {
                c_joined.push_str(c_sep);
            }
            c_joined.push_str(part);
        }
        let spec_parts = parse_path_parts(fs.syntax(), &c_joined)?;
        Ok(Self {
            fs: fs.clone(),
            root: spec_parts.root,
            names: spec_parts.names,
            if_absolute: spec_parts.if_absolute,
        })
    }

    /// Build a path from already-split components.
    ///
    /// Backends whose path model allows it may pass an absolute path without
    /// a root.
    pub fn from_parts(
        fs: &FileSystemRef,
        root: Option<String>,
        names: Vec<String>,
        if_absolute: bool,
    ) -> Self {
        Self {
            fs: fs.clone(),
            root,
            names,
            if_absolute,
        }
    }

    pub fn file_system(&self) -> &FileSystemRef {
        &self.fs
    }

    pub fn syntax(&self) -> EnumPathSyntax {
        self.fs.syntax()
    }

    pub fn is_absolute(&self) -> bool {
        self.if_absolute
    }

    /// String form of the root component.
    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// The root component as a path of its own.
    pub fn root(&self) -> Option<FsPath> {
        self.root.as_ref().map(|root| Self {
            fs: self.fs.clone(),
            root: Some(root.clone()),
            names: Vec::new(),
            if_absolute: self.if_absolute,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// No root and no names.
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.names.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<FsPath> {
        if self.names.is_empty() || (self.names.len() == 1 && self.root.is_none()) {
            return None;
        }
        Some(Self {
            fs: self.fs.clone(),
            root: self.root.clone(),
            names: self.names[..self.names.len() - 1].to_vec(),
            if_absolute: self.if_absolute,
        })
    }

    /// This path with one more name appended.
    pub fn child(&self, name: &str) -> FsPath {
        let mut names = self.names.clone();
        names.push(name.to_string());
        Self {
            fs: self.fs.clone(),
            root: self.root.clone(),
            names,
            if_absolute: self.if_absolute,
        }
    }

    /// Native same-filesystem resolve. The result stays bound to this
    /// path's filesystem; use [`crate::resolve::resolve_path`] across
    /// filesystems.
    ///
    /// Windows rooted-relative targets (`\a`) keep this path's drive and
    /// drive-relative targets (`C:a`) append to this path when it is on the
    /// same drive.
    pub fn resolve(&self, other: &FsPath) -> FsPath {
        if other.if_absolute {
            return other.rebind(&self.fs);
        }
        match other.root.as_deref() {
            None => {}
            Some("\\") => return self._resolve_rooted(other),
            Some(c_drive) => {
                let if_same_drive = self
                    .root
                    .as_deref()
                    .and_then(_drive_of)
                    .is_some_and(|c_base| c_base.eq_ignore_ascii_case(c_drive));
                if !if_same_drive {
                    return other.rebind(&self.fs);
                }
            }
        }
        if other.names.is_empty() {
            return self.clone();
        }
        let mut names = self.names.clone();
        names.extend(other.names.iter().cloned());
        Self {
            fs: self.fs.clone(),
            root: self.root.clone(),
            names,
            if_absolute: self.if_absolute,
        }
    }

    /// `\a` against this path: same drive or share, names replaced.
    fn _resolve_rooted(&self, other: &FsPath) -> FsPath {
        let (root, if_absolute) = match self.root.as_deref() {
            None => return other.rebind(&self.fs),
            // `C:x` + `\a` is `C:\a`.
            Some(c_root) if !c_root.ends_with('\\') => (format!("{c_root}\\"), true),
            Some(c_root) => (c_root.to_string(), self.if_absolute),
        };
        Self {
            fs: self.fs.clone(),
            root: Some(root),
            names: other.names.clone(),
            if_absolute,
        }
    }

    /// Parse `other` in this path's filesystem, then resolve it.
    pub fn resolve_str(&self, other: &str) -> FsResult<FsPath> {
        let path_other = Self::parse(&self.fs, other, &[])?;
        Ok(self.resolve(&path_other))
    }

    /// Relative path leading from this path to `other`.
    pub fn relativize(&self, other: &FsPath) -> FsResult<FsPath> {
        if self.root != other.root {
            return Err(FsError::InvalidPath {
                path: other.to_string(),
                reason: format!("cannot relativize against {self}: different roots"),
            });
        }
        let n_common = self
            .names
            .iter()
            .zip(&other.names)
            .take_while(|(a, b)| a == b)
            .count();
        let mut names = vec!["..".to_string(); self.names.len() - n_common];
        names.extend(other.names[n_common..].iter().cloned());
        Ok(Self {
            fs: self.fs.clone(),
            root: None,
            names,
            if_absolute: false,
        })
    }

    /// Lexically drop `.` names and fold `..` names.
    pub fn normalize(&self) -> FsPath {
        let mut names: Vec<String> = Vec::with_capacity(self.names.len());
        for name in &self.names {
            match name.as_str() {
                "." => {}
                ".." => match names.last().map(String::as_str) {
                    Some("..") | None => {
                        if self.root.is_none() {
                            names.push(name.clone());
                        }
                    }
                    Some(_) => {
                        names.pop();
                    }
                },
                _ => names.push(name.clone()),
            }
        }
        Self {
            fs: self.fs.clone(),
            root: self.root.clone(),
            names,
            if_absolute: self.if_absolute,
        }
    }

    /// Component-wise prefix test.
    pub fn starts_with(&self, other: &FsPath) -> bool {
        self.root == other.root
            && other.names.len() <= self.names.len()
            && self.names.iter().zip(&other.names).all(|(a, b)| a == b)
    }

    /// Same components, bound to another handle sharing the path model.
    pub(crate) fn rebind(&self, fs: &FileSystemRef) -> FsPath {
        Self {
            fs: fs.clone(),
            root: self.root.clone(),
            names: self.names.clone(),
            if_absolute: self.if_absolute,
        }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = &self.root {
            f.write_str(root)?;
        }
        f.write_str(&self.names.join(self.fs.syntax().separator()))
    }
}

impl fmt::Debug for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FsPath").field(&self.to_string()).finish()
    }
}

impl PartialEq for FsPath {
    fn eq(&self, other: &Self) -> bool {
        is_same_file_system(&self.fs, &other.fs)
            && self.root == other.root
            && self.names == other.names
    }
}

impl Eq for FsPath {}

impl Hash for FsPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.names.hash(state);
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystemExt;
    use crate::memory::MemoryFileSystem;
    use crate::spec::SpecMemoryFsOptions;

    #[test]
    fn unix_parts_split_on_slash() {
        let spec_parts = parse_path_parts(EnumPathSyntax::Unix, "/foo//bar/").expect("parse");
        assert_eq!(spec_parts.root.as_deref(), Some("/"));
        assert_eq!(spec_parts.names, vec!["foo", "bar"]);
        assert!(spec_parts.if_absolute);

        let spec_parts = parse_path_parts(EnumPathSyntax::Unix, "a\\b").expect("parse");
        assert_eq!(spec_parts.names, vec!["a\\b"]);
        assert!(spec_parts.root.is_none());
    }

    #[test]
    fn windows_roots_are_classified() {
        let cases = [
            ("C:\\a\\b", Some("C:\\"), true, vec!["a", "b"]),
            ("C:a", Some("C:"), false, vec!["a"]),
            ("\\a", Some("\\"), false, vec!["a"]),
            ("\\\\srv\\share\\x", Some("\\\\srv\\share\\"), true, vec!["x"]),
            ("toto/le\\heros", None, false, vec!["toto", "le", "heros"]),
        ];
        for (value, root, if_absolute, names) in cases {
            let spec_parts = parse_path_parts(EnumPathSyntax::Windows, value).expect("parse");
            assert_eq!(spec_parts.root.as_deref(), root, "{value}");
            assert_eq!(spec_parts.if_absolute, if_absolute, "{value}");
            assert_eq!(spec_parts.names, names, "{value}");
        }
    }

    #[test]
    fn windows_rejects_illegal_names() {
        let err = parse_path_parts(EnumPathSyntax::Windows, "a\\b?").expect_err("must fail");
        assert!(matches!(err, FsError::InvalidPath { .. }));
        let err = parse_path_parts(EnumPathSyntax::Windows, "\\\\srv").expect_err("must fail");
        assert!(matches!(err, FsError::InvalidPath { .. }));
    }

    #[test]
    fn render_parent_and_resolve() {
        let fs = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_base = fs.get_path("/foo", &["bar"]).expect("path");
        assert_eq!(path_base.to_string(), "/foo/bar");
        assert_eq!(path_base.parent().expect("parent").to_string(), "/foo");
        assert_eq!(path_base.file_name(), Some("bar"));

        let path_empty = fs.get_path("", &[]).expect("path");
        assert!(path_empty.is_empty());
        assert_eq!(path_base.resolve(&path_empty), path_base);

        let path_rel = fs.get_path("a/b", &[]).expect("path");
        assert_eq!(path_base.resolve(&path_rel).to_string(), "/foo/bar/a/b");
        assert_eq!(path_rel.parent().expect("parent").to_string(), "a");
        assert!(path_rel.child("c").parent().is_some());
        assert!(fs.get_path("a", &[]).expect("path").parent().is_none());

        let path_abs = fs.get_path("/x", &[]).expect("path");
        assert_eq!(path_base.resolve(&path_abs), path_abs);

        let fs_windows = MemoryFileSystem::build(SpecMemoryFsOptions {
            roots: vec!["C:\\".to_string(), "D:\\".to_string()],
            ..SpecMemoryFsOptions::windows()
        })
        .expect("fs");
        let path_win = fs_windows.get_path("C:\\x", &["y"]).expect("path");
        let cases = [
            ("\\a", "C:\\a", true),
            ("C:a", "C:\\x\\y\\a", true),
            ("c:a", "C:\\x\\y\\a", true),
            ("D:a", "D:a", false),
            ("D:\\a", "D:\\a", true),
            ("a\\b", "C:\\x\\y\\a\\b", true),
        ];
        for (value, c_expected, if_absolute) in cases {
            let path_other = fs_windows.get_path(value, &[]).expect("path");
            let path_resolved = path_win.resolve(&path_other);
            assert_eq!(path_resolved.to_string(), c_expected, "{value}");
            assert_eq!(path_resolved.is_absolute(), if_absolute, "{value}");
        }

        let path_drive_rel = fs_windows.get_path("C:x", &[]).expect("path");
        let path_rooted = fs_windows.get_path("\\a", &[]).expect("path");
        let path_resolved = path_drive_rel.resolve(&path_rooted);
        assert_eq!(path_resolved.to_string(), "C:\\a");
        assert!(path_resolved.is_absolute());

        let path_unc = fs_windows.get_path("\\\\srv\\share\\x", &[]).expect("path");
        assert_eq!(path_unc.resolve(&path_rooted).to_string(), "\\\\srv\\share\\a");
    }

    #[test]
    fn relativize_and_normalize() {
        let fs = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_a = fs.get_path("/a/b", &[]).expect("path");
        let path_b = fs.get_path("/a/c/d", &[]).expect("path");
        let path_rel = path_a.relativize(&path_b).expect("relativize");
        assert_eq!(path_rel.to_string(), "../c/d");
        assert_eq!(path_a.resolve(&path_rel).normalize(), path_b);
        assert!(path_a.relativize(&path_a).expect("relativize").is_empty());

        let path_rel_other = fs.get_path("x", &[]).expect("path");
        assert!(path_a.relativize(&path_rel_other).is_err());

        let path_messy = fs.get_path("/a/./b/../../..", &[]).expect("path");
        assert_eq!(path_messy.normalize().to_string(), "/");
        let path_up = fs.get_path("../x/..", &[]).expect("path");
        assert_eq!(path_up.normalize().to_string(), "..");
    }

    #[test]
    fn equality_requires_same_filesystem() {
        let fs_a = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let fs_b = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_a = fs_a.get_path("/x", &[]).expect("path");
        assert_eq!(path_a, fs_a.get_path("/x", &[]).expect("path"));
        assert_ne!(path_a, fs_b.get_path("/x", &[]).expect("path"));
        assert!(path_a.child("y").starts_with(&path_a));
    }
}
