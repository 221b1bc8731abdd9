//! Depth-first tree walk driving a four-hook visitor.

use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::path::FsPath;
use crate::spec::FileAttributes;

/// What the walk does after a hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumVisitResult {
    Continue,
    /// Do not descend into this directory (pre-visit only).
    SkipSubtree,
    /// Skip the remaining siblings of this entry.
    SkipSiblings,
    /// Stop the whole walk.
    Terminate,
}

/// Callbacks invoked by [`walk_file_tree`].
///
/// Any `Err` returned by a hook aborts the walk and is returned by it.
pub trait FileVisitor {
    /// Before the entries of `dir` are visited.
    fn pre_visit_directory(
        &mut self,
        dir: &FsPath,
        attrs: &FileAttributes,
    ) -> FsResult<EnumVisitResult>;

    /// For every entry that is not a directory.
    fn visit_file(&mut self, file: &FsPath, attrs: &FileAttributes) -> FsResult<EnumVisitResult>;

    /// When an entry could not be read, or a directory could not be opened.
    fn visit_file_failed(&mut self, file: &FsPath, exception: FsError)
    -> FsResult<EnumVisitResult>;

    /// After the entries of `dir`; `exception` is set when iteration failed.
    fn post_visit_directory(
        &mut self,
        dir: &FsPath,
        exception: Option<FsError>,
    ) -> FsResult<EnumVisitResult>;
}

/// Walk the tree rooted at `path_start` without following symbolic links.
///
/// Directories are visited pre-order and post-order; sibling order is the
/// order of the backend's directory stream.
pub fn walk_file_tree(path_start: &FsPath, visitor: &mut dyn FileVisitor) -> FsResult<()> {
    _walk_entry(path_start, visitor).map(|_| ())
}

fn _walk_entry(path_entry: &FsPath, visitor: &mut dyn FileVisitor) -> FsResult<EnumVisitResult> {
    let provider = path_entry.file_system().provider();

    let attrs = match provider.read_attributes(path_entry, false) {
        Ok(attrs) => attrs,
        Err(e) => return visitor.visit_file_failed(path_entry, e),
    };
    if !attrs.is_directory() {
        trace!(path = %path_entry, "visit file");
        return visitor.visit_file(path_entry, &attrs);
    }

    let iter_entries = match provider.new_directory_stream(path_entry) {
        Ok(iter_entries) => iter_entries,
        Err(e) => return visitor.visit_file_failed(path_entry, e),
    };

    trace!(path = %path_entry, "enter directory");
    match visitor.pre_visit_directory(path_entry, &attrs)? {
        EnumVisitResult::Continue => {}
        EnumVisitResult::SkipSubtree => return Ok(EnumVisitResult::Continue),
        enum_result => return Ok(enum_result),
    }

    let mut exception_dir = None;
    for entry in iter_entries {
        match entry {
            Ok(path_child) => match _walk_entry(&path_child, visitor)? {
                EnumVisitResult::Terminate => return Ok(EnumVisitResult::Terminate),
                EnumVisitResult::SkipSiblings => break,
                EnumVisitResult::Continue | EnumVisitResult::SkipSubtree => {}
            },
            Err(e) => {
                exception_dir = Some(e);
                break;
            }
        }
    }

    trace!(path = %path_entry, "leave directory");
    visitor.post_visit_directory(path_entry, exception_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files;
    use crate::fs::FileSystemExt;
    use crate::memory::MemoryFileSystem;
    use crate::spec::SpecMemoryFsOptions;

    #[derive(Default)]
    struct RecordingVisitor {
        l_events: Vec<String>,
        c_skip: Option<String>,
    }

    impl FileVisitor for RecordingVisitor {
        fn pre_visit_directory(
            &mut self,
            dir: &FsPath,
            _attrs: &FileAttributes,
        ) -> FsResult<EnumVisitResult> {
            self.l_events.push(format!("pre {dir}"));
            if self.c_skip.as_deref() == dir.file_name() {
                return Ok(EnumVisitResult::SkipSubtree);
            }
            Ok(EnumVisitResult::Continue)
        }

        fn visit_file(
            &mut self,
            file: &FsPath,
            _attrs: &FileAttributes,
        ) -> FsResult<EnumVisitResult> {
            self.l_events.push(format!("file {file}"));
            Ok(EnumVisitResult::Continue)
        }

        fn visit_file_failed(
            &mut self,
            file: &FsPath,
            exception: FsError,
        ) -> FsResult<EnumVisitResult> {
            self.l_events.push(format!("failed {file}: {exception}"));
            Ok(EnumVisitResult::Continue)
        }

        fn post_visit_directory(
            &mut self,
            dir: &FsPath,
            _exception: Option<FsError>,
        ) -> FsResult<EnumVisitResult> {
            self.l_events.push(format!("post {dir}"));
            Ok(EnumVisitResult::Continue)
        }
    }

    #[test]
    fn walk_is_pre_and_post_order() {
        let fs = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_root = fs.get_path("/t", &[]).expect("path");
        files::create_directories(&path_root.child("a")).expect("mkdir");
        files::write_bytes(&path_root.child("a").child("f"), b"x").expect("write");
        files::write_bytes(&path_root.child("g"), b"y").expect("write");

        let mut visitor = RecordingVisitor::default();
        walk_file_tree(&path_root, &mut visitor).expect("walk");
        assert_eq!(
            visitor.l_events,
            vec!["pre /t", "pre /t/a", "file /t/a/f", "post /t/a", "file /t/g", "post /t"]
        );
    }

    #[test]
    fn skip_subtree_omits_children_and_post_visit() {
        let fs = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_root = fs.get_path("/t", &[]).expect("path");
        files::create_directories(&path_root.child("a")).expect("mkdir");
        files::write_bytes(&path_root.child("a").child("f"), b"x").expect("write");

        let mut visitor = RecordingVisitor {
            c_skip: Some("a".to_string()),
            ..RecordingVisitor::default()
        };
        walk_file_tree(&path_root, &mut visitor).expect("walk");
        assert_eq!(visitor.l_events, vec!["pre /t", "pre /t/a", "post /t"]);
    }

    #[test]
    fn missing_start_reports_failure() {
        let fs = MemoryFileSystem::build(SpecMemoryFsOptions::unix()).expect("fs");
        let path_missing = fs.get_path("/missing", &[]).expect("path");
        let mut visitor = RecordingVisitor::default();
        walk_file_tree(&path_missing, &mut visitor).expect("walk");
        assert_eq!(visitor.l_events, vec!["failed /missing: no such file: /missing"]);
    }
}
