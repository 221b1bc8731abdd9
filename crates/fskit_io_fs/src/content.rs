//! Write-then-rename content modification.
//!
//! A [`ContentModifier`] reads the original file and writes the replacement
//! into a sibling temporary file. [`ContentModifier::commit`] moves the
//! temporary file over the original; dropping the modifier without
//! committing discards it.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::files;
use crate::fs::{FileSystemExt, InputStream, OutputStream};
use crate::path::FsPath;
use crate::spec::{EnumCopyOption, EnumOpenOption};

static CNT_TEMP_FILES: AtomicU64 = AtomicU64::new(0);

fn _derive_temp_path(path_target: &FsPath) -> FsResult<FsPath> {
    let c_name = format!(
        ".replace-{}-{}.tmp",
        std::process::id(),
        CNT_TEMP_FILES.fetch_add(1, Ordering::Relaxed)
    );
    match path_target.parent() {
        Some(path_parent) => Ok(path_parent.child(&c_name)),
        None => path_target.file_system().get_path(&c_name, &[]),
    }
}

/// Reader of the original content paired with a writer of its replacement.
pub struct ContentModifier {
    path_target: FsPath,
    path_temp: FsPath,
    reader: Option<InputStream>,
    writer: Option<OutputStream>,
    if_failed: bool,
    if_committed: bool,
}

impl ContentModifier {
    /// Open `path` for reading and a fresh temporary sibling for writing.
    pub fn open(path: &FsPath) -> FsResult<Self> {
        let reader = files::provider_of(path).new_input_stream(path, &[])?;
        let path_temp = _derive_temp_path(path)?;
        let writer = files::provider_of(&path_temp).new_output_stream(
            &path_temp,
            &[EnumOpenOption::CreateNew, EnumOpenOption::Write],
        )?;
        debug!(path = %path, temp = %path_temp, "content modification started");
        Ok(Self {
            path_target: path.clone(),
            path_temp,
            reader: Some(reader),
            writer: Some(writer),
            if_failed: false,
            if_committed: false,
        })
    }

    pub fn path(&self) -> &FsPath {
        &self.path_target
    }

    /// Temporary file receiving the new content.
    pub fn temp_path(&self) -> &FsPath {
        &self.path_temp
    }

    /// Replace the original with everything written so far.
    ///
    /// Fails with `ContentModification` when any read or write failed; the
    /// original is then left untouched.
    pub fn commit(mut self) -> FsResult<()> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take()
            && writer.flush().is_err()
        {
            self.if_failed = true;
        }
        if self.if_failed {
            return Err(FsError::ContentModification);
        }

        let res_move = match files::move_path(
            &self.path_temp,
            &self.path_target,
            &[EnumCopyOption::ReplaceExisting, EnumCopyOption::AtomicMove],
        ) {
            Err(FsError::UnsupportedOperation(_)) => files::move_path(
                &self.path_temp,
                &self.path_target,
                &[EnumCopyOption::ReplaceExisting],
            ),
            res => res,
        };
        if let Err(e) = res_move {
            return Err(FsError::RenameFailure {
                path: self.path_target.to_string(),
                source: Box::new(e),
            });
        }
        self.if_committed = true;
        debug!(path = %self.path_target, "content modification committed");
        Ok(())
    }

    fn _track<T>(&mut self, res: io::Result<T>) -> io::Result<T> {
        if res.is_err() {
            self.if_failed = true;
        }
        res
    }
}

impl Read for ContentModifier {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let res = match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        };
        self._track(res)
    }
}

impl Write for ContentModifier {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res = match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        };
        self._track(res)
    }

    fn flush(&mut self) -> io::Result<()> {
        let res = match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        };
        self._track(res)
    }
}

impl Drop for ContentModifier {
    fn drop(&mut self) {
        if self.if_committed {
            return;
        }
        self.reader = None;
        self.writer = None;
        if let Err(e) = files::delete_if_exists(&self.path_temp) {
            warn!(temp = %self.path_temp, error = %e, "failed to remove temporary file");
        }
    }
}
