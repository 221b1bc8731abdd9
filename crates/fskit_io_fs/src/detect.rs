//! Content-sniffing file type detection.

use std::io::Read;

use crate::conf::{
    BYTES_PNG_HEADER, BYTES_ZIP_EMPTY_HEADER, BYTES_ZIP_LOCAL_HEADER, C_MIME_PNG, C_MIME_ZIP,
};
use crate::error::{FsError, FsResult};
use crate::files;
use crate::path::FsPath;

/// Number of leading bytes handed to detectors.
const N_PROBE_BYTES: u64 = 16;

/// Guess a MIME type from the leading bytes of a file.
pub trait FileTypeDetector: Send + Sync {
    fn probe(&self, header: &[u8]) -> Option<&'static str>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PngFileTypeDetector;

impl FileTypeDetector for PngFileTypeDetector {
    fn probe(&self, header: &[u8]) -> Option<&'static str> {
        header.starts_with(&BYTES_PNG_HEADER).then_some(C_MIME_PNG)
    }
}

/// Matches both non-empty archives and the bare end-of-directory record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFileTypeDetector;

impl FileTypeDetector for ZipFileTypeDetector {
    fn probe(&self, header: &[u8]) -> Option<&'static str> {
        (header.starts_with(&BYTES_ZIP_LOCAL_HEADER) || header.starts_with(&BYTES_ZIP_EMPTY_HEADER))
            .then_some(C_MIME_ZIP)
    }
}

fn _read_header(path: &FsPath) -> FsResult<Vec<u8>> {
    let reader = files::provider_of(path).new_input_stream(path, &[])?;
    let mut header = Vec::new();
    reader
        .take(N_PROBE_BYTES)
        .read_to_end(&mut header)
        .map_err(|e| FsError::from_io(path.to_string(), e))?;
    Ok(header)
}

/// Run `detectors` in order on the leading bytes of `path`.
pub fn probe_with(
    path: &FsPath,
    detectors: &[&dyn FileTypeDetector],
) -> FsResult<Option<String>> {
    let header = _read_header(path)?;
    Ok(detectors
        .iter()
        .find_map(|detector| detector.probe(&header))
        .map(str::to_string))
}

/// MIME type of `path` by content, `None` when no detector matches.
pub fn probe_content_type(path: &FsPath) -> FsResult<Option<String>> {
    probe_with(path, &[&PngFileTypeDetector, &ZipFileTypeDetector])
}
