//! Filesystem layer constants.

/// Largest integer accepted as a POSIX permission mode (`0o777`).
pub const N_INT_MODE_MAX: u32 = 0o777;
/// Number of permission bits in a POSIX mode.
pub const N_POSIX_PERMISSION_BITS: usize = 9;
/// Maximum number of symbolic links followed while resolving one path.
pub const N_SYMLINK_HOPS_MAX: usize = 40;

/// Default permissions of files created by the memory backend.
pub const N_MODE_FILE_DEFAULT: u32 = 0o644;
/// Default permissions of directories created by the memory backend.
pub const N_MODE_DIR_DEFAULT: u32 = 0o755;

/// Scheme of the host filesystem provider.
pub const C_SCHEME_HOST: &str = "file";
/// Scheme of the memory provider using the Unix path model.
pub const C_SCHEME_MEMORY: &str = "memory";
/// Scheme of the memory provider using the Windows path model.
pub const C_SCHEME_MEMORY_WINDOWS: &str = "memory-windows";

pub const C_MSG_RESOLVE_ABSOLUTE_NO_ROOT: &str = "path to resolve is absolute but has no root";
pub const C_MSG_RESOLVE_INCOMPATIBLE_ROOT: &str =
    "root of path to resolve is incompatible with source path";
pub const C_MSG_RESOLVE_RELATIVE_WITH_ROOT: &str = "path to resolve is not absolute but has a root";

/// Characters a Windows path name component must not contain.
pub const TUP_WINDOWS_ILLEGAL: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// Regex every `rwxrwxrwx` permission string must match.
pub const C_PATTERN_PERMISSION_STRING: &str = "^[r-][w-][x-][r-][w-][x-][r-][w-][x-]$";

/// Attribute views understood by every backend.
pub const C_ATTRIBUTE_VIEW_BASIC: &str = "basic";
pub const C_ATTRIBUTE_VIEW_POSIX: &str = "posix";
pub const C_ATTRIBUTE_VIEW_USER: &str = "user";

/// PNG signature.
pub const BYTES_PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// ZIP local file header signature.
pub const BYTES_ZIP_LOCAL_HEADER: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
/// ZIP end-of-central-directory signature (empty archive).
pub const BYTES_ZIP_EMPTY_HEADER: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

pub const C_MIME_PNG: &str = "image/png";
pub const C_MIME_ZIP: &str = "application/zip";
