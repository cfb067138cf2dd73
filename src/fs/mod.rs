//! Thin owned wrappers over the POSIX calls the scan engine lives on:
//! directory streams with resumable cursors, lstat, and the two chown
//! variants. Nothing here takes locks or allocates beyond the path copy
//! a C string needs.

mod dir_stream;
mod meta;

pub use dir_stream::DirStream;
pub use meta::{EntryKind, chown_gid, chown_uid, lstat};

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// NUL-terminated copy of `path` for handing to libc.
pub(crate) fn cpath(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}
