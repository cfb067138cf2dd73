use super::cpath;
use std::ffi::{CStr, OsString};
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::Path;
use std::ptr;

// readdir reports end-of-stream and failure identically (NULL), errno
// disambiguates; it must be cleared first.
fn clear_errno() {
    #[cfg(target_os = "linux")]
    unsafe {
        *libc::__errno_location() = 0;
    }
    #[cfg(target_os = "android")]
    unsafe {
        *libc::__errno() = 0;
    }
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd"
    ))]
    unsafe {
        *libc::__error() = 0;
    }
}

/**
Owned handle over a POSIX directory stream.

Wraps `opendir`/`readdir`/`telldir`/`seekdir`/`closedir`. The cursor
returned by [`DirStream::tell`] survives closing the stream: reopening
the same directory and seeking back resumes the listing, which is what
lets a [`crate::WorkItem`] park mid-directory during work handoff.

Each worker holds at most one stream at a time, so the process-wide
descriptor budget stays at one per worker.
*/
#[derive(Debug)]
pub struct DirStream {
    dp: *mut libc::DIR,
}

impl DirStream {
    pub fn open(path: &Path) -> io::Result<Self> {
        let cstr = cpath(path)?;
        let dp = unsafe { libc::opendir(cstr.as_ptr()) };
        if dp.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(Self { dp })
        }
    }

    /// Opaque position usable with [`DirStream::seek`] after reopening.
    #[must_use]
    pub fn tell(&self) -> libc::c_long {
        unsafe { libc::telldir(self.dp) }
    }

    pub fn seek(&mut self, pos: libc::c_long) {
        unsafe { libc::seekdir(self.dp, pos) }
    }

    /// Next entry name, with `.` and `..` filtered out. `Ok(None)` is a
    /// clean end of stream, `Err` carries the errno readdir left behind.
    pub fn next_entry(&mut self) -> io::Result<Option<OsString>> {
        loop {
            clear_errno();
            let entry = unsafe { libc::readdir(self.dp) };
            if entry.is_null() {
                let err = io::Error::last_os_error();
                return match err.raw_os_error() {
                    Some(0) | None => Ok(None),
                    Some(_) => Err(err),
                };
            }
            let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
            let bytes = name.to_bytes();
            if bytes == b"." || bytes == b".." {
                continue;
            }
            return Ok(Some(OsString::from_vec(bytes.to_vec())));
        }
    }

    /// Close explicitly to observe the closedir result; dropping the
    /// stream closes it too but swallows the error.
    pub fn close(mut self) -> io::Result<()> {
        let dp = self.dp;
        self.dp = ptr::null_mut();
        let rc = unsafe { libc::closedir(dp) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        if !self.dp.is_null() {
            unsafe { libc::closedir(self.dp) };
        }
    }
}
