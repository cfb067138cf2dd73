use super::cpath;
use std::io;
use std::mem::MaybeUninit;
use std::path::Path;

/// The value chown(2) treats as "leave this dimension alone".
const KEEP_ID: u32 = u32::MAX;

/// The four classes the rewrite distinguishes. Devices, fifos and
/// sockets all collapse into `Other`: counted, never rewritten, never
/// recursed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    RegularFile,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    #[inline]
    #[must_use]
    pub const fn from_mode(mode: libc::mode_t) -> Self {
        match mode & libc::S_IFMT {
            libc::S_IFREG => Self::RegularFile,
            libc::S_IFDIR => Self::Directory,
            libc::S_IFLNK => Self::Symlink,
            _ => Self::Other,
        }
    }

    /// Tag used in change records and dry-run lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RegularFile => "FILE",
            Self::Directory => "DIRECTORY",
            Self::Symlink => "SYMLINK",
            Self::Other => "OTHER",
        }
    }
}

/// lstat(2): never follows symlinks, which is exactly what a traversal
/// that rewrites link ownership needs.
pub fn lstat(path: &Path) -> io::Result<libc::stat> {
    let cstr = cpath(path)?;
    let mut st = MaybeUninit::<libc::stat>::uninit();
    let rc = unsafe { libc::lstat(cstr.as_ptr(), st.as_mut_ptr()) };
    if rc == 0 {
        Ok(unsafe { st.assume_init() })
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Change the owning user, preserving the group. `follow` selects
/// chown vs lchown; symlinks must use the latter or the target gets hit.
pub fn chown_uid(path: &Path, uid: libc::uid_t, follow: bool) -> io::Result<()> {
    chown_impl(path, uid, KEEP_ID, follow)
}

/// Change the owning group, preserving the user.
pub fn chown_gid(path: &Path, gid: libc::gid_t, follow: bool) -> io::Result<()> {
    chown_impl(path, KEEP_ID, gid, follow)
}

fn chown_impl(path: &Path, uid: libc::uid_t, gid: libc::gid_t, follow: bool) -> io::Result<()> {
    let cstr = cpath(path)?;
    let rc = unsafe {
        if follow {
            libc::chown(cstr.as_ptr(), uid, gid)
        } else {
            libc::lchown(cstr.as_ptr(), uid, gid)
        }
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
