use crate::logger::Logger;
use std::ffi::CStr;
use std::io;
use std::mem::MaybeUninit;
use std::ptr;

// sysconf may legitimately answer -1 ("no limit"); 20KB covers every
// real passwd/group record.
const FALLBACK_BUFFER: usize = 20480;

fn sysconf_size(name: libc::c_int) -> usize {
    let sz = unsafe { libc::sysconf(name) };
    if sz <= 0 { FALLBACK_BUFFER } else { sz as usize }
}

/// Scratch space for the reentrant passwd/group lookups, sized once per
/// worker from the system maxima.
#[derive(Debug)]
pub struct NameBuffers {
    pwd: Vec<u8>,
    grp: Vec<u8>,
}

impl NameBuffers {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pwd: vec![0; sysconf_size(libc::_SC_GETPW_R_SIZE_MAX)],
            grp: vec![0; sysconf_size(libc::_SC_GETGR_R_SIZE_MAX)],
        }
    }
}

impl Default for NameBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/**
Resolve a uid to its account name for log and dry-run lines.

A uid with no passwd entry renders as the numeric id (right-aligned to
seven columns); a failing lookup logs a WARNING and renders `-1`, the
scan itself is never disturbed by name resolution.
*/
pub fn user_name(uid: libc::uid_t, buffers: &mut NameBuffers, logger: &Logger) -> String {
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut found: *mut libc::passwd = ptr::null_mut();
    let rc = unsafe {
        libc::getpwuid_r(
            uid,
            pwd.as_mut_ptr(),
            buffers.pwd.as_mut_ptr().cast::<libc::c_char>(),
            buffers.pwd.len(),
            &mut found,
        )
    };
    if rc == 0 && !found.is_null() {
        let name = unsafe { CStr::from_ptr((*found).pw_name) };
        name.to_string_lossy().into_owned()
    } else if rc == 0 {
        format!("{uid:7}")
    } else {
        logger.warning(&format!(
            "getpwuid_r failed: {}",
            io::Error::from_raw_os_error(rc)
        ));
        "-1".to_owned()
    }
}

/// Resolve a gid to its group name; same fallback rules as [`user_name`].
pub fn group_name(gid: libc::gid_t, buffers: &mut NameBuffers, logger: &Logger) -> String {
    let mut grp = MaybeUninit::<libc::group>::uninit();
    let mut found: *mut libc::group = ptr::null_mut();
    let rc = unsafe {
        libc::getgrgid_r(
            gid,
            grp.as_mut_ptr(),
            buffers.grp.as_mut_ptr().cast::<libc::c_char>(),
            buffers.grp.len(),
            &mut found,
        )
    };
    if rc == 0 && !found.is_null() {
        let name = unsafe { CStr::from_ptr((*found).gr_name) };
        name.to_string_lossy().into_owned()
    } else if rc == 0 {
        format!("{gid:7}")
    } else {
        logger.warning(&format!(
            "getgrgid_r failed: {}",
            io::Error::from_raw_os_error(rc)
        ));
        "-1".to_owned()
    }
}
