use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ChuidError>;

/// Errors that abort the whole run. Per-entry trouble during the scan
/// (lstat, opendir, readdir, chown) is logged at WARNING and skipped
/// instead, so it never surfaces here.
#[derive(Debug)]
pub enum ChuidError {
    /// A required input file could not be opened or read.
    Config { path: PathBuf, source: io::Error },
    /// A roots/exclude line exceeds the allowed name length.
    PathTooLong(String),
    /// The configuration parsed but is unusable (bad thread count, no
    /// valid roots, ...).
    Invalid(String),
    /// The log file could not be created.
    LogOpen { path: PathBuf, source: io::Error },
}

impl ChuidError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { source, .. } => source.raw_os_error().unwrap_or(libc::EINVAL),
            Self::PathTooLong(_) => libc::E2BIG,
            Self::Invalid(_) => libc::EINVAL,
            Self::LogOpen { source, .. } => source.raw_os_error().unwrap_or(libc::ENOSPC),
        }
    }
}

impl fmt::Display for ChuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { path, source } => {
                write!(f, "Can't open file <{}>: {source}", path.display())
            }
            Self::PathTooLong(line) => {
                write!(f, "Directory path <{line}> longer than allowed by system!")
            }
            Self::Invalid(msg) => f.write_str(msg),
            Self::LogOpen { path, source } => {
                write!(f, "Couldn't open log file <{}>: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ChuidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config { source, .. } | Self::LogOpen { source, .. } => Some(source),
            Self::PathTooLong(_) | Self::Invalid(_) => None,
        }
    }
}
