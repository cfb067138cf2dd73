use crate::error::{ChuidError, Result};
use chrono::Local;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// File created below the configured log directory.
pub const LOG_FILE_NAME: &str = "chuid_log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}

/**
Thread-safe append sink for the run log.

One record per call, `<weekday mon day HH:MM:SS YYYY> <LEVEL>: <message>`.
All workers share one `Logger` behind an `Arc`; the internal mutex keeps
records whole. Stdout is never written here, it belongs to the verbose
and dry-run output.
*/
#[derive(Debug)]
pub struct Logger {
    sink: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl Logger {
    /// Create (truncate) `<logdir>/chuid_log`.
    pub fn open(logdir: &Path) -> Result<Self> {
        let path = logdir.join(LOG_FILE_NAME);
        let file = File::create(&path).map_err(|source| ChuidError::LogOpen {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            sink: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Append one record. Losing the log target mid-run leaves no usable
    /// audit trail, so a failed write terminates the process with ENOSPC.
    pub fn log(&self, level: Level, msg: &str) {
        let stamp = Local::now().format("%a %b %d %H:%M:%S %Y");
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writeln!(sink, "{stamp} {level}: {msg}").and_then(|()| sink.flush());
        if let Err(err) = written {
            eprintln!(
                "ERROR: Problems writing logfile <{}>: {err}",
                self.path.display()
            );
            std::process::exit(libc::ENOSPC);
        }
    }

    pub fn info(&self, msg: &str) {
        self.log(Level::Info, msg);
    }

    pub fn warning(&self, msg: &str) {
        self.log(Level::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(Level::Error, msg);
    }

    /// Path of the log file, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
