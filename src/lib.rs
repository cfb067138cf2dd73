#![allow(clippy::inline_always)]
//! chuid: parallel, in-place uid/gid rewriting across filesystem trees.
//!
//! A fixed pool of worker threads cooperatively traverses disjoint
//! subtrees, rebalancing work through two shared deques (a fast and a
//! slow source, picked by measured scan rate), deduplicating hardlinked
//! files through a shared inode set, and applying the configured
//! old→new uid/gid mappings to every file, symlink and directory it
//! reaches. See the module docs on [`Scheduler`] and [`Worker`] for the
//! scheduling discipline and the worker state machine.

mod config;
mod deque;
mod error;
pub mod fs;
mod hardlinks;
mod logger;
mod names;
mod pool;
mod scheduler;
pub mod signals;
mod stats;
mod worker;

#[cfg(test)]
mod test;

pub use config::{
    DEFAULT_BUSY_THRESHOLD, DEFAULT_THREADS, ExcludeSet, IdMap, MAX_THREADS, Settings, parse_roots,
};
pub use deque::{Deque, WorkItem};
pub use error::{ChuidError, Result};
pub use hardlinks::HardlinkSet;
pub use logger::{LOG_FILE_NAME, Level, Logger};
pub use pool::{
    Engine, RESERVED_FDS, effective_threads, max_open_files, raise_fd_limit, sanitize_descriptors,
};
pub use scheduler::{QueueSnapshot, Scheduler};
pub use stats::{StatCounters, Totals, totals};
pub use worker::{Shared, Worker};

// this allocator is noticeably quicker than glibc's for the pathname
// churn a scan produces
#[cfg(all(
    feature = "mimalloc",
    any(target_os = "linux", target_os = "macos", target_os = "android")
))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;
