use crate::config::{ExcludeSet, IdMap, MAX_THREADS, Settings};
use crate::deque::WorkItem;
use crate::error::{ChuidError, Result};
use crate::fs::{self, EntryKind};
use crate::hardlinks::HardlinkSet;
use crate::logger::Logger;
use crate::scheduler::Scheduler;
use crate::stats::{self, StatCounters, Totals};
use crate::worker::{Rewriter, Shared, Worker};
use std::mem::MaybeUninit;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Descriptors kept free for the std streams, the log file and config
/// files; workers may claim everything above that, one stream each.
pub const RESERVED_FDS: usize = 5;

/// Maximum open file descriptors for this process, 1024 when sysconf
/// won't say.
#[must_use]
pub fn max_open_files() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if n <= 0 { 1024 } else { n as usize }
}

/// Best-effort raise of the descriptor limit to the hard maximum.
pub fn raise_fd_limit() {
    let lim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let _ = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lim) };
}

/// Close any descriptor above the std trio inherited from the parent
/// and make sure 0..2 exist, reopened on /dev/null otherwise.
pub fn sanitize_descriptors() {
    let limit = max_open_files() as libc::c_int;
    for fd in 3..limit {
        unsafe { libc::close(fd) };
    }
    for fd in 0..3 {
        let mut st = MaybeUninit::<libc::stat>::uninit();
        if unsafe { libc::fstat(fd, st.as_mut_ptr()) } == -1 {
            let mode = if fd == 0 {
                libc::O_RDONLY
            } else {
                libc::O_WRONLY
            };
            let devnull = unsafe { libc::open(c"/dev/null".as_ptr(), mode) };
            if devnull != fd {
                // a process without usable std streams cannot even report
                std::process::abort();
            }
        }
    }
}

/// Clamp the requested worker count to the thread and descriptor
/// budget: hard cap at [`MAX_THREADS`], soft cap so that the pool plus
/// [`RESERVED_FDS`] fits under the fd limit.
pub fn effective_threads(requested: usize, verbose: bool) -> Result<usize> {
    if requested == 0 || requested > MAX_THREADS {
        return Err(ChuidError::Invalid(format!(
            "Number of threads: {requested}, allowed Number range: 1 >= # <= {MAX_THREADS}"
        )));
    }
    let max_fds = max_open_files();
    if max_fds.saturating_sub(requested) < RESERVED_FDS {
        let reduced = max_fds.saturating_sub(RESERVED_FDS).max(1);
        if verbose {
            println!("INFO: Due to file descriptor limit # of threads decreased to {reduced}!");
        }
        return Ok(reduced);
    }
    Ok(requested)
}

/**
Owns one complete scan: shared state construction, root seeding,
worker lifecycle and the optional statistics reporter.

The main thread seeds the fast queue with one work item per root,
starts the workers, and joins them. The scheduler's release path
guarantees exactly one worker flips the finished flag, so every join
returns.
*/
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    #[must_use]
    pub fn new(settings: Settings, idmap: IdMap, exclude: ExcludeSet, logger: Arc<Logger>) -> Self {
        let counters = (0..settings.threads).map(|_| StatCounters::default()).collect();
        let scheduler = Scheduler::new(!settings.queue_mode, !settings.single_queue);
        let shared = Arc::new(Shared {
            scheduler,
            hardlinks: HardlinkSet::new(),
            idmap,
            exclude,
            settings,
            logger,
            counters,
        });
        Self { shared }
    }

    /// Handle to the shared state, for the signal watcher.
    #[must_use]
    pub fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /**
    Seed the fast queue from the configured roots and rewrite the root
    directories themselves (children are handled by the workers, the
    root entry has no parent to do it).

    A root failing lstat logs a WARNING and is dropped; zero surviving
    roots is fatal. Returns the number seeded.
    */
    pub fn seed_roots(&self, roots: &[PathBuf]) -> Result<usize> {
        let mut rewriter = Rewriter::new(Arc::clone(&self.shared));
        let mut seeded = 0;
        for (index, root) in roots.iter().enumerate() {
            match fs::lstat(root) {
                Ok(st) => {
                    rewriter.rewrite(root, &st, EntryKind::from_mode(st.st_mode));
                    self.shared
                        .scheduler
                        .seed(WorkItem::new(root.clone(), index));
                    seeded += 1;
                }
                Err(err) => {
                    self.shared
                        .logger
                        .warning(&format!("couldn't stat <{}>: {err}", root.display()));
                }
            }
        }
        if seeded == 0 {
            return Err(ChuidError::Invalid(
                "No valid files systems to work on!".to_owned(),
            ));
        }
        Ok(seeded)
    }

    /// Run the scan to quiescence (or to a shutdown request) and return
    /// the counter totals.
    pub fn run(&self) -> Totals {
        let threads = self.shared.settings.threads;
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker = Worker::new(Arc::clone(&self.shared), index);
            let spawned = thread::Builder::new()
                .name(format!("chuid-worker-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    eprintln!("Worker thread {index} did not start!");
                    std::process::exit(err.raw_os_error().unwrap_or(1));
                }
            }
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let reporter = self
            .shared
            .settings
            .stats_interval
            .filter(|interval| *interval > 0)
            .map(|interval| {
                let shared = Arc::clone(&self.shared);
                thread::spawn(move || {
                    stats::report_loop(
                        &shared.scheduler,
                        &shared.counters,
                        interval,
                        shared.settings.threads,
                        &stop_rx,
                    );
                })
            });

        for handle in handles {
            let _ = handle.join();
        }
        // closing the channel wakes the reporter out of its tick sleep
        drop(stop_tx);
        if let Some(handle) = reporter {
            let _ = handle.join();
        }
        stats::totals(&self.shared.counters)
    }
}
