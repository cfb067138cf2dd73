use crate::scheduler::Scheduler;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-worker progress counters. Each worker increments its own slot
/// only; the reporter sums them with relaxed loads, so totals are
/// eventually consistent, which is all a progress line needs.
#[derive(Debug, Default)]
pub struct StatCounters {
    pub files: AtomicU64,
    pub dirs: AtomicU64,
    pub links: AtomicU64,
    pub others: AtomicU64,
}

/// Aggregated counter totals at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub files: u64,
    pub dirs: u64,
    pub links: u64,
    pub others: u64,
}

/// Sum every worker's counters, relaxed.
#[must_use]
pub fn totals(counters: &[StatCounters]) -> Totals {
    let mut sum = Totals::default();
    for c in counters {
        sum.files += c.files.load(Ordering::Relaxed);
        sum.dirs += c.dirs.load(Ordering::Relaxed);
        sum.links += c.links.load(Ordering::Relaxed);
        sum.others += c.others.load(Ordering::Relaxed);
    }
    sum
}

/**
Body of the statistics reporter thread.

Prints one progress line per interval: busy workers, file total, the
per-second rates since the previous tick, and both shared queues'
element counts and speeds. Reads only relaxed snapshots; the reporter
never takes the scheduler mutex, so it cannot stall the scan.

Returns when the engine goes quiescent or the shutdown channel closes;
a final bare newline closes the table.
*/
pub fn report_loop(
    scheduler: &Scheduler,
    counters: &[StatCounters],
    interval: u64,
    threads: usize,
    shutdown: &Receiver<()>,
) {
    if scheduler.dual_mode() {
        println!(
            "\nThreads busy      files   files/s directories/s links/s elements fast-q Speed slow-q Speed\n"
        );
    } else {
        println!("\nThreads busy      files   files/s directories/s links/s queue elements\n");
    }

    let secs = interval.max(1);
    let tick = Duration::from_secs(secs);
    let mut prev = Totals::default();
    loop {
        match shutdown.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if !scheduler.is_running() {
            break;
        }
        let now = totals(counters);
        let fscanrate = (now.files - prev.files) / secs;
        let dscanrate = (now.dirs - prev.dirs) / secs;
        let lscanrate = (now.links - prev.links) / secs;
        prev = now;

        let snap = scheduler.snapshot();
        if scheduler.dual_mode() {
            println!(
                "{threads:7} {busy:4} {files:10} {fscanrate:7} {dscanrate:13} {lscanrate:7} {flen:15} {fspeed:5.1} {slen:6} {sspeed:5.1}",
                busy = snap.busy,
                files = now.files,
                flen = snap.fast_len,
                fspeed = snap.fast_speed,
                slen = snap.slow_len,
                sspeed = snap.slow_speed,
            );
        } else {
            println!(
                "{threads:7} {busy:4} {files:10} {fscanrate:7} {dscanrate:13} {lscanrate:7} {flen:14}",
                busy = snap.busy,
                files = now.files,
                flen = snap.fast_len,
            );
        }
    }
    println!();
}
