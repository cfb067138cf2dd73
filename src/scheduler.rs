use crate::deque::{Deque, WorkItem};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Everything the scheduler mutex guards.
#[derive(Debug)]
struct SchedState {
    fast: Deque,
    slow: Deque,
    /// How many more items come off the fast queue before the next slow
    /// one is due.
    fast_credit: u64,
    /// Flips to false exactly once, at quiescence or on a shutdown
    /// request.
    notfinished: bool,
}

/// Lock-free view of the queues for the statistics reporter.
#[derive(Clone, Copy, Debug)]
pub struct QueueSnapshot {
    pub fast_len: usize,
    pub slow_len: usize,
    pub fast_speed: f64,
    pub slow_speed: f64,
    pub busy: usize,
}

/**
The shared work distributor: two deques (fast, slow), one mutex, one
condition variable.

Items donated by a fast-scanning worker tend to live on fast media and
vice versa, so dispatch is biased towards the fast queue by a credit
counter derived from the measured speed ratio, so the pool stays
saturated while slow subtrees still make steady progress.

Workers enter the mutex only to dispatch, hand work back, and release;
never across a system call. The busy count and per-queue gauges are
mirrored into relaxed atomics so the idle check and the stats thread
read them without contending on the lock.
*/
#[derive(Debug)]
pub struct Scheduler {
    state: Mutex<SchedState>,
    not_empty: Condvar,
    busy: AtomicUsize,
    running: AtomicBool,
    fast_len: AtomicUsize,
    slow_len: AtomicUsize,
    fast_speed: AtomicU64,
    slow_speed: AtomicU64,
    stack: bool,
    dual: bool,
}

impl Scheduler {
    /// `stack` selects LIFO splicing (depth-first), `dual` enables the
    /// fast/slow pair; with `dual` off everything goes through `fast`.
    #[must_use]
    pub fn new(stack: bool, dual: bool) -> Self {
        Self {
            state: Mutex::new(SchedState {
                fast: Deque::new(),
                slow: Deque::new(),
                fast_credit: 0,
                notfinished: true,
            }),
            not_empty: Condvar::new(),
            busy: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            fast_len: AtomicUsize::new(0),
            slow_len: AtomicUsize::new(0),
            fast_speed: AtomicU64::new(0),
            slow_speed: AtomicU64::new(0),
            stack,
            dual,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, st: &SchedState) {
        self.fast_len.store(st.fast.len(), Ordering::Relaxed);
        self.slow_len.store(st.slow.len(), Ordering::Relaxed);
        self.fast_speed.store(st.fast.speed.to_bits(), Ordering::Relaxed);
        self.slow_speed.store(st.slow.speed.to_bits(), Ordering::Relaxed);
    }

    /// Queue one item onto the fast deque; used to seed the roots
    /// before the workers start.
    pub fn seed(&self, item: WorkItem) {
        let mut st = self.lock();
        st.fast.push_back(item);
        self.publish(&st);
    }

    /**
    Hand one item to the calling worker, blocking while both shared
    deques are empty. Returns `None` only at shutdown.

    With credit left, the fast queue is served first; with credit
    exhausted the slow queue gets its turn and the credit is recomputed
    from the current speed ratio. Whenever a queue drains it inherits
    its sibling's speed so the ratio keeps meaning something.
    */
    pub fn dispatch(&self) -> Option<WorkItem> {
        let mut st = self.lock();
        while st.fast.is_empty() && st.slow.is_empty() && st.notfinished {
            st = self
                .not_empty
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if !st.notfinished {
            return None;
        }

        let item = if self.dual {
            Self::pick_dual(&mut st)
        } else {
            st.fast.pop_front()
        };

        if self.dual {
            if st.fast.is_empty() && st.slow.is_empty() {
                st.fast.speed = 0.;
                st.slow.speed = 0.;
            } else if st.fast.is_empty() {
                st.fast.speed = st.slow.speed;
            } else if st.slow.is_empty() {
                st.slow.speed = st.fast.speed;
            }
        }

        if item.is_some() {
            self.busy.fetch_add(1, Ordering::Relaxed);
        }
        self.publish(&st);
        item
    }

    fn pick_dual(st: &mut SchedState) -> Option<WorkItem> {
        if st.fast_credit > 0 {
            if let Some(item) = st.fast.pop_front() {
                st.fast_credit -= 1;
                return Some(item);
            }
            let item = st.slow.pop_front();
            if item.is_some() {
                st.fast_credit = credit_for(st.fast.speed, st.slow.speed);
            }
            item
        } else if let Some(item) = st.slow.pop_front() {
            st.fast_credit = credit_for(st.fast.speed, st.slow.speed);
            Some(item)
        } else {
            st.fast.pop_front()
        }
    }

    /**
    Donate a worker's private backlog. The caller keeps one item out to
    continue on and passes the rest here along with its measured scan
    rate (directories per second since its last handback epoch).

    The donation lands on the fast queue when the donor scans at or
    above the current mean of both queue speeds, otherwise on the slow
    queue; the chosen queue adopts the donor's rate. One waiter is woken
    per donated item.
    */
    pub fn handback(&self, donated: &mut Deque, scan_rate: f64) {
        let count = donated.len();
        if count == 0 {
            return;
        }
        {
            let mut st = self.lock();
            if self.dual {
                let mean = (st.fast.speed + st.slow.speed) / 2.;
                let target = if scan_rate >= mean {
                    &mut st.fast
                } else {
                    &mut st.slow
                };
                if self.stack {
                    target.splice_front(donated);
                } else {
                    target.splice_back(donated);
                }
                target.speed = scan_rate;
            } else if self.stack {
                st.fast.splice_front(donated);
            } else {
                st.fast.splice_back(donated);
            }
            self.publish(&st);
        }
        for _ in 0..count {
            self.not_empty.notify_one();
        }
    }

    /// Worker finished its current tile. The last busy worker facing two
    /// empty queues is the one that ends the run and wakes everyone.
    pub fn release(&self) {
        let mut st = self.lock();
        let remaining = self.busy.fetch_sub(1, Ordering::Relaxed) - 1;
        if remaining == 0 && st.fast.is_empty() && st.slow.is_empty() && st.notfinished {
            st.notfinished = false;
            self.running.store(false, Ordering::Relaxed);
            self.not_empty.notify_all();
        }
    }

    /// Orderly shutdown (signal path): waiting workers wake and exit,
    /// scanning workers finish their current tile first. Idempotent.
    pub fn request_shutdown(&self) {
        let mut st = self.lock();
        if st.notfinished {
            st.notfinished = false;
            self.running.store(false, Ordering::Relaxed);
            self.not_empty.notify_all();
        }
    }

    /// Approximate count of workers currently scanning; relaxed read,
    /// good enough for the idle check and the stats line.
    #[inline]
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            fast_len: self.fast_len.load(Ordering::Relaxed),
            slow_len: self.slow_len.load(Ordering::Relaxed),
            fast_speed: f64::from_bits(self.fast_speed.load(Ordering::Relaxed)),
            slow_speed: f64::from_bits(self.slow_speed.load(Ordering::Relaxed)),
            busy: self.busy.load(Ordering::Relaxed),
        }
    }

    #[inline]
    #[must_use]
    pub const fn stack_mode(&self) -> bool {
        self.stack
    }

    #[inline]
    #[must_use]
    pub const fn dual_mode(&self) -> bool {
        self.dual
    }
}

/// Fast-queue items served per slow item, from the measured speed
/// ratio. A zero slow speed yields zero credit rather than infinity.
fn credit_for(fast_speed: f64, slow_speed: f64) -> u64 {
    if slow_speed > 0. {
        (fast_speed / slow_speed).ceil() as u64
    } else {
        0
    }
}
