use crate::worker::Shared;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

const SHUTDOWN_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGQUIT, libc::SIGTERM];

/// Records the first termination signal the watcher consumed.
#[derive(Debug)]
pub struct SignalState {
    caught: AtomicI32,
}

impl SignalState {
    /// The signal number, once one arrived.
    #[must_use]
    pub fn caught(&self) -> Option<libc::c_int> {
        match self.caught.load(Ordering::Relaxed) {
            0 => None,
            signo => Some(signo),
        }
    }
}

/**
Arm the orderly shutdown path.

SIGINT, SIGQUIT and SIGTERM are blocked in the calling thread before
anything else is spawned, so every later thread inherits the mask and
none of them can be interrupted mid-syscall. A dedicated watcher thread
sits in `sigwait`; the first delivery requests a scheduler shutdown,
which lets scanning workers finish their current directory and waiting
workers wake up and exit: bounded teardown instead of a torn tree.

The watcher parks in `sigwait` for the process lifetime when no signal
ever arrives; process exit reaps it.
*/
pub fn install(shared: &Arc<Shared>) -> Arc<SignalState> {
    let state = Arc::new(SignalState {
        caught: AtomicI32::new(0),
    });

    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        for sig in SHUTDOWN_SIGNALS {
            libc::sigaddset(set.as_mut_ptr(), sig);
        }
    }
    let set = unsafe { set.assume_init() };
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }

    let shared = Arc::clone(shared);
    let watcher_state = Arc::clone(&state);
    thread::spawn(move || {
        let mut signo: libc::c_int = 0;
        if unsafe { libc::sigwait(&set, &mut signo) } == 0 {
            watcher_state.caught.store(signo, Ordering::Relaxed);
            shared.scheduler.request_shutdown();
        }
    });
    state
}

/// strsignal-style name for the shutdown signals.
#[must_use]
pub fn signal_name(signo: libc::c_int) -> &'static str {
    match signo {
        libc::SIGINT => "Interrupt",
        libc::SIGQUIT => "Quit",
        libc::SIGTERM => "Terminated",
        _ => "Unknown signal",
    }
}
