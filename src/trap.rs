//! Trap for handling signals without losing them
//!
//! It works as follows:
//!
//! 1. You create a trap (`Trap::install()`), that is RAII-style guard that
//!    masks out *all* signals and installs a counting handler for the four
//!    signals a supervisor cares about: `SIGCHLD`, `SIGALRM`, `SIGTERM` and
//!    `SIGINT`
//! 2. Call `trap.wait()`, which unmasks exactly those four signals for the
//!    duration of the wait and blocks until one of them arrives or the
//!    control socket becomes readable
//! 3. Call `trap.take()` to drain everything that arrived
//!
//! The handler only touches atomics. Everything else happens after `wait()`
//! returns, on the thread that called it.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use libc::c_int;
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SigAction, Signal, SigSet, SaFlags};
use nix::sys::signal::{pthread_sigmask, SigmaskHow, SigHandler};

use crate::ffi;

/// The signals the trap handles. Everything else stays blocked.
pub const TRAPPED: [Signal; 4] = [
    Signal::SIGCHLD,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGINT,
];

static PENDING: PendingSignals = PendingSignals::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Counters written from the signal handler and drained by the event loop
#[derive(Debug)]
pub struct PendingSignals {
    child_exited: AtomicUsize,
    alarm: AtomicBool,
    terminate: AtomicBool,
    interrupt: AtomicBool,
}

/// What arrived since the last `take()`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvents {
    /// Number of `SIGCHLD` deliveries. Several exits may be folded into one
    /// delivery, so this only says "reap until there is nothing left".
    pub child_exited: usize,
    pub alarm: bool,
    pub terminate: bool,
    pub interrupt: bool,
}

impl SignalEvents {
    pub fn is_empty(&self) -> bool {
        *self == SignalEvents::default()
    }
}

impl PendingSignals {
    pub const fn new() -> PendingSignals {
        PendingSignals {
            child_exited: AtomicUsize::new(0),
            alarm: AtomicBool::new(false),
            terminate: AtomicBool::new(false),
            interrupt: AtomicBool::new(false),
        }
    }

    /// Note a delivery of `signum`. Async-signal-safe.
    pub fn record(&self, signum: c_int) {
        match signum {
            libc::SIGCHLD => {
                self.child_exited.fetch_add(1, Ordering::SeqCst);
            }
            libc::SIGALRM => self.alarm.store(true, Ordering::SeqCst),
            libc::SIGTERM => self.terminate.store(true, Ordering::SeqCst),
            libc::SIGINT => self.interrupt.store(true, Ordering::SeqCst),
            _ => {}
        }
    }

    /// Reset all counters, returning their previous values.
    pub fn take(&self) -> SignalEvents {
        SignalEvents {
            child_exited: self.child_exited.swap(0, Ordering::SeqCst),
            alarm: self.alarm.swap(false, Ordering::SeqCst),
            terminate: self.terminate.swap(false, Ordering::SeqCst),
            interrupt: self.interrupt.swap(false, Ordering::SeqCst),
        }
    }
}

extern "C" fn record_signal(signum: c_int) {
    PENDING.record(signum);
}

/// Why `Trap::wait` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// One of the trapped signals was delivered
    Signal,
    /// The descriptor passed to `wait` is readable
    Readable,
    /// The timeout passed to `wait` expired
    Timeout,
}

/// A RAII guard for masking out signals and waiting for them safely
///
/// Only one trap may exist in a process at a time, since the handler state
/// is process-wide. Old signal handlers and the old signal mask are
/// restored in `Drop` handler.
pub struct Trap {
    oldset: SigSet,
    oldsigs: Vec<(Signal, SigAction)>,
    waitmask: SigSet,
    pending: &'static PendingSignals,
}

impl Trap {
    /// Block all signals and install the counting handler for `TRAPPED`.
    pub fn install() -> nix::Result<Trap> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(Errno::EBUSY);
        }
        let mut oldset = SigSet::empty();
        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK,
                                        Some(&SigSet::all()),
                                        Some(&mut oldset))
        {
            INSTALLED.store(false, Ordering::SeqCst);
            return Err(e);
        }
        // Anything left over from a previous trap is stale
        PENDING.take();
        let mut trap = Trap {
            oldset: oldset,
            oldsigs: Vec::with_capacity(TRAPPED.len()),
            waitmask: SigSet::all(),
            pending: &PENDING,
        };
        let action = SigAction::new(SigHandler::Handler(record_signal),
                                    SaFlags::SA_NOCLDSTOP, SigSet::empty());
        for &sig in TRAPPED.iter() {
            // Dropping the partial trap restores what was replaced so far
            let old = unsafe { sigaction(sig, &action)? };
            trap.oldsigs.push((sig, old));
            trap.waitmask.remove(sig);
        }
        Ok(trap)
    }

    /// The mask in effect while waiting: everything except `TRAPPED`.
    pub fn wait_mask(&self) -> &SigSet {
        &self.waitmask
    }

    /// Block until a trapped signal arrives, `fd` becomes readable, or
    /// `timeout` expires. `None` for timeout waits forever.
    ///
    /// Signals that arrive while the trap is not waiting stay pending and
    /// interrupt the next wait immediately, so nothing is lost between
    /// `take()` and `wait()`.
    pub fn wait(&self, fd: Option<RawFd>, timeout: Option<Duration>)
        -> nix::Result<Wakeup>
    {
        match ffi::pselect(fd, timeout, &self.waitmask) {
            Ok(true) => Ok(Wakeup::Readable),
            Ok(false) => Ok(Wakeup::Timeout),
            Err(Errno::EINTR) => Ok(Wakeup::Signal),
            Err(e) => Err(e),
        }
    }

    /// Drain the pending signal counters.
    pub fn take(&self) -> SignalEvents {
        self.pending.take()
    }
}

impl Drop for Trap {
    fn drop(&mut self) {
        // Mask first: whatever is still pending gets delivered to the
        // counting handler, not to a default one that would kill us
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK,
                                Some(&self.oldset), None);
        unsafe {
            for &(sig, ref sigact) in self.oldsigs.iter() {
                let _ = sigaction(sig, sigact);
            }
        }
        INSTALLED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_exits_are_counted() {
        let pending = PendingSignals::new();
        pending.record(libc::SIGCHLD);
        pending.record(libc::SIGCHLD);
        pending.record(libc::SIGCHLD);
        let events = pending.take();
        assert_eq!(events.child_exited, 3);
        assert!(!events.alarm && !events.terminate && !events.interrupt);
    }

    #[test]
    fn flags_are_single_shot() {
        let pending = PendingSignals::new();
        pending.record(libc::SIGTERM);
        pending.record(libc::SIGTERM);
        pending.record(libc::SIGALRM);
        assert_eq!(pending.take(), SignalEvents {
            child_exited: 0,
            alarm: true,
            terminate: true,
            interrupt: false,
        });
    }

    #[test]
    fn take_drains() {
        let pending = PendingSignals::new();
        pending.record(libc::SIGINT);
        pending.record(libc::SIGCHLD);
        assert!(!pending.take().is_empty());
        assert!(pending.take().is_empty());
    }

    #[test]
    fn trap_wakes_on_signal_and_times_out() {
        let trap = Trap::install().unwrap();
        assert!(matches!(Trap::install(), Err(Errno::EBUSY)));
        assert!(!trap.wait_mask().contains(Signal::SIGCHLD));
        assert!(trap.wait_mask().contains(Signal::SIGHUP));

        let wakeup = trap.wait(None, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(wakeup, Wakeup::Timeout);

        // Blocked, so it stays pending on this thread until the wait
        nix::sys::signal::raise(Signal::SIGINT).unwrap();
        let wakeup = trap.wait(None, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(wakeup, Wakeup::Signal);
        assert!(trap.take().interrupt);
    }

    #[test]
    fn untrapped_signals_are_ignored() {
        let pending = PendingSignals::new();
        pending.record(libc::SIGHUP);
        pending.record(libc::SIGUSR1);
        assert!(pending.take().is_empty());
    }
}
