//! Trap for handling signals synchronously
//!
//! It works as follows:
//!
//! 1. You create a trap (`Trap::trap()`), that is RAII-style guard that masks
//!    out signals in the current thread and installs a recording handler for
//!    them process-wide
//! 2. Use trap as iterator yielding signals or `trap.wait(deadline)`
//!
//! A signal directed at the process is delivered to any thread that does not
//! block it. When it lands on the trapping thread it stays pending and is
//! picked up by `sigtimedwait`. When it lands elsewhere the handler bumps a
//! per-signal delivery counter, which every trap compares against the last
//! value it saw. Either way the trap reports it, and several traps for the
//! same signal (in different threads) each observe every delivery.
//!
//! Deliveries are coalesced: a burst of signals between two `wait()` calls
//! may be reported once.

use std::marker::PhantomData;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use libc::{self, c_int, timespec};
use nix::errno::Errno;
use nix::sys::signal::{pthread_sigmask, sigaction, SigmaskHow};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Upper bound on how long a single `sigtimedwait` sleeps before the
/// delivery counters are checked again.
const SLICE: Duration = Duration::from_millis(50);

const SIGNAL_SLOTS: usize = 65;

#[allow(clippy::declare_interior_mutable_const)]
const UNSEEN: AtomicUsize = AtomicUsize::new(0);

static DELIVERED: [AtomicUsize; SIGNAL_SLOTS] = [UNSEEN; SIGNAL_SLOTS];

static REGISTRY: Mutex<Vec<Registration>> = Mutex::new(Vec::new());

/// Process-wide handler installed for a signal, shared by all live traps
struct Registration {
    signal: Signal,
    users: usize,
    previous: SigAction,
}

/// A RAII guard for masking out signals and waiting for them synchronously
///
/// Old signal handlers (once the last trap for a signal is gone) and the
/// thread's signal mask are restored in `Drop` handler. Since the mask is per
/// thread, a trap must stay on the thread that created it.
pub struct Trap {
    oldset: SigSet,
    sigset: SigSet,
    signals: Vec<Signal>,
    seen: Vec<usize>,
    _thread_bound: PhantomData<*const ()>,
}

extern "C" fn record_handler(sig: c_int) {
    if let Some(count) = DELIVERED.get(sig as usize) {
        count.fetch_add(1, Ordering::SeqCst);
    }
}

fn delivered(signal: Signal) -> &'static AtomicUsize {
    &DELIVERED[signal as usize]
}

fn registry() -> MutexGuard<'static, Vec<Registration>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

fn register(registry: &mut Vec<Registration>, signal: Signal) -> nix::Result<()> {
    if let Some(reg) = registry.iter_mut().find(|r| r.signal == signal) {
        reg.users += 1;
        return Ok(());
    }
    // SA_RESTART keeps unrelated blocking calls in other threads from
    // failing with EINTR on every delivery.
    let action = SigAction::new(
        SigHandler::Handler(record_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let previous = unsafe { sigaction(signal, &action)? };
    registry.push(Registration {
        signal,
        users: 1,
        previous,
    });
    Ok(())
}

fn unregister(registry: &mut Vec<Registration>, signal: Signal) {
    let Some(pos) = registry.iter().position(|r| r.signal == signal) else {
        return;
    };
    registry[pos].users -= 1;
    if registry[pos].users == 0 {
        let reg = registry.swap_remove(pos);
        unsafe {
            let _ = sigaction(signal, &reg.previous);
        }
    }
}

impl Trap {
    /// Create and activate the signal trap for specified signals. Signals not
    /// in list will be delivered asynchronously as always.
    pub fn trap(signals: &[Signal]) -> nix::Result<Trap> {
        let mut sigset = SigSet::empty();
        for &sig in signals {
            sigset.add(sig);
        }

        {
            let mut registry = registry();
            for (idx, &sig) in signals.iter().enumerate() {
                if let Err(err) = register(&mut registry, sig) {
                    for &installed in &signals[..idx] {
                        unregister(&mut registry, installed);
                    }
                    return Err(err);
                }
            }
        }

        let mut oldset = SigSet::empty();
        if let Err(err) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&sigset), Some(&mut oldset)) {
            let mut registry = registry();
            for &sig in signals {
                unregister(&mut registry, sig);
            }
            return Err(err);
        }

        Ok(Trap {
            oldset,
            sigset,
            signals: signals.to_vec(),
            seen: signals
                .iter()
                .map(|&sig| delivered(sig).load(Ordering::SeqCst))
                .collect(),
            _thread_bound: PhantomData,
        })
    }

    /// Wait until any of signals arrived or deadline passes. In case of
    /// timeout returns None, otherwise returns the signal.
    ///
    /// Note the argument here is a deadline, not timeout. It's easier to work
    /// with deadline if you call wait() function in a loop. A deadline in the
    /// past just polls.
    pub fn wait(&mut self, deadline: Instant) -> Option<Signal> {
        loop {
            if let Some(sig) = self.take_recorded() {
                return Some(sig);
            }
            let timeout = deadline
                .saturating_duration_since(Instant::now())
                .min(SLICE);
            let tm = timespec {
                tv_sec: timeout.as_secs() as libc::time_t,
                tv_nsec: timeout.subsec_nanos() as _,
            };
            let sig = unsafe { libc::sigtimedwait(self.sigset.as_ref(), null_mut(), &tm) };
            if sig > 0 {
                match Signal::try_from(sig) {
                    Ok(signal) => return Some(self.record(signal)),
                    Err(_) => continue,
                }
            }
            match Errno::last() {
                Errno::EAGAIN => {
                    if Instant::now() >= deadline {
                        return self.take_recorded();
                    }
                }
                Errno::EINTR => continue,
                err => panic!("sigtimedwait error: {}", err),
            }
        }
    }

    /// Report a delivery observed by any thread since the last call
    fn take_recorded(&mut self) -> Option<Signal> {
        for (idx, &sig) in self.signals.iter().enumerate() {
            let current = delivered(sig).load(Ordering::SeqCst);
            if current != self.seen[idx] {
                self.seen[idx] = current;
                return Some(sig);
            }
        }
        None
    }

    /// A signal consumed by `sigtimedwait` never ran the handler, so count it
    /// here for the benefit of traps in other threads.
    fn record(&mut self, signal: Signal) -> Signal {
        let current = delivered(signal).fetch_add(1, Ordering::SeqCst) + 1;
        for (idx, &sig) in self.signals.iter().enumerate() {
            if sig == signal {
                self.seen[idx] = current;
            }
        }
        signal
    }
}

impl Iterator for Trap {
    type Item = Signal;
    fn next(&mut self) -> Option<Signal> {
        loop {
            if let Some(sig) = self.wait(Instant::now() + Duration::from_secs(3600)) {
                return Some(sig);
            }
        }
    }
}

impl Drop for Trap {
    fn drop(&mut self) {
        {
            let mut registry = registry();
            for &sig in &self.signals {
                unregister(&mut registry, sig);
            }
        }
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.oldset), None);
    }
}
