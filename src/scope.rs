//! Cancellation scope shared by the listener and the sweeper
//!
//! A `Scope` is a cheap, cloneable handle. It becomes *done* either when
//! somebody calls `cancel()` on any clone, or when its deadline (if it has
//! one) passes. Once done it stays done.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Why a scope is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope cancelled")]
    Cancelled,

    #[error("scope deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    cond: Condvar,
    deadline: Option<Instant>,
}

impl Scope {
    /// A scope that is only done once cancelled
    pub fn new() -> Scope {
        Scope::default()
    }

    /// A scope that is done at `deadline` at the latest
    pub fn with_deadline(deadline: Instant) -> Scope {
        Scope {
            inner: Arc::new(Inner {
                deadline: Some(deadline),
                ..Inner::default()
            }),
        }
    }

    /// A scope that is done `timeout` from now at the latest
    pub fn with_timeout(timeout: Duration) -> Scope {
        Scope::with_deadline(Instant::now() + timeout)
    }

    /// The deadline, if the scope was created with one
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Mark the scope done. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        *cancelled = true;
        self.inner.cond.notify_all();
    }

    /// Returns the reason the scope is done, or `None` while it is live
    ///
    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<ScopeError> {
        self.check(&self.lock())
    }

    /// Whether the scope is cancelled or past its deadline
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Block the current thread until the scope is done
    pub fn wait(&self) -> ScopeError {
        let mut cancelled = self.lock();
        loop {
            if let Some(err) = self.check(&cancelled) {
                return err;
            }
            cancelled = match self.inner.deadline {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    self.inner
                        .cond
                        .wait_timeout(cancelled, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .cond
                    .wait(cancelled)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn check(&self, cancelled: &bool) -> Option<ScopeError> {
        if *cancelled {
            return Some(ScopeError::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ScopeError::DeadlineExceeded),
            _ => None,
        }
    }

    // Nothing panics while holding the lock, but don't turn a poisoned
    // flag into a second panic either.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
