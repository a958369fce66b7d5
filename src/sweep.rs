//! The reaping loop
//!
//! Signals coalesce before delivery and the notification queue drops on
//! saturation, so one wake-up may stand for any number of exited children.
//! Each wake-up therefore waits in a loop until the kernel reports there is
//! nothing left to collect.
//!
//! `waitpid` is a plain blocking call and the cancellation scope cannot
//! interrupt it. With no `WNOHANG` in the flags a sweep keeps blocking for as
//! long as a matching child is alive, and the scope is only looked at again
//! after the sweep ends.

use std::sync::mpsc::Receiver;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::Error;
use crate::listener::Notification;
use crate::scope::Scope;

/// The wait-for-child-state-change call
pub(crate) trait Wait {
    fn wait(&mut self, pid: Pid, flags: WaitPidFlag) -> nix::Result<WaitStatus>;
}

/// `waitpid(2)`
pub(crate) struct Waitpid;

impl Wait for Waitpid {
    fn wait(&mut self, pid: Pid, flags: WaitPidFlag) -> nix::Result<WaitStatus> {
        waitpid(pid, Some(flags))
    }
}

pub(crate) struct Sweeper<W> {
    waiter: W,
    pid: Pid,
    flags: WaitPidFlag,
    logger: slog::Logger,
}

impl<W: Wait> Sweeper<W> {
    pub(crate) fn new(waiter: W, pid: Pid, flags: WaitPidFlag, logger: slog::Logger) -> Self {
        Sweeper {
            waiter,
            pid,
            flags,
            logger,
        }
    }

    /// Sweep once at startup, then once per notification, until the scope
    /// is done. Only ever returns an error.
    pub(crate) fn run(&mut self, scope: &Scope, queue: &Receiver<Notification>) -> Error {
        // A done scope gets no sweep at all, not even a blocking startup one.
        if let Some(err) = scope.err() {
            return err.into();
        }
        // Children that exited before the subscription existed never
        // produced a notification we could see.
        self.sweep();

        loop {
            if let Some(err) = scope.err() {
                return err.into();
            }
            if queue.recv().is_err() {
                return match scope.err() {
                    Some(err) => err.into(),
                    None => Error::ListenerExited,
                };
            }
            // The listener may slip one more in after cancellation.
            if let Some(err) = scope.err() {
                return err.into();
            }
            slog::debug!(self.logger, "received signal"; "signal" => "SIGCHLD");
            self.sweep();
        }
    }

    /// Collect every child that has changed state, returns how many
    pub(crate) fn sweep(&mut self) -> usize {
        let mut reaped = 0;
        loop {
            let status = match self.wait() {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => status,
                Err(Errno::ECHILD) => break,
                Err(err) => {
                    slog::error!(self.logger, "wait failed";
                        "err" => %err,
                        "pid" => self.pid.as_raw(),
                    );
                    break;
                }
            };
            slog::debug!(self.logger, "clean up";
                "pid" => status.pid().map(Pid::as_raw),
                "wstatus" => ?status,
            );
            reaped += 1;
        }
        reaped
    }

    fn wait(&mut self) -> nix::Result<WaitStatus> {
        loop {
            match self.waiter.wait(self.pid, self.flags) {
                Err(Errno::EINTR) => continue,
                res => return res,
            }
        }
    }
}
