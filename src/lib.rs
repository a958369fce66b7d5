//! Zombie reaping for processes running as pid 1
//!
//! Inside a container the entrypoint usually ends up as pid 1, which makes it
//! the parent of every orphan in the pid namespace. Orphans that exit stay in
//! the process table as zombies until somebody waits for them. This crate is
//! that somebody:
//!
//! ```no_run
//! use grim_reaper::Scope;
//!
//! let scope = Scope::new();
//! let reaper = {
//!     let scope = scope.clone();
//!     std::thread::spawn(move || grim_reaper::reap(&scope))
//! };
//! // ... run the actual workload ...
//! scope.cancel();
//! let _ = reaper.join();
//! ```
//!
//! Two threads cooperate per reaper: a listener that traps `SIGCHLD` and
//! pushes notifications into a small queue (dropping them when it is full),
//! and a sweeper that on each notification calls `waitpid` until there are no
//! more children to collect. Every collected status is logged at debug level.
//!
//! Limitations:
//!
//! * `waitpid` is blocking and does not observe the scope. Without `WNOHANG`
//!   the sweeper stays in `waitpid` for as long as a matching child is alive,
//!   and only notices cancellation after that.
//! * With `enforce_pid1_check` turned off the reaper will also collect
//!   children that other code in the process (e.g. `std::process::Child`) is
//!   waiting for, so that code will see `ECHILD`.
//!
//! The library is tested only on linux

use std::sync::mpsc::sync_channel;
use std::thread::{self, JoinHandle};

use nix::sys::signal::Signal;
use nix::unistd::{getpid, Pid};

mod config;
mod error;
mod listener;
mod logger;
mod scope;
mod sweep;
pub mod trap;

#[cfg(test)]
mod test_utils;

pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::scope::{Scope, ScopeError};

use crate::listener::QUEUE_CAPACITY;
use crate::sweep::{Sweeper, Wait, Waitpid};
use crate::trap::Trap;

/// Reap any child, but only when running as pid 1
///
/// Blocks until the scope is done and returns its error. See `start`.
pub fn reap(scope: &Scope) -> Result<(), Error> {
    start(scope, Config::default())
}

/// Reap children with a specific configuration
///
/// Blocks the current thread until the scope is done; the result is then
/// always an error, normally `Error::Scope`. Fails right away with
/// `Error::NotPid1` when the pid 1 check is enforced and we are not pid 1.
pub fn start(scope: &Scope, config: Config) -> Result<(), Error> {
    start_with(scope, config, Waitpid)
}

/// Like `start`, but reaps on a background thread
///
/// The pid 1 check happens before the thread is started.
pub fn spawn(scope: &Scope, config: Config) -> Result<JoinHandle<Result<(), Error>>, Error> {
    let logger = prepare(&config)?;
    let scope = scope.clone();
    thread::Builder::new()
        .name("grim-reaper".into())
        .spawn(move || run(&scope, &config, logger, Waitpid))
        .map_err(Error::Spawn)
}

fn start_with<W: Wait>(scope: &Scope, config: Config, waiter: W) -> Result<(), Error> {
    let logger = prepare(&config)?;
    run(scope, &config, logger, waiter)
}

fn prepare(config: &Config) -> Result<slog::Logger, Error> {
    let logger = config
        .logger
        .clone()
        .unwrap_or_else(|| logger::default_logger(config.verbose));

    if config.enforce_pid1_check {
        let pid = getpid();
        if pid != Pid::from_raw(1) {
            return Err(Error::NotPid1(pid));
        }
    }
    Ok(logger)
}

fn run<W: Wait>(
    scope: &Scope,
    config: &Config,
    logger: slog::Logger,
    waiter: W,
) -> Result<(), Error> {
    let (queue_tx, queue_rx) = sync_channel(QUEUE_CAPACITY);
    let (ready_tx, ready_rx) = sync_channel(1);
    let listener = {
        let scope = scope.clone();
        let logger = logger.clone();
        thread::Builder::new()
            .name("sigchld-listener".into())
            .spawn(move || {
                // The trap masks SIGCHLD for this thread only, so it has to
                // be created here.
                let trap = match Trap::trap(&[Signal::SIGCHLD]) {
                    Ok(trap) => trap,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                listener::listen(&scope, trap, queue_tx, &logger);
            })
            .map_err(Error::Spawn)?
    };

    match ready_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let _ = listener.join();
            return Err(Error::Subscribe(err));
        }
        Err(_) => {
            let _ = listener.join();
            return Err(Error::ListenerExited);
        }
    }
    slog::debug!(logger, "starting reaper";
        "pid" => config.target_pid.as_raw(),
        "options" => config.wait_flags.bits(),
    );

    let err = Sweeper::new(waiter, config.target_pid, config.wait_flags, logger)
        .run(scope, &queue_rx);
    drop(queue_rx);
    // The listener notices the scope within its poll interval.
    let _ = listener.join();
    Err(err)
}
