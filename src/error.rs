//! Error types returned by the reaper entrypoints

use nix::unistd::Pid;

use crate::scope::ScopeError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("grim reaper disabled, pid not 1 (running as pid {0})")]
    NotPid1(Pid),

    #[error("failed to subscribe to SIGCHLD: {0}")]
    Subscribe(#[source] nix::Error),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("signal listener exited unexpectedly")]
    ListenerExited,

    #[error(transparent)]
    Scope(#[from] ScopeError),
}
