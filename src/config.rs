//! Reaper configuration

use nix::sys::wait::WaitPidFlag;
use nix::unistd::Pid;

/// What to reap and how
///
/// `Config::default()` is what `reap()` uses: wait for any child, no wait
/// flags, and only run when the current process is pid 1.
#[derive(Debug, Clone)]
pub struct Config {
    /// Passed to `waitpid` as is, so `-1` means any child, `0` any child in
    /// our process group and `< -1` any child in group `-pid`.
    pub target_pid: Pid,
    pub wait_flags: WaitPidFlag,
    /// Refuse to run unless we are pid 1. Turning this off makes the reaper
    /// collect children that other code in the process may be waiting for,
    /// so handle with care.
    pub enforce_pid1_check: bool,
    /// Log at debug level. Only used by the default logger.
    pub verbose: bool,
    /// Where to log. A JSON logger on stderr is built when unset.
    pub logger: Option<slog::Logger>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            target_pid: Pid::from_raw(-1),
            wait_flags: WaitPidFlag::empty(),
            enforce_pid1_check: true,
            verbose: false,
            logger: None,
        }
    }
}
