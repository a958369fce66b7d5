//! Forwards SIGCHLD deliveries into the sweeper's notification queue

use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::{Duration, Instant};

use crate::scope::Scope;
use crate::trap::Trap;

/// Capacity of the notification queue between listener and sweeper
pub(crate) const QUEUE_CAPACITY: usize = 3;

/// How often the listener re-checks the scope while no signal arrives
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// "A child changed state". Which one is for the sweep to find out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    Dropped,
    Closed,
}

/// Non-blocking push of a notification
///
/// A full queue drops the notification on the floor. The sweeper waits for
/// every matching child on each wake-up, so nothing is lost but a wake-up.
pub(crate) fn notify(queue: &SyncSender<Notification>) -> Delivery {
    match queue.try_send(Notification) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => Delivery::Dropped,
        Err(TrySendError::Disconnected(_)) => Delivery::Closed,
    }
}

/// Run until the scope is done or the sweeper hangs up
///
/// The trap is dropped on return, which releases the subscription. Dropping
/// `queue` wakes a sweeper blocked on the other end.
pub(crate) fn listen(
    scope: &Scope,
    mut trap: Trap,
    queue: SyncSender<Notification>,
    logger: &slog::Logger,
) {
    while !scope.is_done() {
        let mut deadline = Instant::now() + POLL_INTERVAL;
        if let Some(scope_deadline) = scope.deadline() {
            deadline = deadline.min(scope_deadline);
        }
        if trap.wait(deadline).is_none() {
            continue;
        }
        if notify(&queue) == Delivery::Closed {
            break;
        }
    }
    slog::debug!(logger, "listener stopped");
}
