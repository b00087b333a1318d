//! Bounded, cancellable waiting on the host document.
//!
//! Every suspension in the agent goes through [`wait_for`] or
//! [`sleep_or_cancel`]: mutation observation is always raced against a
//! poll interval and a deadline, and every wait wakes up as soon as the run
//! that owns it is superseded.

use crate::platforms::DomEngine;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Found(T),
    TimedOut,
    Cancelled,
}

/// Re-evaluate `probe` until it yields a value, the timeout elapses or
/// `cancel` fires. Between probes the wait resumes early on a document
/// mutation when the engine exposes a mutation signal.
pub async fn wait_for<T, F>(
    engine: &dyn DomEngine,
    options: WaitOptions,
    cancel: &CancellationToken,
    mut probe: F,
) -> WaitOutcome<T>
where
    F: FnMut() -> Option<T>,
{
    let deadline = Instant::now() + options.timeout;
    let signal = engine.mutation_signal();
    let poll = options.poll_interval.max(Duration::from_millis(1));

    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        if let Some(value) = probe() {
            return WaitOutcome::Found(value);
        }
        let now = Instant::now();
        if now >= deadline {
            trace!(timeout = ?options.timeout, "wait_for deadline reached");
            return WaitOutcome::TimedOut;
        }
        let nap = poll.min(deadline - now);
        match &signal {
            Some(notify) => {
                let mutated = notify.notified();
                tokio::select! {
                    _ = mutated => {}
                    _ = tokio::time::sleep(nap) => {}
                    _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                }
            }
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(nap) => {}
                    _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                }
            }
        }
    }
}

/// Sleep for `duration`; returns `false` if `cancel` fired first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => !cancel.is_cancelled(),
        _ = cancel.cancelled() => false,
    }
}
