use std::time::Duration;
use tokio::time::Instant;

/// A single cancellable scheduled task.
///
/// Scheduling replaces whatever was pending, so at most one deadline
/// exists per slot. Owners poll the slot with the current time and act on
/// the payload it hands back.
#[derive(Debug)]
pub struct TimerSlot<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Default for TimerSlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> TimerSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending task (if any) and schedule `payload` after `delay`
    pub fn schedule(&mut self, now: Instant, delay: Duration, payload: T) {
        self.pending = Some((now + delay, payload));
    }

    /// Returns true if something was cancelled
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the payload if its deadline has passed
    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((at, _)) if *at <= now => self.pending.take().map(|(_, payload)| payload),
            _ => None,
        }
    }
}

/// Earliest of a set of optional deadlines
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}
