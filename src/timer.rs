//! Cancellable one-shot timers over a caller-supplied clock.
//!
//! Nothing in here sleeps. Owners schedule events at `now + delay`, keep the
//! returned [`TimerId`] if they may need to cancel, and pull due events out
//! with [`TimerQueue::pop_due`] whenever their `advance(now)` is called. The
//! runtime loop feeds real elapsed time; tests feed whatever they like.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerQueue<E> {
    next_id: u64,
    // (deadline, id) orders ties by scheduling order.
    pending: BTreeMap<(Duration, u64), E>,
    deadlines: HashMap<u64, Duration>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, now: Duration, delay: Duration, event: E) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now + delay;
        self.pending.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        TimerId(id)
    }

    /// Cancels a pending timer. Returns its event if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<E> {
        let deadline = self.deadlines.remove(&id.0)?;
        self.pending.remove(&(deadline, id.0))
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id.0)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Removes and returns the earliest timer whose deadline is `<= now`.
    ///
    /// The deadline is returned alongside the event so re-armed intervals can
    /// be scheduled from the instant they were due rather than from `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, Duration, E)> {
        let key = *self.pending.keys().next()?;
        if key.0 > now {
            return None;
        }
        let event = self.pending.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((TimerId(key.1), key.0, event))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Earliest of two optional deadlines.
pub fn earliest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
