// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-shot timers over an abstract clock.
//!
//! Nothing here sleeps or spawns. A [`Scheduler`] only records deadlines; its owner polls
//! [`Scheduler::pop_due`] whenever it gets control, which makes behavior fully deterministic
//! under a [`VirtualClock`].

use core::cell::Cell;
use core::time::Duration;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

/// Source of monotonic time, measured from an arbitrary origin.
pub trait Clock {
    /// Returns the time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<Duration>,
}

impl VirtualClock {
    /// Creates a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(by));
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Wall clock backed by [`Instant`].
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Handle for cancelling a scheduled timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    deadline: Duration,
    seq: u64,
}

impl TimerHandle {
    /// Returns the instant at which the timer fires.
    #[must_use]
    pub fn deadline(self) -> Duration {
        self.deadline
    }
}

/// One-shot timer queue.
///
/// Timers with equal deadlines fire in the order they were scheduled. Timers are never retried
/// or rescheduled: a late poll simply fires them late.
#[derive(Debug)]
pub struct Scheduler<T, C> {
    clock: C,
    pending: BTreeMap<(Duration, u64), T>,
    next_seq: u64,
}

impl<T, C: Clock> Scheduler<T, C> {
    /// Creates an empty scheduler over `clock`.
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Returns the current time of the underlying clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Returns the underlying clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Schedules `timer` to fire at `deadline`.
    pub fn schedule_at(&mut self, deadline: Duration, timer: T) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert((deadline, seq), timer);
        TimerHandle { deadline, seq }
    }

    /// Schedules `timer` to fire `delay` after now.
    pub fn schedule_after(&mut self, delay: Duration, timer: T) -> TimerHandle {
        let deadline = self.now().saturating_add(delay);
        self.schedule_at(deadline, timer)
    }

    /// Cancels a pending timer, returning it if it had not fired yet.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        self.pending.remove(&(handle.deadline, handle.seq))
    }

    /// Removes and returns the earliest timer whose deadline has passed.
    pub fn pop_due(&mut self) -> Option<T> {
        let now = self.now();
        let entry = self.pending.first_entry()?;
        if entry.key().0 > now {
            return None;
        }
        Some(entry.remove())
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Returns the number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no timer is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending timer.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_deadline_then_schedule_order() {
        let clock = Rc::new(VirtualClock::new());
        let mut timers = Scheduler::new(Rc::clone(&clock));
        timers.schedule_after(Duration::from_millis(20), "late");
        timers.schedule_after(Duration::from_millis(10), "first");
        timers.schedule_after(Duration::from_millis(10), "second");

        assert_eq!(timers.pop_due(), None);
        clock.advance_ms(10);
        assert_eq!(timers.pop_due(), Some("first"));
        assert_eq!(timers.pop_due(), Some("second"));
        assert_eq!(timers.pop_due(), None);
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(20)));

        clock.advance_ms(100);
        assert_eq!(timers.pop_due(), Some("late"));
        assert!(timers.is_empty(), "all timers fired");
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let clock = VirtualClock::new();
        let mut timers = Scheduler::new(&clock);
        let keep = timers.schedule_after(Duration::from_millis(5), 1);
        let drop = timers.schedule_after(Duration::from_millis(5), 2);

        assert_eq!(timers.cancel(drop), Some(2));
        assert_eq!(timers.cancel(drop), None);
        assert_eq!(keep.deadline(), Duration::from_millis(5));

        clock.advance_ms(5);
        assert_eq!(timers.pop_due(), Some(1));
        assert_eq!(timers.pop_due(), None);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a, "time does not go backwards");
    }
}
