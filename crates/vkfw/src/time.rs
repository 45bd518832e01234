//! Time management utilities
//!
//! VKFW time is always microseconds on a monotonic clock. Relative waits use
//! [`NO_TIMEOUT`] for "block indefinitely"; absolute deadlines use `0` for
//! "already expired", which makes a deadline wait behave like a poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One second in VKFW time units
pub const SECONDS: u64 = 1_000_000;
/// One millisecond in VKFW time units
pub const MILLIS: u64 = 1_000;
/// One microsecond in VKFW time units
pub const MICROS: u64 = 1;
/// Relative timeout meaning "wait forever"
pub const NO_TIMEOUT: u64 = u64::MAX;

/// Monotonic microsecond clock with the ability to sleep
pub trait Clock {
    /// Current time in microseconds
    fn now(&self) -> u64;

    /// Sleep until the clock reaches `deadline`
    fn delay_until(&self, deadline: u64);

    /// Sleep for `duration` microseconds
    fn delay(&self, duration: u64) {
        self.delay_until(self.now().saturating_add(duration));
    }
}

/// Wall clock backed by [`Instant`]
///
/// Time zero is the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock starting at zero now
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn delay_until(&self, deadline: u64) {
        // sleep() may wake early, keep going until the deadline really passed
        loop {
            let now = self.now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(Duration::from_micros(deadline - now));
        }
    }

    fn delay(&self, duration: u64) {
        std::thread::sleep(Duration::from_micros(duration));
    }
}

/// Clock that only moves when told to
///
/// Delays complete instantly by jumping the clock forward, which makes wait
/// and deadline logic deterministic. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    /// Move the clock forward
    pub fn advance(&self, duration: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(duration)));
    }

    /// Set the clock; it never moves backwards
    pub fn set(&self, time: u64) {
        self.now.fetch_max(time, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn delay_until(&self, deadline: u64) {
        self.set(deadline);
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn delay_until(&self, deadline: u64) {
        (**self).delay_until(deadline);
    }

    fn delay(&self, duration: u64) {
        (**self).delay(duration);
    }
}

/// How an event retrieval call may block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EventMode {
    /// Never block
    Poll = 0,
    /// Block for at most a relative timeout
    Timeout = 1,
    /// Block until an absolute deadline
    Deadline = 2,
}

/// A blocking budget handed to a backend's event retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventWait {
    /// Return immediately
    Poll,
    /// Wait at most this many microseconds, [`NO_TIMEOUT`] for forever
    Timeout(u64),
    /// Wait until this absolute time, `u64::MAX` for forever
    Deadline(u64),
}

impl EventWait {
    /// Build a wait from a mode and its value; a zero value always polls
    pub const fn new(mode: EventMode, value: u64) -> Self {
        match mode {
            EventMode::Poll => Self::Poll,
            _ if value == 0 => Self::Poll,
            EventMode::Timeout => Self::Timeout(value),
            EventMode::Deadline => Self::Deadline(value),
        }
    }

    /// The mode this wait corresponds to
    pub const fn mode(self) -> EventMode {
        match self {
            Self::Poll => EventMode::Poll,
            Self::Timeout(_) => EventMode::Timeout,
            Self::Deadline(_) => EventMode::Deadline,
        }
    }

    /// Whether this wait never blocks
    pub const fn is_poll(self) -> bool {
        matches!(self, Self::Poll | Self::Timeout(0) | Self::Deadline(0))
    }

    /// Absolute deadline of the wait if it had started at `start`
    ///
    /// `None` means the wait has no end.
    pub const fn deadline(self, start: u64) -> Option<u64> {
        match self {
            Self::Poll => Some(start),
            Self::Timeout(NO_TIMEOUT) | Self::Deadline(u64::MAX) => None,
            Self::Timeout(t) => Some(start.saturating_add(t)),
            Self::Deadline(d) => Some(d),
        }
    }

    /// Microseconds left at `now`; `None` means forever
    pub const fn remaining(self, now: u64) -> Option<u64> {
        match self {
            Self::Poll => Some(0),
            Self::Timeout(NO_TIMEOUT) | Self::Deadline(u64::MAX) => None,
            Self::Timeout(t) => Some(t),
            Self::Deadline(d) => Some(d.saturating_sub(now)),
        }
    }

    /// The same budget re-expressed at `now` for a wait that began at `start`
    ///
    /// A relative timeout shrinks by the elapsed time; once the budget is
    /// spent the wait degrades to a poll.
    pub const fn rebase(self, start: u64, now: u64) -> Self {
        match self.deadline(start) {
            None => self,
            Some(deadline) if now >= deadline => Self::Poll,
            Some(deadline) => match self {
                Self::Timeout(_) => Self::Timeout(deadline - now),
                _ => self,
            },
        }
    }

    /// Remaining time as whole milliseconds for `poll(2)`-style APIs
    ///
    /// Rounds up so a wait never ends before its deadline. `None` means
    /// block indefinitely.
    pub fn poll_millis(self, now: u64) -> Option<u64> {
        self.remaining(now).map(|us| us.div_ceil(MILLIS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_delay_advances() {
        let clock = ManualClock::new(100);
        clock.delay(50);
        assert_eq!(clock.now(), 150);

        clock.delay_until(120);
        assert_eq!(clock.now(), 150, "clock must not move backwards");

        let shared = clock.clone();
        shared.advance(SECONDS);
        assert_eq!(clock.now(), 150 + SECONDS);
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new(10);
        clock.delay(NO_TIMEOUT);
        assert_eq!(clock.now(), u64::MAX);
    }

    #[test]
    fn test_monotonic_clock_delay() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        clock.delay(2 * MILLIS);
        assert!(clock.now() >= start + 2 * MILLIS);

        let target = clock.now() + MILLIS;
        clock.delay_until(target);
        assert!(clock.now() >= target);
    }

    #[test]
    fn test_zero_value_polls() {
        assert_eq!(EventWait::new(EventMode::Timeout, 0), EventWait::Poll);
        assert_eq!(EventWait::new(EventMode::Deadline, 0), EventWait::Poll);
        assert_eq!(EventWait::new(EventMode::Poll, 500), EventWait::Poll);
        assert_eq!(EventWait::new(EventMode::Timeout, 5), EventWait::Timeout(5));
    }

    #[test]
    fn test_deadline_and_remaining() {
        assert_eq!(EventWait::Timeout(300).deadline(1000), Some(1300));
        assert_eq!(EventWait::Deadline(700).deadline(1000), Some(700));
        assert_eq!(EventWait::Timeout(NO_TIMEOUT).deadline(1000), None);

        assert_eq!(EventWait::Deadline(1500).remaining(1000), Some(500));
        assert_eq!(EventWait::Deadline(500).remaining(1000), Some(0));
        assert_eq!(EventWait::Deadline(u64::MAX).remaining(1000), None);
    }

    #[test]
    fn test_rebase_shrinks_timeout() {
        let wait = EventWait::Timeout(1000);
        assert_eq!(wait.rebase(0, 400), EventWait::Timeout(600));
        assert_eq!(wait.rebase(0, 1000), EventWait::Poll);
        assert_eq!(EventWait::Deadline(800).rebase(0, 400), EventWait::Deadline(800));
        assert_eq!(EventWait::Deadline(800).rebase(0, 900), EventWait::Poll);
        assert_eq!(
            EventWait::Timeout(NO_TIMEOUT).rebase(0, 5 * SECONDS),
            EventWait::Timeout(NO_TIMEOUT)
        );
    }

    #[test]
    fn test_poll_millis_rounds_up() {
        assert_eq!(EventWait::Timeout(1).poll_millis(0), Some(1));
        assert_eq!(EventWait::Timeout(1000).poll_millis(0), Some(1));
        assert_eq!(EventWait::Timeout(1001).poll_millis(0), Some(2));
        assert_eq!(EventWait::Poll.poll_millis(0), Some(0));
        assert_eq!(EventWait::Timeout(NO_TIMEOUT).poll_millis(0), None);
    }
}
