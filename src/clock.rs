//! Game clock
//!
//! The server's logical tick time in milliseconds since the server epoch.
//! Written once per server tick by the driver loop, read by everyone else.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of "current time" in milliseconds.
///
/// `GameClock` is the primary one. Timers may also carry a secondary source
/// for `GameTimer::time_until_elapsed`, which is kept for collaborators that
/// track their own time manager.
pub trait TimeSource: Send + Sync {
    fn current_time(&self) -> i64;
}

/// Monotonically non-decreasing tick counter.
#[derive(Debug)]
pub struct GameClock {
    current_tick: AtomicI64,
    /// Wall-clock moment tick 0 corresponds to
    epoch: DateTime<Utc>,
}

impl GameClock {
    /// Create a clock at tick 0 whose epoch is now.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a clock already at `tick`.
    pub fn starting_at(tick: i64) -> Self {
        Self {
            current_tick: AtomicI64::new(tick),
            epoch: Utc::now(),
        }
    }

    /// Latest stamped tick value
    #[inline]
    pub fn now(&self) -> i64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Move the clock forward by `delta` ms. Negative deltas are ignored.
    pub fn advance(&self, delta: i64) -> i64 {
        if delta < 0 {
            tracing::warn!("[clock] [advance] ignoring negative delta={}", delta);
            return self.now();
        }
        self.current_tick.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Set the clock to `tick` unless that would move it backwards.
    pub fn advance_to(&self, tick: i64) -> i64 {
        let prev = self.current_tick.fetch_max(tick, Ordering::AcqRel);
        if tick < prev {
            tracing::warn!(
                "[clock] [advance] refusing to go backwards: now={} requested={}",
                prev,
                tick
            );
            return prev;
        }
        tick
    }

    /// Wall-clock time of tick 0
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for GameClock {
    fn current_time(&self) -> i64 {
        self.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_starts_at_zero() {
        let clock = GameClock::new();
        assert_eq!(clock.now(), 0);
        assert!(clock.epoch() <= Utc::now());
    }

    #[test]
    fn test_advance() {
        let clock = GameClock::new();
        assert_eq!(clock.advance(10), 10);
        assert_eq!(clock.advance(15), 25);
        assert_eq!(clock.now(), 25);
    }

    #[test]
    fn test_negative_advance_ignored() {
        let clock = GameClock::starting_at(100);
        assert_eq!(clock.advance(-50), 100);
        assert_eq!(clock.now(), 100);
    }

    #[test]
    fn test_advance_to_never_goes_backwards() {
        let clock = GameClock::new();
        assert_eq!(clock.advance_to(500), 500);
        assert_eq!(clock.advance_to(400), 500);
        assert_eq!(clock.now(), 500);
        assert_eq!(clock.advance_to(500), 500);
        assert_eq!(clock.advance_to(501), 501);
    }

    #[test]
    fn test_time_source_impl() {
        let clock = GameClock::starting_at(42);
        let source: &dyn TimeSource = &clock;
        assert_eq!(source.current_time(), 42);
    }
}
