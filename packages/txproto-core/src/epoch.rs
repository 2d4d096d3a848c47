//! Epoch Clock — the single shared time reference a [`crate::context`] hands
//! to every component so timestamps compare across the whole graph.
//!
//! There is one clock per main context, not a process-wide global: two
//! independently constructed contexts (as in the test suite, or two
//! pipelines in one process) must not see each other's time.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// How [`EpochClock::now`] derives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochMode {
    /// `now()` tracks wall-clock time (approximated from a process-start
    /// monotonic reading, never re-sampled) plus the stored offset. Used
    /// when the graph should track real time, e.g. live capture.
    System,
    /// `now()` returns `monotonic_now() + offset`. The caller (normally the
    /// main context's tick loop) advances the offset explicitly. Used for
    /// deterministic/offline processing where wall-clock drift would be
    /// wrong.
    Offset,
}

impl EpochMode {
    const fn as_u8(self) -> u8 {
        match self {
            EpochMode::System => 0,
            EpochMode::Offset => 1,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => EpochMode::System,
            _ => EpochMode::Offset,
        }
    }
}

/// A microsecond-resolution clock shared by every component under one
/// main context.
///
/// `monotonic_now` is derived from a single `Instant` captured at
/// construction, never from a fresh `SystemTime::now()` read — the latter
/// can jump backward (NTP step, clock adjustment) and would violate the
/// "epoch never goes backwards" invariant every component relies on to
/// order timestamps. `System` mode still tracks wall-clock time: it
/// samples `SystemTime::now()` once, at construction, and from then on
/// adds the same monotonic elapsed duration every other mode uses.
///
/// `value` is written with `Release` and read with `Acquire` so a
/// component observing a new epoch value also observes every write that
/// happened-before the clock update on the writer's thread (e.g. a frame
/// enqueued just before the epoch advanced past its timestamp).
pub struct EpochClock {
    start: Instant,
    wall_origin_micros: i64,
    value: AtomicI64,
    mode: AtomicU8,
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new(EpochMode::System)
    }
}

impl EpochClock {
    #[must_use]
    pub fn new(mode: EpochMode) -> Self {
        Self {
            start: Instant::now(),
            wall_origin_micros: wall_clock_micros(),
            value: AtomicI64::new(0),
            mode: AtomicU8::new(mode.as_u8()),
        }
    }

    #[must_use]
    pub fn mode(&self) -> EpochMode {
        EpochMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: EpochMode) {
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    /// Microseconds elapsed since this clock was constructed. Strictly
    /// non-decreasing for the lifetime of the clock.
    #[must_use]
    pub fn monotonic_now(&self) -> i64 {
        self.start.elapsed().as_micros() as i64
    }

    /// Returns the current epoch value in microseconds.
    #[must_use]
    pub fn now(&self) -> i64 {
        let offset = self.value.load(Ordering::Acquire);
        match self.mode() {
            EpochMode::Offset => self.monotonic_now().saturating_add(offset),
            EpochMode::System => self
                .wall_origin_micros
                .saturating_add(self.monotonic_now())
                .saturating_add(offset),
        }
    }

    /// Sets the stored offset directly.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Advances the stored offset by `delta` microseconds, returning the
    /// new stored value. Used by an `Offset`-mode tick loop to move time
    /// forward by exactly one frame/packet duration at a time.
    pub fn advance(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }
}

fn wall_clock_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_mode_adds_monotonic_elapsed_to_stored_value() {
        let clock = EpochClock::new(EpochMode::Offset);
        clock.set(1_000);
        assert!(clock.now() >= 1_000);
        clock.advance(500);
        assert!(clock.now() >= 1_500);
    }

    #[test]
    fn system_mode_tracks_wall_clock_plus_offset() {
        let clock = EpochClock::new(EpochMode::System);
        let before = wall_clock_micros();
        let after = clock.now();
        assert!(after >= before);
        clock.set(1_000_000_000);
        assert!(clock.now() > 1_000_000_000);
    }

    #[test]
    fn successive_reads_never_go_backwards() {
        for mode in [EpochMode::Offset, EpochMode::System] {
            let clock = EpochClock::new(mode);
            let mut last = clock.now();
            for _ in 0..1_000 {
                let next = clock.now();
                assert!(next >= last, "epoch regressed under {mode:?}");
                last = next;
            }
        }
    }

    #[test]
    fn independent_clocks_do_not_share_state() {
        let a = EpochClock::new(EpochMode::Offset);
        let b = EpochClock::new(EpochMode::Offset);
        a.set(42);
        assert!(a.now() >= 42);
        assert!(b.now() < 42);
    }

    #[test]
    fn mode_switch_changes_interpretation_of_stored_value() {
        let clock = EpochClock::new(EpochMode::Offset);
        clock.set(10);
        assert!(clock.now() >= 10);
        clock.set_mode(EpochMode::System);
        assert!(clock.now() > 10);
    }
}
