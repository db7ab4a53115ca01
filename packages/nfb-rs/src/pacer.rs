use std::thread;
use std::time::{Duration, Instant};

/// Iteration pacing and session clock.
///
/// Holds two reference points: the construction instant, which never resets and
/// drives the session deadline, and the last pacing tick, which every
/// `sleep_at_least` call moves forward.
#[derive(Debug, Clone)]
pub struct Pacer {
    started: Instant,
    last_tick: Instant,
}

impl Pacer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_tick: now,
        }
    }

    /// Time since construction
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn deadline_exceeded(&self, deadline: Duration) -> bool {
        self.elapsed() >= deadline
    }

    /// Remaining part of `min_interval` since the previous tick
    pub fn remaining(&self, min_interval: Duration) -> Duration {
        min_interval.saturating_sub(self.last_tick.elapsed())
    }

    /// Sleep out the rest of `min_interval`, then restart the interval
    pub fn sleep_at_least(&mut self, min_interval: Duration) {
        self.sleep_at_least_with(min_interval, thread::sleep);
    }

    /// Like [`Pacer::sleep_at_least`] but with a caller-supplied sleep, e.g. one
    /// that wakes early when the session is stopped.
    pub fn sleep_at_least_with<F>(&mut self, min_interval: Duration, sleep: F)
    where
        F: FnOnce(Duration),
    {
        let remaining = self.remaining(min_interval);
        if !remaining.is_zero() {
            sleep(remaining);
        }
        self.last_tick = Instant::now();
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}
