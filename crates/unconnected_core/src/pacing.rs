//! Fixed-interval pacing between calls to shared external services.

use std::thread::sleep;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        sleep(duration);
    }
}

pub trait Pacer {
    /// Blocks until the next call may be issued.
    fn wait_turn(&mut self);

    /// Marks the end of the call started by the last `wait_turn`.
    fn finish_turn(&mut self);
}

/// Enforces a minimum gap between the end of one turn and the start of the
/// next. The first turn never waits. A turn that is never finished counts as
/// ending when it started.
#[derive(Debug)]
pub struct FixedIntervalPacer<C: Clock = SystemClock> {
    clock: C,
    interval: Duration,
    last_turn: Option<Instant>,
}

impl FixedIntervalPacer<SystemClock> {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(SystemClock, interval)
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }
}

impl<C: Clock> FixedIntervalPacer<C> {
    pub fn with_clock(clock: C, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last_turn: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<C: Clock> Pacer for FixedIntervalPacer<C> {
    fn wait_turn(&mut self) {
        if let Some(last) = self.last_turn {
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < self.interval {
                self.clock.sleep(self.interval - elapsed);
            }
        }
        self.last_turn = Some(self.clock.now());
    }

    fn finish_turn(&mut self) {
        self.last_turn = Some(self.clock.now());
    }
}
