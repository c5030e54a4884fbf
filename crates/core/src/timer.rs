//! Fixed-tick timing for the game loop.

use std::time::{Duration, Instant};

/// Accumulating timer that converts wall-clock time into fixed ticks.
///
/// The game advances in fixed steps so physics integration stays stable
/// regardless of frame rate. Each call to [`TickTimer::ticks`] returns how
/// many whole ticks elapsed since the previous call.
#[derive(Debug)]
pub struct TickTimer {
    tick: Duration,
    last: Instant,
    accumulator: Duration,
}

impl TickTimer {
    /// Create a timer with the given tick duration.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            last: Instant::now(),
            accumulator: Duration::ZERO,
        }
    }

    /// Number of whole ticks elapsed since the last call.
    ///
    /// Capped at 8 ticks per call so a stall (debugger, window drag) doesn't
    /// turn into a catch-up spiral.
    pub fn ticks(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulator += now - self.last;
        self.last = now;

        let mut ticks = 0;
        while self.accumulator >= self.tick && ticks < 8 {
            self.accumulator -= self.tick;
            ticks += 1;
        }
        if ticks == 8 {
            self.accumulator = Duration::ZERO;
        }
        ticks
    }

    /// The configured tick duration.
    pub fn tick_duration(&self) -> Duration {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_whole_ticks() {
        let mut timer = TickTimer::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let ticks = timer.ticks();
        assert!(ticks >= 1);
        assert!(ticks <= 8);
    }

    #[test]
    fn catch_up_is_capped() {
        let mut timer = TickTimer::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(timer.ticks(), 8);
    }
}
