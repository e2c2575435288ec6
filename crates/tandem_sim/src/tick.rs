//! # Producer Tick Loop
//!
//! Fixed-cadence timer for the simulation worker.
//!
//! ## Design
//!
//! The loop only decides *when* a tick is due. How far the world advances
//! is measured separately by the driver from wall time, so a late tick
//! does not need to be replayed: the accumulator keeps at most one pending
//! tick.

use std::time::{Duration, Instant};

/// Fixed-cadence tick controller.
pub struct TickLoop {
    /// Target tick interval.
    tick_duration: Duration,
    /// Time of last poll.
    last_poll: Instant,
    /// Time accumulated toward the next tick.
    accumulator: Duration,
    /// Total ticks executed.
    tick_count: u64,
    /// Timing statistics.
    stats: TickStats,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest tick observed.
    pub min_tick_us: u64,
    /// Longest tick observed.
    pub max_tick_us: u64,
    /// Rolling average.
    pub avg_tick_us: u64,
    /// Ticks that overran the interval.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: tick_duration.as_micros() as u64,
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::fresh(Duration::ZERO)
    }
}

impl TickLoop {
    /// Creates a tick loop with the given interval.
    #[must_use]
    pub fn new(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            last_poll: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Tick loop armed at a world's fixed timestep (seconds).
    ///
    /// Non-positive or non-finite steps fall back to 60 Hz.
    #[must_use]
    pub fn from_fixed_time_step(seconds: f32) -> Self {
        let duration = if seconds.is_finite() && seconds > 0.0 {
            Duration::from_secs_f32(seconds)
        } else {
            Duration::from_micros(16_666)
        };
        Self::new(duration)
    }

    /// Returns true if a tick is due.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_poll);
        self.last_poll = now;

        self.accumulator >= self.tick_duration
    }

    /// Marks the start of a tick and returns its start time.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        // one pending tick at most; the driver clamps the real elapsed time
        self.accumulator = self
            .accumulator
            .saturating_sub(self.tick_duration)
            .min(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Marks the end of a tick and records its duration.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = duration.as_micros() as u64;

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// How long the worker may block on its command channel before the
    /// next tick is due.
    #[must_use]
    pub fn time_until_next_tick(&self) -> Duration {
        let pending = self.accumulator + self.last_poll.elapsed();
        self.tick_duration.saturating_sub(pending)
    }

    /// Ticks executed.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target tick interval.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("tick_duration", &self.tick_duration)
            .field("tick_count", &self.tick_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_loop_creation() {
        let tick_loop = TickLoop::from_fixed_time_step(1.0 / 60.0);
        assert_eq!(tick_loop.tick_count(), 0);
        assert!(tick_loop.tick_duration() > Duration::from_micros(16_600));
        assert!(tick_loop.tick_duration() < Duration::from_micros(16_700));
    }

    #[test]
    fn test_invalid_step_falls_back() {
        let tick_loop = TickLoop::from_fixed_time_step(0.0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_micros(16_666));
    }

    #[test]
    fn test_tick_execution() {
        let mut tick_loop = TickLoop::new(Duration::from_millis(1));

        std::thread::sleep(Duration::from_millis(5));
        assert!(tick_loop.should_tick());

        let start = tick_loop.begin_tick();
        tick_loop.end_tick(start);

        assert_eq!(tick_loop.tick_count(), 1);
        assert_eq!(tick_loop.stats().total_ticks, 1);
    }

    #[test]
    fn test_backlog_collapses_to_one_pending_tick() {
        let mut tick_loop = TickLoop::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(tick_loop.should_tick());
        let _ = tick_loop.begin_tick();

        let mut extra = 0;
        while tick_loop.accumulator >= tick_loop.tick_duration {
            let _ = tick_loop.begin_tick();
            extra += 1;
        }
        assert!(extra <= 1);
    }

    #[test]
    fn test_wait_hint_is_bounded_by_interval() {
        let tick_loop = TickLoop::new(Duration::from_millis(50));
        assert!(tick_loop.time_until_next_tick() <= Duration::from_millis(50));
    }
}
