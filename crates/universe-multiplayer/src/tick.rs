//! Fixed-rate tick scheduling for the server loop.

use std::time::Duration;

/// Most ticks a single [`ServerTickSchedule::accumulate`] call may yield.
/// Time beyond that is dropped so a long stall does not cause a burst.
pub const MAX_CATCH_UP_TICKS: u32 = 5;

/// Converts elapsed wall time into whole simulation ticks.
#[derive(Debug)]
pub struct ServerTickSchedule {
    accumulator: Duration,
    tick_duration: Duration,
    total_ticks: u64,
    dropped_ticks: u64,
}

impl ServerTickSchedule {
    /// Schedule running at `hz` ticks per second (at least 1).
    pub fn with_tick_rate(hz: u32) -> Self {
        Self {
            accumulator: Duration::ZERO,
            tick_duration: Duration::from_secs(1) / hz.max(1),
            total_ticks: 0,
            dropped_ticks: 0,
        }
    }

    /// Adds elapsed time and returns how many ticks are due.
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let mut ticks = 0u32;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            if ticks == MAX_CATCH_UP_TICKS {
                self.dropped_ticks += 1;
                continue;
            }
            ticks += 1;
        }
        self.total_ticks += u64::from(ticks);
        ticks
    }

    /// Time until the next tick is due.
    pub fn until_next(&self) -> Duration {
        self.tick_duration.saturating_sub(self.accumulator)
    }

    /// Ticks yielded since creation.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Ticks skipped because the loop fell too far behind.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }

    /// Length of one tick.
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

impl Default for ServerTickSchedule {
    fn default() -> Self {
        Self::with_tick_rate(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_ticks_only() {
        let mut schedule = ServerTickSchedule::with_tick_rate(20);
        assert_eq!(schedule.accumulate(Duration::from_millis(30)), 0);
        assert_eq!(schedule.accumulate(Duration::from_millis(30)), 1);
        assert_eq!(schedule.until_next(), Duration::from_millis(40));
        assert_eq!(schedule.accumulate(Duration::from_millis(100)), 2);
        assert_eq!(schedule.total_ticks(), 3);
    }

    #[test]
    fn test_stall_is_capped() {
        let mut schedule = ServerTickSchedule::with_tick_rate(10);
        assert_eq!(schedule.accumulate(Duration::from_secs(2)), MAX_CATCH_UP_TICKS);
        assert_eq!(schedule.dropped_ticks(), 20 - u64::from(MAX_CATCH_UP_TICKS));
        assert_eq!(schedule.accumulate(Duration::ZERO), 0);
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let schedule = ServerTickSchedule::with_tick_rate(0);
        assert_eq!(schedule.tick_duration(), Duration::from_secs(1));
    }
}
