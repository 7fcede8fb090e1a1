//! Wall-clock source for run timestamps.

use std::sync::Mutex;
use std::time::Duration;

use crate::UtcDateTime;

/// Supplies "now" to the pipeline.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

/// The system UTC clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Hand-driven clock for replaying runs at chosen instants.
///
/// Every call to [`Clock::now`] returns the current instant and then advances
/// it by `tick`, so successive stamps are strictly increasing when `tick` is
/// non-zero.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: UtcDateTime,
    tick: Duration,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self::with_tick(start, Duration::ZERO)
    }

    pub fn with_tick(start: UtcDateTime, tick: Duration) -> Self {
        Self {
            state: Mutex::new(ManualState { now: start, tick }),
        }
    }

    pub fn set(&self, instant: UtcDateTime) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.now = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.now = state.now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = state.now;
        state.now = now.saturating_add(state.tick);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_ticks_after_each_read() {
        let start = UtcDateTime::parse("2024-01-02T15:00:00Z").expect("ts");
        let clock = ManualClock::with_tick(start, Duration::from_millis(5));

        let first = clock.now();
        let second = clock.now();
        assert_eq!(first, start);
        assert_eq!(second.unix_micros() - first.unix_micros(), 5_000);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now().unix_micros() - second.unix_micros(), 90_005_000);
    }
}
