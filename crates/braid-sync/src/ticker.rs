//! # Poll Timer
//!
//! A periodic timer that is released exactly once.
//!
//! The first tick fires one full period after creation. `cancel()` is
//! idempotent: only the first call releases the interval and returns
//! `true`. Dropping the timer (for example when its task is aborted)
//! releases it as well.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Smallest accepted period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct PollTimer {
    interval: Option<Interval>,
    ticks: u64,
}

impl PollTimer {
    pub fn new(period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        PollTimer {
            interval: Some(interval),
            ticks: 0,
        }
    }

    /// Waits for the next tick and returns its 1-based number.
    ///
    /// Returns `None` immediately once cancelled.
    pub async fn tick(&mut self) -> Option<u64> {
        let interval = self.interval.as_mut()?;
        interval.tick().await;
        self.ticks += 1;
        Some(self.ticks)
    }

    /// Releases the timer. Returns `true` only for the call that released it.
    pub fn cancel(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.interval.is_none()
    }

    /// Ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
