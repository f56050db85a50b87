//! Run deadlines and the periodic progress report.
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Stand-in for deadlines that do not fit in an `Instant`, about 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + after`, clamped to a far-off instant when the sum would overflow.
pub(crate) fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Ticks once per period and turns the iteration total into a per-second rate.
pub(crate) struct Progress {
    interval: Interval,
    last_tick: Instant,
    last_iterations: u64,
}

impl Progress {
    pub fn new(period: Duration) -> Self {
        let start = Instant::now();
        let mut interval = interval_at(deadline_after(start, period), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            last_tick: start,
            last_iterations: 0,
        }
    }

    /// Waits for the next period. Returns the time since the previous tick.
    pub async fn tick(&mut self) -> Duration {
        self.interval.tick().await;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        elapsed
    }

    /// Iterations per second over `elapsed`, given the iterations completed so far.
    pub fn rate(&mut self, iterations: u64, elapsed: Duration) -> f64 {
        let done = iterations.saturating_sub(self.last_iterations);
        self.last_iterations = iterations;
        if elapsed.is_zero() {
            0.
        } else {
            done as f64 / elapsed.as_secs_f64()
        }
    }
}
