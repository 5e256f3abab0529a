//! Time source for pre-roll and segment intervals.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use camloop_capture::CancelToken;

/// Longest a simulated sleep waits before rechecking for interruption.
const SIMULATED_POLL: Duration = Duration::from_millis(2);

/// Clock the session controller schedules against.
pub trait SessionClock: Send + Sync {
    /// Time elapsed on this clock since it was created.
    fn elapsed(&self) -> Duration;

    /// Sleep for `duration` of clock time. Returns true if `interrupt` was
    /// cancelled before the time passed.
    fn sleep(&self, duration: Duration, interrupt: &CancelToken) -> bool;
}

/// Wall clock.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration, interrupt: &CancelToken) -> bool {
        interrupt.wait_timeout(duration)
    }
}

/// Clock that only moves when [`SimulatedClock::advance`] is called.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: Mutex<Duration>,
    advanced: Condvar,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward and wake sleepers.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
        self.advanced.notify_all();
    }
}

impl SessionClock for SimulatedClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration, interrupt: &CancelToken) -> bool {
        let mut now = self.now.lock();
        let deadline = *now + duration;
        while *now < deadline {
            if interrupt.is_cancelled() {
                return true;
            }
            self.advanced.wait_for(&mut now, SIMULATED_POLL);
        }
        interrupt.is_cancelled()
    }
}
