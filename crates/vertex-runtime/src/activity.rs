//! Process-wide activity clock.
//!
//! Every external entrypoint calls `touch()` on entry. The lifecycle monitor
//! only reads the timestamp, which is a single atomic and never waits on a
//! request-path lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

pub struct ActivityClock {
    epoch: Instant,
    /// Milliseconds since `epoch` of the last touch.
    last_touch_ms: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_touch_ms: AtomicU64::new(0),
        }
    }

    /// Reset the idle timer to now.
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_touch_ms.fetch_max(now, Ordering::AcqRel);
    }

    /// Alias of [`ActivityClock::touch`] for background daemons.
    pub fn pulse(&self) {
        self.touch();
    }

    pub fn idle(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_touch_ms.load(Ordering::Acquire);
        Duration::from_millis(now.saturating_sub(last))
    }

    pub fn idle_seconds(&self) -> f64 {
        self.idle().as_secs_f64()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}
