//! Idle self-termination.
//!
//! The monitor is checked on a fixed interval by the scheduler. Past 80% of
//! the idle threshold it warns; past the threshold it waits a short grace
//! period and fires the termination hook exactly once.
//!
//! Any long operation that does not `touch()` the clock can be terminated
//! mid-work. Callers running long jobs must pulse the clock themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use vertex_core::config::LifecycleSettings;

use crate::activity::ActivityClock;
use crate::scheduler::Scheduler;

/// Invoked once when the process has been idle past the threshold.
pub type TerminationHook = Arc<dyn Fn() + Send + Sync>;

const WARNING_FRACTION: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Warning,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStatus {
    pub enabled: bool,
    pub idle_seconds: f64,
    pub threshold_seconds: u64,
    pub warning: bool,
    pub terminating: bool,
}

pub struct LifecycleMonitor {
    clock: Arc<ActivityClock>,
    settings: LifecycleSettings,
    hook: TerminationHook,
    warned: AtomicBool,
    terminating: AtomicBool,
}

impl LifecycleMonitor {
    pub fn new(clock: Arc<ActivityClock>, settings: LifecycleSettings, hook: TerminationHook) -> Self {
        Self {
            clock,
            settings,
            hook,
            warned: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
        }
    }

    /// A monitor that never terminates. The clock still works.
    pub fn disabled(clock: Arc<ActivityClock>) -> Self {
        let settings = LifecycleSettings {
            enabled: false,
            ..LifecycleSettings::default()
        };
        Self::new(clock, settings, Arc::new(|| {}))
    }

    pub fn clock(&self) -> &Arc<ActivityClock> {
        &self.clock
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn idle_state(&self) -> IdleState {
        let idle = self.clock.idle();
        let threshold = self.settings.idle_threshold;
        if idle > threshold {
            IdleState::Expired
        } else if idle.as_secs_f64() > threshold.as_secs_f64() * WARNING_FRACTION {
            IdleState::Warning
        } else {
            IdleState::Active
        }
    }

    /// One monitor pass.
    pub async fn check(&self) -> IdleState {
        if !self.settings.enabled {
            return IdleState::Active;
        }

        let state = self.idle_state();
        let idle = self.clock.idle().as_secs();
        let threshold = self.settings.idle_threshold.as_secs();
        match state {
            IdleState::Active => {
                self.warned.store(false, Ordering::Release);
            }
            IdleState::Warning => {
                if !self.warned.swap(true, Ordering::AcqRel) {
                    warn!("Approaching idle threshold: {}s / {}s", idle, threshold);
                }
            }
            IdleState::Expired => {
                if self
                    .terminating
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    warn!(
                        "Idle for {}s (threshold {}s). Initiating graceful shutdown.",
                        idle, threshold
                    );
                    tokio::time::sleep(self.settings.grace).await;
                    (self.hook)();
                }
            }
        }
        state
    }

    /// Register the periodic check. No-op when disabled.
    pub fn schedule(self: &Arc<Self>, scheduler: &mut Scheduler) {
        if !self.settings.enabled {
            info!("Lifecycle monitor disabled");
            return;
        }
        info!(
            "Lifecycle monitor started. Idle threshold: {}s",
            self.settings.idle_threshold.as_secs()
        );
        let monitor = Arc::clone(self);
        scheduler.every("lifecycle", self.settings.check_interval, move || {
            let monitor = monitor.clone();
            async move {
                monitor.check().await;
                Ok(())
            }
        });
    }

    pub fn status(&self) -> LifecycleStatus {
        LifecycleStatus {
            enabled: self.settings.enabled,
            idle_seconds: self.clock.idle_seconds(),
            threshold_seconds: self.settings.idle_threshold.as_secs(),
            warning: self.idle_state() != IdleState::Active,
            terminating: self.terminating.load(Ordering::Acquire),
        }
    }
}
