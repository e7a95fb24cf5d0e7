//! Vertex runtime: idle lifecycle, scheduling, cost decisions, seat routing.
//!
//! Services are constructed once at startup and passed by reference to
//! every consumer. Nothing here is a global.

pub mod activity;
pub mod decision;
pub mod lifecycle;
pub mod scheduler;
pub mod scoring;
pub mod seats;
pub mod types;

pub use activity::ActivityClock;
pub use decision::{
    Candidate, CostDecisionEngine, CostStatistics, CostTier, Decision, DecisionAlternative,
    UsageRecord, DEFAULT_QUALITY_THRESHOLD,
};
pub use lifecycle::{IdleState, LifecycleMonitor, LifecycleStatus, TerminationHook};
pub use scheduler::Scheduler;
pub use scoring::quality_score;
pub use seats::{ModelBinding, ModelBindingHydrator, SeatRouter, SeatRouterConfig};
pub use types::*;
