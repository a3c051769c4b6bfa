//! Resilience subsystems: failure classification and recovery dispatch,
//! bounded-concurrency tab retry/skip, browser crash detection and
//! recovery, graceful degradation levels, per-job progress checkpoints,
//! and rate-limited abort policies.

pub mod abort;
pub mod browser_recovery;
pub mod checkpoint;
pub mod degradation;
pub mod errors;
pub mod failure;
pub mod tab_handler;

pub use abort::{
    AbortAction, AbortCondition, AbortDecision, AbortObservations, AbortPolicy, AbortSubsystem,
    ExecutionResult, PolicyStatus, TriggerType,
};
pub use browser_recovery::{BrowserRecovery, BrowserState, HealthSample, HealthThresholds};
pub use checkpoint::{CheckpointSnapshot, CheckpointTracker, JobState, ProgressMilestone};
pub use degradation::{
    DegradationAction, DegradationCoordinator, DegradationContext, DegradationLevel,
    RecoveryCondition, RecoveryObservations, StrategyRule,
};
pub use errors::{ResilienceError, ResilienceResult};
pub use failure::{
    ClassificationCategory, ClassificationOutcome, FailureCategory, FailureClassifier, FailureEvent,
    FailureHandler, FailureSeverity, RecoveryAction, RecoveryOutcome,
};
pub use tab_handler::{TabHandler, TabHandlerReport, TabOutcome, TabProcessor};

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::events::EventBus;

/// Ties every resilience subsystem to one `EngineConfig`, giving callers a
/// single handle instead of wiring each subsystem's constructor by hand.
/// Mirrors [`crate::stealth::StealthOrchestrator`]'s role of bundling a
/// fixed set of collaborators behind one entry point.
pub struct ResilienceCoordinator {
    pub failure_handler: FailureHandler,
    pub tab_handler: TabHandler,
    pub browser_recovery: BrowserRecovery,
    pub degradation: DegradationCoordinator,
    pub checkpoints: CheckpointTracker,
    pub abort: AbortSubsystem,
}

impl ResilienceCoordinator {
    #[must_use]
    pub fn new(config: &EngineConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            failure_handler: FailureHandler::new(Some(event_bus.clone())),
            tab_handler: TabHandler::new(config.max_tab_concurrency(), config.max_tab_retries()),
            browser_recovery: BrowserRecovery::new(config.max_recovery_attempts(), Some(event_bus.clone())),
            degradation: DegradationCoordinator::new(config.degradation_emergency_failure_count(), Some(event_bus.clone())),
            checkpoints: CheckpointTracker::new(
                config.checkpoint_snapshot_retention(),
                config.checkpoint_snapshot_max_age(),
                Some(event_bus.clone()),
            ),
            abort: AbortSubsystem::new(Some(event_bus)),
        }
    }
}

/// A reasonable default set of abort policies covering the standard
/// trigger types; callers are free to register their own instead.
#[must_use]
pub fn default_abort_policies(cooldown: Duration, max_per_hour: u32) -> Vec<AbortPolicy> {
    vec![
        AbortPolicy::new("failure-rate-critical", "failure rate exceeds tolerance", AbortAction::GracefulShutdown)
            .with_condition(TriggerType::FailureRate, 0.75)
            .with_cooldown(cooldown)
            .with_max_per_hour(max_per_hour),
        AbortPolicy::new("critical-error", "unrecoverable error observed", AbortAction::SaveStateAndStop)
            .with_condition(TriggerType::CriticalError, 1.0)
            .with_cooldown(cooldown)
            .with_max_per_hour(max_per_hour),
        AbortPolicy::new("resource-exhaustion", "resource usage at capacity", AbortAction::StopImmediately)
            .with_condition(TriggerType::ResourceExhaustion, 95.0)
            .with_cooldown(cooldown)
            .with_max_per_hour(max_per_hour),
    ]
}
