//! Event type definitions for the engine's event bus.
//!
//! Every component that produces an observable state change (a resolution
//! outcome, a circuit transition, a degradation change, an abort) emits one
//! of these rather than logging it directly, so subscribers (a dashboard,
//! a test harness, the checkpoint tracker) can consume them uniformly.

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShutdownReason {
    Completed,
    Error(String),
    Cancelled,
    Aborted { policy_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A resolution attempt for a semantic selector began.
    ResolutionStarted {
        correlation_id: CorrelationId,
        selector_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A strategy within a resolution produced a result (before validation).
    StrategyAttempted {
        correlation_id: CorrelationId,
        selector_name: String,
        strategy: String,
        success: bool,
        confidence: f32,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Resolution finished: either an accepted result or exhaustion of
    /// every strategy.
    ResolutionCompleted {
        correlation_id: CorrelationId,
        selector_name: String,
        accepted: bool,
        confidence: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A validation rule rejected a candidate element.
    ValidationFailed {
        correlation_id: CorrelationId,
        selector_name: String,
        rule: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A domain's circuit breaker changed state.
    CircuitStateChanged {
        domain: String,
        from: String,
        to: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The degradation coordinator changed level.
    DegradationChanged {
        job_id: String,
        from: String,
        to: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The abort subsystem executed an action for a policy.
    AbortExecuted {
        policy_id: String,
        action: String,
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A progress milestone was reached.
    MilestoneReached {
        job_id: String,
        milestone: String,
        percent_complete: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A failure snapshot was persisted to the snapshot store.
    SnapshotPersisted {
        snapshot_id: String,
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The stealth orchestrator finished (or gave up on) setup for a context.
    StealthApplied {
        context_id: String,
        subsystems_applied: Vec<String>,
        subsystems_skipped: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Signals the bus is shutting down; subscribers should exit their
    /// event loops on receipt.
    Shutdown {
        reason: ShutdownReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A classified failure was handed to the resilience subsystem.
    FailureEvent {
        correlation_id: CorrelationId,
        category: String,
        severity: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A retry was attempted for a previously classified failure.
    RetryEvent {
        correlation_id: CorrelationId,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A progress checkpoint was recorded for a job.
    CheckpointEvent {
        job_id: String,
        milestone: String,
        percent_complete: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A resource-pressure observation (tab concurrency, memory, etc).
    ResourceEvent {
        resource: String,
        value: f64,
        limit: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The browser recovery state machine transitioned.
    RecoveryEvent {
        browser_id: String,
        from: String,
        to: String,
        attempt: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A strategy's priority was promoted due to sustained success.
    StrategyPromoted {
        selector_name: String,
        strategy: String,
        new_priority: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A strategy's priority was demoted due to repeated failure.
    StrategyDemoted {
        selector_name: String,
        strategy: String,
        new_priority: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A resolved element's DOM path drifted from its last known-good shape.
    DriftDetected {
        selector_name: String,
        previous_path: String,
        current_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Engine configuration was reloaded or mutated at runtime.
    ConfigurationChanged {
        field: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Result of publishing a batch of events. All events in the batch are
/// attempted regardless of individual failures (best-effort delivery); this
/// struct reports exactly how many succeeded so callers can decide what to
/// do about partial success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPublishResult {
    pub total: usize,
    pub published: usize,
    pub failed: usize,
    pub max_subscribers: usize,
}

impl BatchPublishResult {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.published == self.total && self.failed == 0
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.published as f64 / self.total as f64) * 100.0
    }
}

impl EngineEvent {
    #[must_use]
    pub fn resolution_started(correlation_id: CorrelationId, selector_name: impl Into<String>) -> Self {
        Self::ResolutionStarted {
            correlation_id,
            selector_name: selector_name.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn strategy_attempted(
        correlation_id: CorrelationId,
        selector_name: impl Into<String>,
        strategy: impl Into<String>,
        success: bool,
        confidence: f32,
        elapsed_ms: u64,
    ) -> Self {
        Self::StrategyAttempted {
            correlation_id,
            selector_name: selector_name.into(),
            strategy: strategy.into(),
            success,
            confidence,
            elapsed_ms,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn resolution_completed(
        correlation_id: CorrelationId,
        selector_name: impl Into<String>,
        accepted: bool,
        confidence: f32,
    ) -> Self {
        Self::ResolutionCompleted {
            correlation_id,
            selector_name: selector_name.into(),
            accepted,
            confidence,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn circuit_state_changed(
        domain: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::CircuitStateChanged {
            domain: domain.into(),
            from: from.into(),
            to: to.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn degradation_changed(
        job_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DegradationChanged {
            job_id: job_id.into(),
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn failure(
        correlation_id: CorrelationId,
        category: impl Into<String>,
        severity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::FailureEvent {
            correlation_id,
            category: category.into(),
            severity: severity.into(),
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn retry(correlation_id: CorrelationId, attempt: u32, max_attempts: u32, delay_ms: u64) -> Self {
        Self::RetryEvent {
            correlation_id,
            attempt,
            max_attempts,
            delay_ms,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn checkpoint(job_id: impl Into<String>, milestone: impl Into<String>, percent_complete: f32) -> Self {
        Self::CheckpointEvent {
            job_id: job_id.into(),
            milestone: milestone.into(),
            percent_complete,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn resource(resource: impl Into<String>, value: f64, limit: f64) -> Self {
        Self::ResourceEvent {
            resource: resource.into(),
            value,
            limit,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn recovery(browser_id: impl Into<String>, from: impl Into<String>, to: impl Into<String>, attempt: u32) -> Self {
        Self::RecoveryEvent {
            browser_id: browser_id.into(),
            from: from.into(),
            to: to.into(),
            attempt,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn abort_executed(policy_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::AbortExecuted {
            policy_id: policy_id.into(),
            action: action.into(),
            success: true,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn strategy_promoted(selector_name: impl Into<String>, strategy: impl Into<String>, new_priority: i32) -> Self {
        Self::StrategyPromoted {
            selector_name: selector_name.into(),
            strategy: strategy.into(),
            new_priority,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn strategy_demoted(selector_name: impl Into<String>, strategy: impl Into<String>, new_priority: i32) -> Self {
        Self::StrategyDemoted {
            selector_name: selector_name.into(),
            strategy: strategy.into(),
            new_priority,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn drift_detected(
        selector_name: impl Into<String>,
        previous_path: impl Into<String>,
        current_path: impl Into<String>,
    ) -> Self {
        Self::DriftDetected {
            selector_name: selector_name.into(),
            previous_path: previous_path.into(),
            current_path: current_path.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn configuration_changed(field: impl Into<String>) -> Self {
        Self::ConfigurationChanged {
            field: field.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn stealth_applied(
        context_id: impl Into<String>,
        subsystems_applied: Vec<String>,
        subsystems_skipped: Vec<String>,
    ) -> Self {
        Self::StealthApplied {
            context_id: context_id.into(),
            subsystems_applied,
            subsystems_skipped,
            timestamp: chrono::Utc::now(),
        }
    }
}
