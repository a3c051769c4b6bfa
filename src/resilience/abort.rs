//! Abort policy evaluation and execution.
//!
//! Execution is serialized per policy the same way
//! [`crate::resilience::browser_recovery::BrowserRecovery`] serializes
//! recovery per browser id, via a `DashMap` of `tokio::sync::Mutex`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::events::{EngineEvent, EventBus};
use crate::resilience::errors::{ResilienceError, ResilienceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    Active,
    Inactive,
    Triggered,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    FailureRate,
    ErrorThreshold,
    Timeout,
    ResourceExhaustion,
    CriticalError,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortAction {
    StopImmediately,
    GracefulShutdown,
    SaveStateAndStop,
    Rollback,
}

impl AbortAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopImmediately => "stop_immediately",
            Self::GracefulShutdown => "graceful_shutdown",
            Self::SaveStateAndStop => "save_state_and_stop",
            Self::Rollback => "rollback",
        }
    }
}

/// A single trigger condition: the observed metric named by `trigger`
/// crossing `threshold` (direction depends on the trigger type; higher is
/// worse for all current trigger types).
#[derive(Debug, Clone)]
pub struct AbortCondition {
    pub trigger: TriggerType,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct AbortPolicy {
    pub id: String,
    pub name: String,
    pub status: PolicyStatus,
    pub conditions: Vec<AbortCondition>,
    pub action: AbortAction,
    pub priority: i32,
    pub cooldown: Duration,
    pub max_aborts_per_hour: u32,
}

impl AbortPolicy {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, action: AbortAction) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: PolicyStatus::Active,
            conditions: Vec::new(),
            action,
            priority: 0,
            cooldown: Duration::from_secs(300),
            max_aborts_per_hour: 5,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, trigger: TriggerType, threshold: f64) -> Self {
        self.conditions.push(AbortCondition { trigger, threshold });
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_max_per_hour(mut self, max: u32) -> Self {
        self.max_aborts_per_hour = max;
        self
    }
}

/// Observed metrics a caller supplies for policy evaluation; one value per
/// [`TriggerType`] that can be compared against a condition's threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortObservations {
    pub failure_rate: f64,
    pub error_count: f64,
    pub timeout_seconds: f64,
    pub resource_usage_percent: f64,
    pub critical_error: bool,
}

impl AbortObservations {
    fn value_for(&self, trigger: TriggerType) -> f64 {
        match trigger {
            TriggerType::FailureRate => self.failure_rate,
            TriggerType::ErrorThreshold => self.error_count,
            TriggerType::Timeout => self.timeout_seconds,
            TriggerType::ResourceExhaustion => self.resource_usage_percent,
            TriggerType::CriticalError => {
                if self.critical_error {
                    f64::MAX
                } else {
                    0.0
                }
            }
            TriggerType::Manual => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AbortDecision {
    pub triggered: bool,
    pub action: Option<AbortAction>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub policy_id: String,
    pub action: AbortAction,
    pub executed_at: chrono::DateTime<chrono::Utc>,
}

struct PolicyRuntime {
    policy: AbortPolicy,
    last_triggered: Option<Instant>,
    abort_timestamps: VecDeque<Instant>,
}

/// Holds a fixed set of abort policies, evaluates them against caller
/// supplied observations, and executes the highest-priority triggered
/// policy subject to its own cooldown and rolling-hour rate limit.
pub struct AbortSubsystem {
    policies: DashMap<String, RwLock<PolicyRuntime>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    event_bus: Option<Arc<EventBus>>,
}

impl AbortSubsystem {
    #[must_use]
    pub fn new(event_bus: Option<Arc<EventBus>>) -> Self {
        Self {
            policies: DashMap::new(),
            locks: DashMap::new(),
            event_bus,
        }
    }

    pub fn register_policy(&self, policy: AbortPolicy) {
        let id = policy.id.clone();
        self.policies.insert(
            id,
            RwLock::new(PolicyRuntime {
                policy,
                last_triggered: None,
                abort_timestamps: VecDeque::new(),
            }),
        );
    }

    /// Evaluates every active policy against `obs` and returns the
    /// decision for the highest-priority policy whose conditions are all
    /// satisfied (a policy with no conditions never triggers here; use
    /// [`Self::trigger_manual`] for operator-driven aborts).
    #[must_use]
    pub fn evaluate(&self, obs: AbortObservations) -> Option<(String, AbortDecision)> {
        let mut candidates: Vec<(String, i32)> = Vec::new();
        for entry in self.policies.iter() {
            let runtime = entry.read();
            if runtime.policy.status != PolicyStatus::Active || runtime.policy.conditions.is_empty() {
                continue;
            }
            let all_hold = runtime
                .policy
                .conditions
                .iter()
                .all(|c| obs.value_for(c.trigger) >= c.threshold);
            if all_hold {
                candidates.push((runtime.policy.id.clone(), runtime.policy.priority));
            }
        }
        candidates.sort_by_key(|(_, priority)| -priority);
        let (policy_id, _) = candidates.into_iter().next()?;
        let entry = self.policies.get(&policy_id)?;
        let runtime = entry.read();
        Some((
            policy_id,
            AbortDecision {
                triggered: true,
                action: Some(runtime.policy.action),
                reason: "conditions satisfied".to_string(),
            },
        ))
    }

    /// Executes `policy_id`'s action, enforcing cooldown and the rolling
    /// 60-minute abort-count limit. Concurrent callers for the same
    /// policy are serialized; the second caller observes the first
    /// caller's rate-limit state rather than racing it.
    pub async fn execute(&self, policy_id: &str) -> ResilienceResult<ExecutionResult> {
        let lock = self
            .locks
            .entry(policy_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let entry = self
            .policies
            .get(policy_id)
            .ok_or_else(|| ResilienceError::AbortRejected {
                policy_id: policy_id.to_string(),
                reason: "unknown policy".to_string(),
            })?;

        let (action, rejection) = {
            let mut runtime = entry.write();
            let now = Instant::now();
            let cooldown = runtime.policy.cooldown;
            let max_per_hour = runtime.policy.max_aborts_per_hour;

            if let Some(last) = runtime.last_triggered {
                if now.duration_since(last) < cooldown {
                    (None, Some("cooldown active".to_string()))
                } else {
                    (Some(()), None)
                }
            } else {
                (Some(()), None)
            };

            let hour_ago = now.checked_sub(Duration::from_secs(3600));
            if let Some(cutoff) = hour_ago {
                while runtime.abort_timestamps.front().is_some_and(|t| *t < cutoff) {
                    runtime.abort_timestamps.pop_front();
                }
            }

            if let Some(reason) = &rejection {
                (runtime.policy.action, Some(reason.clone()))
            } else if runtime.abort_timestamps.len() as u32 >= max_per_hour {
                (runtime.policy.action, Some("hourly abort limit reached".to_string()))
            } else {
                runtime.abort_timestamps.push_back(now);
                runtime.last_triggered = Some(now);
                runtime.policy.status = PolicyStatus::Triggered;
                (runtime.policy.action, None)
            }
        };

        if let Some(reason) = rejection {
            return Err(ResilienceError::AbortRejected { policy_id: policy_id.to_string(), reason });
        }

        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(EngineEvent::abort_executed(policy_id, action.as_str())).await;
        }

        Ok(ExecutionResult {
            policy_id: policy_id.to_string(),
            action,
            executed_at: chrono::Utc::now(),
        })
    }

    /// Triggers `policy_id` unconditionally, bypassing threshold
    /// evaluation, but still subject to cooldown and rate limiting —
    /// an operator can't starve the abort mechanism for other callers.
    pub async fn trigger_manual(&self, policy_id: &str) -> ResilienceResult<ExecutionResult> {
        self.execute(policy_id).await
    }

    /// Reverses a `Rollback` action's effects is the caller's job; this
    /// just refuses to let a rollback be rolled back.
    pub fn can_rollback(&self, policy_id: &str) -> bool {
        self.policies
            .get(policy_id)
            .is_some_and(|e| e.read().policy.action != AbortAction::Rollback)
    }

    #[must_use]
    pub fn abort_count_last_hour(&self, policy_id: &str) -> usize {
        self.policies.get(policy_id).map(|e| e.read().abort_timestamps.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn status(&self, policy_id: &str) -> Option<PolicyStatus> {
        self.policies.get(policy_id).map(|e| e.read().policy.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AbortPolicy {
        AbortPolicy::new("p1", "error-threshold", AbortAction::StopImmediately)
            .with_condition(TriggerType::ErrorThreshold, 10.0)
            .with_cooldown(Duration::from_millis(1))
            .with_max_per_hour(2)
    }

    #[test]
    fn evaluate_returns_none_when_below_threshold() {
        let subsystem = AbortSubsystem::new(None);
        subsystem.register_policy(policy());
        let decision = subsystem.evaluate(AbortObservations { error_count: 5.0, ..Default::default() });
        assert!(decision.is_none());
    }

    #[test]
    fn evaluate_triggers_when_threshold_crossed() {
        let subsystem = AbortSubsystem::new(None);
        subsystem.register_policy(policy());
        let (policy_id, decision) = subsystem
            .evaluate(AbortObservations { error_count: 11.0, ..Default::default() })
            .unwrap();
        assert_eq!(policy_id, "p1");
        assert!(decision.triggered);
        assert_eq!(decision.action, Some(AbortAction::StopImmediately));
    }

    #[tokio::test]
    async fn execute_respects_hourly_rate_limit() {
        let subsystem = AbortSubsystem::new(None);
        subsystem.register_policy(policy());
        assert!(subsystem.execute("p1").await.is_ok());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(subsystem.execute("p1").await.is_ok());
        tokio::time::sleep(Duration::from_millis(2)).await;
        let third = subsystem.execute("p1").await;
        assert!(third.is_err());
        assert_eq!(subsystem.abort_count_last_hour("p1"), 2);
    }

    #[tokio::test]
    async fn execute_respects_cooldown() {
        let subsystem = AbortSubsystem::new(None);
        let policy = AbortPolicy::new("p2", "cooldown-test", AbortAction::GracefulShutdown)
            .with_cooldown(Duration::from_secs(300))
            .with_max_per_hour(10);
        subsystem.register_policy(policy);
        assert!(subsystem.execute("p2").await.is_ok());
        let second = subsystem.execute("p2").await;
        assert!(second.is_err());
    }

    #[test]
    fn rollback_action_cannot_itself_be_rolled_back() {
        let subsystem = AbortSubsystem::new(None);
        subsystem.register_policy(AbortPolicy::new("p3", "rollback-policy", AbortAction::Rollback));
        assert!(!subsystem.can_rollback("p3"));
    }
}
