//! Graceful degradation level machine.
//!
//! The per-job `DashMap` of contexts mirrors `circuit_breaker::CircuitBreaker`'s
//! domain-keyed map shape: health tracked per key, not globally.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::events::{EngineEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum DegradationLevel {
    None,
    Minimal,
    Reduced,
    Limited,
    Emergency,
}

impl DegradationLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Reduced => "reduced",
            Self::Limited => "limited",
            Self::Emergency => "emergency",
        }
    }
}

/// A symbolic action the coordinator records as having been triggered by a
/// level change. Actually carrying it out (pausing tabs, clearing caches)
/// is the caller's job; this type only names what should happen.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DegradationAction {
    ReduceConcurrentTabs,
    ClearCaches,
    PauseProcessing,
    SaveState,
    NotifyAdmin,
}

impl DegradationAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReduceConcurrentTabs => "reduce_concurrent_tabs",
            Self::ClearCaches => "clear_caches",
            Self::PauseProcessing => "pause_processing",
            Self::SaveState => "save_state",
            Self::NotifyAdmin => "notify_admin",
        }
    }
}

/// A condition under which the coordinator is allowed to step back down
/// from a strategy's level. `attempt_recovery` only succeeds once every
/// active strategy's conditions all hold.
#[derive(Debug, Clone)]
pub enum RecoveryCondition {
    FailureRateBelow(f64),
    NoFailuresFor(std::time::Duration),
    Manual,
}

/// Observations the caller supplies when asking the coordinator to try
/// recovering; stands in for the live metrics view spec §4.S's
/// `attempt_recovery` reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryObservations {
    pub current_failure_rate: f64,
    pub time_since_last_failure: std::time::Duration,
    pub manual_override: bool,
}

impl RecoveryCondition {
    #[must_use]
    fn holds(&self, obs: &RecoveryObservations) -> bool {
        match self {
            Self::FailureRateBelow(threshold) => obs.current_failure_rate < *threshold,
            Self::NoFailuresFor(duration) => obs.time_since_last_failure >= *duration,
            Self::Manual => obs.manual_override,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyRule {
    pub name: String,
    pub level: DegradationLevel,
    /// Message-substring keywords that trigger this rule (matched against
    /// the lowercased failure category/message the caller passes in).
    pub triggers: Vec<String>,
    /// Failure-count threshold that, once reached, triggers this rule
    /// regardless of keyword match. `None` disables count-based triggering.
    pub failure_count_threshold: Option<u32>,
    pub actions: Vec<DegradationAction>,
    pub recovery_conditions: Vec<RecoveryCondition>,
    pub max_duration: Option<std::time::Duration>,
}

#[derive(Debug, Clone)]
pub struct DegradationTransition {
    pub from: DegradationLevel,
    pub to: DegradationLevel,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct DegradationContext {
    pub job_id: String,
    pub current_level: DegradationLevel,
    pub active_strategies: Vec<String>,
    pub failure_count: u32,
    pub recovery_count: u32,
    pub history: Vec<DegradationTransition>,
}

impl DegradationContext {
    fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            current_level: DegradationLevel::None,
            active_strategies: Vec::new(),
            failure_count: 0,
            recovery_count: 0,
            history: Vec::new(),
        }
    }
}

/// Tracks a [`DegradationContext`] per job, escalating level in response to
/// reported failures via a configurable rule table and stepping back down
/// only when every active strategy's recovery conditions hold.
pub struct DegradationCoordinator {
    rules: Vec<StrategyRule>,
    contexts: DashMap<String, DegradationContext>,
    emergency_failure_count: u32,
    event_bus: Option<Arc<EventBus>>,
}

impl DegradationCoordinator {
    #[must_use]
    pub fn new(emergency_failure_count: u32, event_bus: Option<Arc<EventBus>>) -> Self {
        Self {
            rules: default_rules(emergency_failure_count),
            contexts: DashMap::new(),
            emergency_failure_count,
            event_bus,
        }
    }

    #[must_use]
    pub fn with_rules(mut self, rules: Vec<StrategyRule>) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn emergency_failure_count(&self) -> u32 {
        self.emergency_failure_count
    }

    #[must_use]
    pub fn level(&self, job_id: &str) -> DegradationLevel {
        self.contexts.get(job_id).map(|c| c.current_level).unwrap_or(DegradationLevel::None)
    }

    /// Records a failure for `job_id` under `category_keyword` (e.g.
    /// `"network"`, `"browser"`, `"resource"`), evaluates the rule table,
    /// and escalates the job's level if a rule matches — either by keyword
    /// or because `failure_count` crossed a threshold rule (the default
    /// `failure_count >= 10 -> Emergency` rule, per spec §4.S).
    pub async fn record_failure(&self, job_id: &str, category_keyword: &str) -> DegradationLevel {
        let keyword = category_keyword.to_lowercase();
        let mut entry = self.contexts.entry(job_id.to_string()).or_insert_with(|| DegradationContext::new(job_id));
        entry.failure_count += 1;

        let mut target: Option<&StrategyRule> = None;
        for rule in &self.rules {
            let keyword_hit = rule.triggers.iter().any(|t| keyword.contains(t.as_str()));
            let count_hit = rule
                .failure_count_threshold
                .is_some_and(|threshold| entry.failure_count >= threshold);
            if keyword_hit || count_hit {
                if target.is_none_or(|t| rule.level > t.level) {
                    target = Some(rule);
                }
            }
        }

        let previous = entry.current_level;
        if let Some(rule) = target {
            if rule.level > entry.current_level {
                entry.current_level = rule.level;
                if !entry.active_strategies.contains(&rule.name) {
                    entry.active_strategies.push(rule.name.clone());
                }
                entry.history.push(DegradationTransition {
                    from: previous,
                    to: rule.level,
                    reason: format!("rule '{}' matched ({category_keyword})", rule.name),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
        let new_level = entry.current_level;
        drop(entry);

        if new_level != previous {
            self.publish(job_id, previous, new_level, category_keyword).await;
        }
        new_level
    }

    async fn publish(&self, job_id: &str, from: DegradationLevel, to: DegradationLevel, reason: &str) {
        let Some(bus) = &self.event_bus else { return };
        let _ = bus.publish(EngineEvent::degradation_changed(job_id, from.as_str(), to.as_str(), reason)).await;
    }

    /// Attempts to step `job_id` back down one level. Succeeds only if
    /// every active strategy's recovery conditions all hold against `obs`.
    pub async fn attempt_recovery(&self, job_id: &str, obs: RecoveryObservations) -> bool {
        let Some(mut entry) = self.contexts.get_mut(job_id) else { return false };
        if entry.current_level == DegradationLevel::None {
            return true;
        }

        let all_hold = entry.active_strategies.iter().all(|name| {
            self.rules
                .iter()
                .find(|r| &r.name == name)
                .is_none_or(|rule| rule.recovery_conditions.iter().all(|c| c.holds(&obs)))
        });

        if !all_hold {
            return false;
        }

        let previous = entry.current_level;
        entry.current_level = step_down(previous);
        entry.recovery_count += 1;
        entry.active_strategies.retain(|name| {
            self.rules.iter().find(|r| &r.name == name).is_none_or(|r| r.level <= entry.current_level)
        });
        entry.history.push(DegradationTransition {
            from: previous,
            to: entry.current_level,
            reason: "recovery conditions satisfied".to_string(),
            timestamp: chrono::Utc::now(),
        });
        let new_level = entry.current_level;
        drop(entry);

        self.publish(job_id, previous, new_level, "recovery").await;
        true
    }

    #[must_use]
    pub fn context(&self, job_id: &str) -> Option<DegradationContext> {
        self.contexts.get(job_id).map(|c| c.clone())
    }
}

fn step_down(level: DegradationLevel) -> DegradationLevel {
    match level {
        DegradationLevel::None => DegradationLevel::None,
        DegradationLevel::Minimal => DegradationLevel::None,
        DegradationLevel::Reduced => DegradationLevel::Minimal,
        DegradationLevel::Limited => DegradationLevel::Reduced,
        DegradationLevel::Emergency => DegradationLevel::Limited,
    }
}

fn default_rules(emergency_failure_count: u32) -> Vec<StrategyRule> {
    vec![
        StrategyRule {
            name: "network".to_string(),
            level: DegradationLevel::Minimal,
            triggers: vec!["network".to_string(), "timeout".to_string()],
            failure_count_threshold: None,
            actions: vec![DegradationAction::ReduceConcurrentTabs],
            recovery_conditions: vec![RecoveryCondition::FailureRateBelow(0.1)],
            max_duration: None,
        },
        StrategyRule {
            name: "browser".to_string(),
            level: DegradationLevel::Reduced,
            triggers: vec!["browser".to_string()],
            failure_count_threshold: None,
            actions: vec![DegradationAction::ReduceConcurrentTabs, DegradationAction::ClearCaches],
            recovery_conditions: vec![RecoveryCondition::FailureRateBelow(0.1)],
            max_duration: None,
        },
        StrategyRule {
            name: "resource".to_string(),
            level: DegradationLevel::Limited,
            triggers: vec!["resource".to_string(), "memory".to_string(), "disk".to_string()],
            failure_count_threshold: None,
            actions: vec![DegradationAction::PauseProcessing, DegradationAction::ClearCaches],
            recovery_conditions: vec![RecoveryCondition::NoFailuresFor(std::time::Duration::from_secs(60))],
            max_duration: None,
        },
        StrategyRule {
            name: "emergency".to_string(),
            level: DegradationLevel::Emergency,
            triggers: vec![],
            failure_count_threshold: Some(emergency_failure_count),
            actions: vec![DegradationAction::SaveState, DegradationAction::NotifyAdmin, DegradationAction::PauseProcessing],
            recovery_conditions: vec![RecoveryCondition::Manual],
            max_duration: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_failure_escalates_to_minimal() {
        let coordinator = DegradationCoordinator::new(10, None);
        let level = coordinator.record_failure("job1", "network").await;
        assert_eq!(level, DegradationLevel::Minimal);
    }

    #[tokio::test]
    async fn ten_failures_escalate_to_emergency() {
        let coordinator = DegradationCoordinator::new(10, None);
        let mut level = DegradationLevel::None;
        for _ in 0..10 {
            level = coordinator.record_failure("job1", "application").await;
        }
        assert_eq!(level, DegradationLevel::Emergency);
    }

    #[tokio::test]
    async fn recovery_requires_all_active_strategies_to_clear() {
        let coordinator = DegradationCoordinator::new(10, None);
        coordinator.record_failure("job1", "browser").await;
        let recovered = coordinator
            .attempt_recovery("job1", RecoveryObservations { current_failure_rate: 0.9, ..Default::default() })
            .await;
        assert!(!recovered);
        assert_eq!(coordinator.level("job1"), DegradationLevel::Reduced);

        let recovered = coordinator
            .attempt_recovery("job1", RecoveryObservations { current_failure_rate: 0.01, ..Default::default() })
            .await;
        assert!(recovered);
        assert_eq!(coordinator.level("job1"), DegradationLevel::Minimal);
    }

    #[tokio::test]
    async fn level_never_decreases_on_a_repeat_lower_priority_trigger() {
        let coordinator = DegradationCoordinator::new(10, None);
        coordinator.record_failure("job1", "resource").await;
        assert_eq!(coordinator.level("job1"), DegradationLevel::Limited);
        coordinator.record_failure("job1", "network").await;
        assert_eq!(coordinator.level("job1"), DegradationLevel::Limited);
    }
}
