//! Browser crash detection and recovery.
//!
//! The state machine generalizes directly from
//! `crawl_engine::circuit_breaker` (`Closed`/`Open`/`HalfOpen` becomes
//! `Healthy`/`Degraded`/`Crashed`/`Recovering`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::events::{EngineEvent, EventBus};
use crate::resilience::errors::{ResilienceError, ResilienceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BrowserState {
    Unknown,
    Healthy,
    Degraded,
    Crashed,
    Recovering,
    Terminated,
}

impl BrowserState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Crashed => "crashed",
            Self::Recovering => "recovering",
            Self::Terminated => "terminated",
        }
    }
}

/// One health sample a registered probe reports for a browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSample {
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub error_rate: f32,
    pub response_time_ms: u64,
}

/// Thresholds past which a healthy browser is considered degraded or
/// crashed. `None` means "don't evaluate this factor."
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub max_cpu_percent: Option<f32>,
    pub max_memory_mb: Option<f64>,
    pub max_error_rate: Option<f32>,
    pub max_response_time_ms: Option<u64>,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_cpu_percent: Some(90.0),
            max_memory_mb: Some(4096.0),
            max_error_rate: Some(0.5),
            max_response_time_ms: Some(10_000),
        }
    }
}

impl HealthThresholds {
    #[must_use]
    pub fn evaluate(&self, sample: &HealthSample) -> BrowserState {
        let breached = self.max_cpu_percent.is_some_and(|m| sample.cpu_percent > m)
            || self.max_memory_mb.is_some_and(|m| sample.memory_mb > m)
            || self.max_error_rate.is_some_and(|m| sample.error_rate > m)
            || self.max_response_time_ms.is_some_and(|m| sample.response_time_ms > m);
        if breached {
            BrowserState::Degraded
        } else {
            BrowserState::Healthy
        }
    }
}

struct BrowserRecord {
    session_id: String,
    state: BrowserState,
    recovery_attempts: u32,
    last_health_check: Option<Instant>,
}

/// Tracks every registered browser's health and drives crash recovery with
/// exponential backoff (starts at 5s, doubles per attempt, capped at
/// `max_recovery_attempts`). Recovery is single-flight per browser id: a
/// concurrent crash report arriving while one is already `Recovering` is
/// coalesced into the in-flight attempt rather than starting a second one.
pub struct BrowserRecovery {
    browsers: DashMap<String, BrowserRecord>,
    recovery_locks: DashMap<String, Arc<Mutex<()>>>,
    thresholds: HealthThresholds,
    max_recovery_attempts: u32,
    initial_backoff: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl BrowserRecovery {
    #[must_use]
    pub fn new(max_recovery_attempts: u32, event_bus: Option<Arc<EventBus>>) -> Self {
        Self {
            browsers: DashMap::new(),
            recovery_locks: DashMap::new(),
            thresholds: HealthThresholds::default(),
            max_recovery_attempts,
            initial_backoff: Duration::from_secs(5),
            event_bus,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn register(&self, browser_id: &str, session_id: &str) {
        self.browsers.insert(
            browser_id.to_string(),
            BrowserRecord {
                session_id: session_id.to_string(),
                state: BrowserState::Unknown,
                recovery_attempts: 0,
                last_health_check: None,
            },
        );
    }

    #[must_use]
    pub fn state(&self, browser_id: &str) -> Option<BrowserState> {
        self.browsers.get(browser_id).map(|r| r.state)
    }

    /// Evaluates a fresh health sample against the configured thresholds
    /// and updates the browser's recorded state.
    pub async fn record_health(&self, browser_id: &str, sample: HealthSample) {
        let new_state = self.thresholds.evaluate(&sample);
        let previous = {
            let mut entry = self.browsers.entry(browser_id.to_string()).or_insert_with(|| BrowserRecord {
                session_id: String::new(),
                state: BrowserState::Unknown,
                recovery_attempts: 0,
                last_health_check: None,
            });
            let previous = entry.state;
            // A browser mid-recovery shouldn't have its state clobbered by
            // a stale health sample racing the recovery task.
            if entry.state != BrowserState::Recovering && entry.state != BrowserState::Terminated {
                entry.state = new_state;
            }
            entry.last_health_check = Some(Instant::now());
            previous
        };

        if previous != new_state && new_state == BrowserState::Degraded {
            self.publish(browser_id, previous, new_state, 0).await;
        }
    }

    async fn publish(&self, browser_id: &str, from: BrowserState, to: BrowserState, attempt: u32) {
        let Some(bus) = &self.event_bus else { return };
        let _ = bus
            .publish(EngineEvent::recovery(browser_id, from.as_str(), to.as_str(), attempt))
            .await;
    }

    /// Reports a crash and drives recovery to completion. Concurrent
    /// reports for the same browser id share one recovery attempt via the
    /// per-browser lock; the second caller simply observes the first
    /// caller's outcome once the lock is released.
    pub async fn report_crash<F, Fut>(&self, browser_id: &str, restart: F) -> ResilienceResult<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let lock = self
            .recovery_locks
            .entry(browser_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let already_recovered = self
            .browsers
            .get(browser_id)
            .map(|r| r.state == BrowserState::Healthy)
            .unwrap_or(false);
        if already_recovered {
            return Ok(());
        }

        {
            let mut entry = self.browsers.entry(browser_id.to_string()).or_insert_with(|| BrowserRecord {
                session_id: String::new(),
                state: BrowserState::Unknown,
                recovery_attempts: 0,
                last_health_check: None,
            });
            entry.state = BrowserState::Crashed;
        }
        self.publish(browser_id, BrowserState::Healthy, BrowserState::Crashed, 0).await;

        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_recovery_attempts {
            {
                let mut entry = self.browsers.get_mut(browser_id).expect("inserted above");
                entry.state = BrowserState::Recovering;
                entry.recovery_attempts = attempt;
            }
            self.publish(browser_id, BrowserState::Crashed, BrowserState::Recovering, attempt).await;

            tokio::time::sleep(backoff).await;
            if restart().await {
                let mut entry = self.browsers.get_mut(browser_id).expect("inserted above");
                entry.state = BrowserState::Healthy;
                drop(entry);
                self.publish(browser_id, BrowserState::Recovering, BrowserState::Healthy, attempt).await;
                return Ok(());
            }
            backoff *= 2;
        }

        let mut entry = self.browsers.get_mut(browser_id).expect("inserted above");
        entry.state = BrowserState::Crashed;
        drop(entry);
        self.publish(browser_id, BrowserState::Recovering, BrowserState::Crashed, self.max_recovery_attempts)
            .await;
        Err(ResilienceError::BrowserManager {
            browser_id: browser_id.to_string(),
            attempts: self.max_recovery_attempts,
        })
    }

    #[must_use]
    pub fn session_id(&self, browser_id: &str) -> Option<String> {
        self.browsers.get(browser_id).map(|r| r.session_id.clone())
    }

    #[must_use]
    pub fn all_states(&self) -> HashMap<String, BrowserState> {
        self.browsers.iter().map(|e| (e.key().clone(), e.value().state)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn recovers_on_first_successful_restart() {
        let recovery = BrowserRecovery::new(3, None).with_initial_backoff(Duration::from_millis(1));
        recovery.register("b1", "s1");
        let result = recovery.report_crash("b1", || async { true }).await;
        assert!(result.is_ok());
        assert_eq!(recovery.state("b1"), Some(BrowserState::Healthy));
    }

    #[tokio::test]
    async fn exhausts_attempts_and_stays_crashed() {
        let recovery = BrowserRecovery::new(2, None).with_initial_backoff(Duration::from_millis(1));
        recovery.register("b1", "s1");
        let result = recovery.report_crash("b1", || async { false }).await;
        assert!(result.is_err());
        assert_eq!(recovery.state("b1"), Some(BrowserState::Crashed));
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let recovery = BrowserRecovery::new(3, None)
            .with_thresholds(HealthThresholds::default())
            .with_initial_backoff(Duration::from_millis(1));
        recovery.register("b1", "s1");
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result = recovery
            .report_crash("b1", move || {
                let attempts = attempts_clone.clone();
                async move { attempts.fetch_add(1, Ordering::SeqCst) >= 1 }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(recovery.state("b1"), Some(BrowserState::Healthy));
    }

    #[tokio::test]
    async fn degraded_health_sample_updates_state() {
        let recovery = BrowserRecovery::new(3, None);
        recovery.register("b1", "s1");
        recovery
            .record_health("b1", HealthSample { cpu_percent: 99.0, ..Default::default() })
            .await;
        assert_eq!(recovery.state("b1"), Some(BrowserState::Degraded));
    }
}
