use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::selectors::ConfidenceWeights;

/// Engine-wide configuration. Every field here is a knob some component in
/// `selectors`, `stealth`, or `resilience` reads at construction time; none
/// of it is mutated once the engine is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for the snapshot store. Always an
    /// absolute path, normalized in the builder.
    pub(crate) snapshot_dir: PathBuf,
    pub(crate) compress_snapshots: bool,
    pub(crate) compression_threshold_bytes: usize,

    /// Per-strategy resolution timeout. Default 2000ms.
    pub(crate) strategy_timeout_ms: u64,
    pub(crate) confidence_weights: ConfidenceWeights,
    /// Minimum confidence a `SelectorResult` must reach to be accepted
    /// without triggering a lower-priority strategy fallback.
    pub(crate) min_acceptable_confidence: f32,

    pub(crate) circuit_breaker_failure_threshold: u32,
    pub(crate) circuit_breaker_success_threshold: u32,
    pub(crate) circuit_breaker_half_open_timeout_secs: u64,

    pub(crate) max_tab_concurrency: usize,
    pub(crate) max_tab_concurrency_per_domain: usize,
    pub(crate) max_page_retries: u8,

    pub(crate) stealth_enabled: bool,
    pub(crate) headless: bool,
    /// Chrome user data directory; when unset a unique temp profile is
    /// created per browser context.
    pub(crate) chrome_data_dir: Option<PathBuf>,

    /// Abort subsystem rate limiting.
    pub(crate) abort_cooldown_secs: u64,
    pub(crate) abort_max_per_hour: u32,

    // --- Stealth (components D-I) ---
    pub(crate) fingerprint_consistency: FingerprintConsistency,
    pub(crate) proxy_enabled: bool,
    pub(crate) proxy_rotation: ProxyRotation,
    pub(crate) proxy_cooldown_seconds: u64,
    pub(crate) behavior_intensity: BehaviorIntensity,
    pub(crate) click_hesitation_ms_range: (u64, u64),
    pub(crate) scroll_variation: f32,
    pub(crate) micro_delay_ms_range: (u64, u64),
    pub(crate) consent_timeout_seconds: u64,
    pub(crate) mask_webdriver: bool,
    pub(crate) mask_playwright_indicators: bool,
    pub(crate) mask_process: bool,
    pub(crate) graceful_degradation: bool,

    // --- Resilience (components P-U) ---
    pub(crate) health_check_interval_s: u64,
    pub(crate) crash_detection_timeout_s: u64,
    pub(crate) max_recovery_attempts: u32,
    pub(crate) max_tab_retries: u32,
    pub(crate) degradation_emergency_failure_count: u32,
    pub(crate) checkpoint_snapshot_retention: usize,
    pub(crate) checkpoint_snapshot_max_age_secs: u64,

    #[serde(skip)]
    pub(crate) event_bus: Option<Arc<crate::events::EventBus>>,
}

/// How tightly a generated fingerprint must hold together internally.
/// `Strict` rejects on the first coherence-predicate failure; `Relaxed`
/// only falls back after repeated generation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintConsistency {
    Strict,
    Moderate,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyRotation {
    PerMatch,
    PerSession,
    PerTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorIntensity {
    Conservative,
    Moderate,
    Aggressive,
}

impl EngineConfig {
    #[must_use]
    pub fn builder() -> super::builder::EngineConfigBuilder<()> {
        super::builder::EngineConfigBuilder::default()
    }

    #[must_use]
    pub fn snapshot_dir(&self) -> &std::path::Path {
        &self.snapshot_dir
    }

    #[must_use]
    pub fn compress_snapshots(&self) -> bool {
        self.compress_snapshots
    }

    #[must_use]
    pub fn compression_threshold_bytes(&self) -> usize {
        self.compression_threshold_bytes
    }

    #[must_use]
    pub fn strategy_timeout_ms(&self) -> u64 {
        self.strategy_timeout_ms
    }

    #[must_use]
    pub fn confidence_weights(&self) -> &ConfidenceWeights {
        &self.confidence_weights
    }

    #[must_use]
    pub fn min_acceptable_confidence(&self) -> f32 {
        self.min_acceptable_confidence
    }

    #[must_use]
    pub fn circuit_breaker_failure_threshold(&self) -> u32 {
        self.circuit_breaker_failure_threshold
    }

    #[must_use]
    pub fn circuit_breaker_success_threshold(&self) -> u32 {
        self.circuit_breaker_success_threshold
    }

    #[must_use]
    pub fn circuit_breaker_half_open_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.circuit_breaker_half_open_timeout_secs)
    }

    #[must_use]
    pub fn max_tab_concurrency(&self) -> usize {
        self.max_tab_concurrency
    }

    #[must_use]
    pub fn max_tab_concurrency_per_domain(&self) -> usize {
        self.max_tab_concurrency_per_domain
    }

    #[must_use]
    pub fn max_page_retries(&self) -> u8 {
        self.max_page_retries
    }

    #[must_use]
    pub fn stealth_enabled(&self) -> bool {
        self.stealth_enabled
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn chrome_data_dir(&self) -> Option<&PathBuf> {
        self.chrome_data_dir.as_ref()
    }

    #[must_use]
    pub fn abort_cooldown_secs(&self) -> u64 {
        self.abort_cooldown_secs
    }

    #[must_use]
    pub fn abort_max_per_hour(&self) -> u32 {
        self.abort_max_per_hour
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<crate::events::EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    #[must_use]
    pub fn event_bus(&self) -> Option<&Arc<crate::events::EventBus>> {
        self.event_bus.as_ref()
    }

    #[must_use]
    pub fn with_chrome_data_dir(mut self, dir: PathBuf) -> Self {
        self.chrome_data_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn fingerprint_consistency(&self) -> FingerprintConsistency {
        self.fingerprint_consistency
    }

    #[must_use]
    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled
    }

    #[must_use]
    pub fn proxy_rotation(&self) -> ProxyRotation {
        self.proxy_rotation
    }

    #[must_use]
    pub fn proxy_cooldown(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.proxy_cooldown_seconds)
    }

    #[must_use]
    pub fn behavior_intensity(&self) -> BehaviorIntensity {
        self.behavior_intensity
    }

    #[must_use]
    pub fn click_hesitation_ms_range(&self) -> (u64, u64) {
        self.click_hesitation_ms_range
    }

    #[must_use]
    pub fn scroll_variation(&self) -> f32 {
        self.scroll_variation
    }

    #[must_use]
    pub fn micro_delay_ms_range(&self) -> (u64, u64) {
        self.micro_delay_ms_range
    }

    #[must_use]
    pub fn consent_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.consent_timeout_seconds)
    }

    #[must_use]
    pub fn mask_webdriver(&self) -> bool {
        self.mask_webdriver
    }

    #[must_use]
    pub fn mask_playwright_indicators(&self) -> bool {
        self.mask_playwright_indicators
    }

    #[must_use]
    pub fn mask_process(&self) -> bool {
        self.mask_process
    }

    #[must_use]
    pub fn graceful_degradation(&self) -> bool {
        self.graceful_degradation
    }

    #[must_use]
    pub fn health_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.health_check_interval_s)
    }

    #[must_use]
    pub fn crash_detection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.crash_detection_timeout_s)
    }

    #[must_use]
    pub fn max_recovery_attempts(&self) -> u32 {
        self.max_recovery_attempts
    }

    #[must_use]
    pub fn max_tab_retries(&self) -> u32 {
        self.max_tab_retries
    }

    #[must_use]
    pub fn degradation_emergency_failure_count(&self) -> u32 {
        self.degradation_emergency_failure_count
    }

    #[must_use]
    pub fn checkpoint_snapshot_retention(&self) -> usize {
        self.checkpoint_snapshot_retention
    }

    #[must_use]
    pub fn checkpoint_snapshot_max_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.checkpoint_snapshot_max_age_secs)
    }
}
