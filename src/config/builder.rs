//! Typestate builder for [`EngineConfig`], following the same pattern the
//! crawl engine's own config builder uses: required fields flip a phantom
//! marker so `.build()` only exists once they're set.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::Result;

use crate::selectors::ConfidenceWeights;

use super::types::{BehaviorIntensity, EngineConfig, FingerprintConsistency, ProxyRotation};

pub struct WithSnapshotDir;

pub struct EngineConfigBuilder<State = ()> {
    pub(crate) snapshot_dir: Option<PathBuf>,
    pub(crate) compress_snapshots: bool,
    pub(crate) compression_threshold_bytes: usize,
    pub(crate) strategy_timeout_ms: u64,
    pub(crate) confidence_weights: ConfidenceWeights,
    pub(crate) min_acceptable_confidence: f32,
    pub(crate) circuit_breaker_failure_threshold: u32,
    pub(crate) circuit_breaker_success_threshold: u32,
    pub(crate) circuit_breaker_half_open_timeout_secs: u64,
    pub(crate) max_tab_concurrency: usize,
    pub(crate) max_tab_concurrency_per_domain: usize,
    pub(crate) max_page_retries: u8,
    pub(crate) stealth_enabled: bool,
    pub(crate) headless: bool,
    pub(crate) chrome_data_dir: Option<PathBuf>,
    pub(crate) abort_cooldown_secs: u64,
    pub(crate) abort_max_per_hour: u32,
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
    pub(crate) health_check_interval_s: u64,
    pub(crate) crash_detection_timeout_s: u64,
    pub(crate) max_recovery_attempts: u32,
    pub(crate) max_tab_retries: u32,
    pub(crate) degradation_emergency_failure_count: u32,
    pub(crate) checkpoint_snapshot_retention: usize,
    pub(crate) checkpoint_snapshot_max_age_secs: u64,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for EngineConfigBuilder<()> {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            compress_snapshots: false,
            compression_threshold_bytes: 1_048_576,
            strategy_timeout_ms: 2_000,
            confidence_weights: ConfidenceWeights::default(),
            min_acceptable_confidence: 0.5,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_success_threshold: 2,
            circuit_breaker_half_open_timeout_secs: 300,
            max_tab_concurrency: 10,
            max_tab_concurrency_per_domain: 2,
            max_page_retries: 3,
            stealth_enabled: true,
            headless: true,
            chrome_data_dir: None,
            abort_cooldown_secs: 60,
            abort_max_per_hour: 10,
            fingerprint_consistency: FingerprintConsistency::Moderate,
            proxy_enabled: false,
            proxy_rotation: ProxyRotation::PerMatch,
            proxy_cooldown_seconds: 600,
            behavior_intensity: BehaviorIntensity::Moderate,
            click_hesitation_ms_range: (50, 2_500),
            scroll_variation: 0.3,
            micro_delay_ms_range: (10, 150),
            consent_timeout_seconds: 10,
            mask_webdriver: true,
            mask_playwright_indicators: true,
            mask_process: true,
            graceful_degradation: true,
            health_check_interval_s: 30,
            crash_detection_timeout_s: 60,
            max_recovery_attempts: 3,
            max_tab_retries: 3,
            degradation_emergency_failure_count: 10,
            checkpoint_snapshot_retention: 50,
            checkpoint_snapshot_max_age_secs: 3_600,
            _phantom: PhantomData,
        }
    }
}

impl EngineConfigBuilder<()> {
    #[must_use]
    pub fn snapshot_dir(self, dir: impl Into<PathBuf>) -> EngineConfigBuilder<WithSnapshotDir> {
        EngineConfigBuilder {
            snapshot_dir: Some(dir.into()),
            compress_snapshots: self.compress_snapshots,
            compression_threshold_bytes: self.compression_threshold_bytes,
            strategy_timeout_ms: self.strategy_timeout_ms,
            confidence_weights: self.confidence_weights,
            min_acceptable_confidence: self.min_acceptable_confidence,
            circuit_breaker_failure_threshold: self.circuit_breaker_failure_threshold,
            circuit_breaker_success_threshold: self.circuit_breaker_success_threshold,
            circuit_breaker_half_open_timeout_secs: self.circuit_breaker_half_open_timeout_secs,
            max_tab_concurrency: self.max_tab_concurrency,
            max_tab_concurrency_per_domain: self.max_tab_concurrency_per_domain,
            max_page_retries: self.max_page_retries,
            stealth_enabled: self.stealth_enabled,
            headless: self.headless,
            chrome_data_dir: self.chrome_data_dir,
            abort_cooldown_secs: self.abort_cooldown_secs,
            abort_max_per_hour: self.abort_max_per_hour,
            fingerprint_consistency: self.fingerprint_consistency,
            proxy_enabled: self.proxy_enabled,
            proxy_rotation: self.proxy_rotation,
            proxy_cooldown_seconds: self.proxy_cooldown_seconds,
            behavior_intensity: self.behavior_intensity,
            click_hesitation_ms_range: self.click_hesitation_ms_range,
            scroll_variation: self.scroll_variation,
            micro_delay_ms_range: self.micro_delay_ms_range,
            consent_timeout_seconds: self.consent_timeout_seconds,
            mask_webdriver: self.mask_webdriver,
            mask_playwright_indicators: self.mask_playwright_indicators,
            mask_process: self.mask_process,
            graceful_degradation: self.graceful_degradation,
            health_check_interval_s: self.health_check_interval_s,
            crash_detection_timeout_s: self.crash_detection_timeout_s,
            max_recovery_attempts: self.max_recovery_attempts,
            max_tab_retries: self.max_tab_retries,
            degradation_emergency_failure_count: self.degradation_emergency_failure_count,
            checkpoint_snapshot_retention: self.checkpoint_snapshot_retention,
            checkpoint_snapshot_max_age_secs: self.checkpoint_snapshot_max_age_secs,
            _phantom: PhantomData,
        }
    }
}

impl EngineConfigBuilder<WithSnapshotDir> {
    #[must_use]
    pub fn build(self) -> Result<EngineConfig> {
        let snapshot_dir = self
            .snapshot_dir
            .expect("typestate guarantees snapshot_dir is set");
        let snapshot_dir = if snapshot_dir.is_absolute() {
            snapshot_dir
        } else {
            std::env::current_dir()?.join(snapshot_dir)
        };

        Ok(EngineConfig {
            snapshot_dir,
            compress_snapshots: self.compress_snapshots,
            compression_threshold_bytes: self.compression_threshold_bytes,
            strategy_timeout_ms: self.strategy_timeout_ms,
            confidence_weights: self.confidence_weights,
            min_acceptable_confidence: self.min_acceptable_confidence,
            circuit_breaker_failure_threshold: self.circuit_breaker_failure_threshold,
            circuit_breaker_success_threshold: self.circuit_breaker_success_threshold,
            circuit_breaker_half_open_timeout_secs: self.circuit_breaker_half_open_timeout_secs,
            max_tab_concurrency: self.max_tab_concurrency,
            max_tab_concurrency_per_domain: self.max_tab_concurrency_per_domain,
            max_page_retries: self.max_page_retries,
            stealth_enabled: self.stealth_enabled,
            headless: self.headless,
            chrome_data_dir: self.chrome_data_dir,
            abort_cooldown_secs: self.abort_cooldown_secs,
            abort_max_per_hour: self.abort_max_per_hour,
            fingerprint_consistency: self.fingerprint_consistency,
            proxy_enabled: self.proxy_enabled,
            proxy_rotation: self.proxy_rotation,
            proxy_cooldown_seconds: self.proxy_cooldown_seconds,
            behavior_intensity: self.behavior_intensity,
            click_hesitation_ms_range: self.click_hesitation_ms_range,
            scroll_variation: self.scroll_variation,
            micro_delay_ms_range: self.micro_delay_ms_range,
            consent_timeout_seconds: self.consent_timeout_seconds,
            mask_webdriver: self.mask_webdriver,
            mask_playwright_indicators: self.mask_playwright_indicators,
            mask_process: self.mask_process,
            graceful_degradation: self.graceful_degradation,
            health_check_interval_s: self.health_check_interval_s,
            crash_detection_timeout_s: self.crash_detection_timeout_s,
            max_recovery_attempts: self.max_recovery_attempts,
            max_tab_retries: self.max_tab_retries,
            degradation_emergency_failure_count: self.degradation_emergency_failure_count,
            checkpoint_snapshot_retention: self.checkpoint_snapshot_retention,
            checkpoint_snapshot_max_age_secs: self.checkpoint_snapshot_max_age_secs,
            event_bus: None,
        })
    }
}

impl<State> EngineConfigBuilder<State> {
    #[must_use]
    pub fn compress_snapshots(mut self, yes: bool) -> Self {
        self.compress_snapshots = yes;
        self
    }

    #[must_use]
    pub fn strategy_timeout_ms(mut self, ms: u64) -> Self {
        self.strategy_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn confidence_weights(mut self, weights: ConfidenceWeights) -> Self {
        self.confidence_weights = weights;
        self
    }

    #[must_use]
    pub fn min_acceptable_confidence(mut self, threshold: f32) -> Self {
        self.min_acceptable_confidence = threshold.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn circuit_breaker_failure_threshold(mut self, n: u32) -> Self {
        self.circuit_breaker_failure_threshold = n;
        self
    }

    #[must_use]
    pub fn max_tab_concurrency(mut self, n: usize) -> Self {
        self.max_tab_concurrency = n;
        self
    }

    #[must_use]
    pub fn max_tab_concurrency_per_domain(mut self, n: usize) -> Self {
        self.max_tab_concurrency_per_domain = n;
        self
    }

    #[must_use]
    pub fn max_page_retries(mut self, n: u8) -> Self {
        self.max_page_retries = n;
        self
    }

    #[must_use]
    pub fn stealth_enabled(mut self, yes: bool) -> Self {
        self.stealth_enabled = yes;
        self
    }

    #[must_use]
    pub fn headless(mut self, yes: bool) -> Self {
        self.headless = yes;
        self
    }

    #[must_use]
    pub fn chrome_data_dir(mut self, dir: PathBuf) -> Self {
        self.chrome_data_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn abort_cooldown_secs(mut self, secs: u64) -> Self {
        self.abort_cooldown_secs = secs;
        self
    }

    #[must_use]
    pub fn abort_max_per_hour(mut self, n: u32) -> Self {
        self.abort_max_per_hour = n;
        self
    }

    #[must_use]
    pub fn fingerprint_consistency(mut self, level: FingerprintConsistency) -> Self {
        self.fingerprint_consistency = level;
        self
    }

    #[must_use]
    pub fn proxy_enabled(mut self, yes: bool) -> Self {
        self.proxy_enabled = yes;
        self
    }

    #[must_use]
    pub fn proxy_rotation(mut self, rotation: ProxyRotation) -> Self {
        self.proxy_rotation = rotation;
        self
    }

    #[must_use]
    pub fn proxy_cooldown_seconds(mut self, secs: u64) -> Self {
        self.proxy_cooldown_seconds = secs;
        self
    }

    #[must_use]
    pub fn behavior_intensity(mut self, intensity: BehaviorIntensity) -> Self {
        self.behavior_intensity = intensity;
        self
    }

    #[must_use]
    pub fn click_hesitation_ms_range(mut self, range: (u64, u64)) -> Self {
        self.click_hesitation_ms_range = range;
        self
    }

    #[must_use]
    pub fn scroll_variation(mut self, variation: f32) -> Self {
        self.scroll_variation = variation.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn micro_delay_ms_range(mut self, range: (u64, u64)) -> Self {
        self.micro_delay_ms_range = range;
        self
    }

    #[must_use]
    pub fn consent_timeout_seconds(mut self, secs: u64) -> Self {
        self.consent_timeout_seconds = secs;
        self
    }

    #[must_use]
    pub fn mask_webdriver(mut self, yes: bool) -> Self {
        self.mask_webdriver = yes;
        self
    }

    #[must_use]
    pub fn mask_playwright_indicators(mut self, yes: bool) -> Self {
        self.mask_playwright_indicators = yes;
        self
    }

    #[must_use]
    pub fn mask_process(mut self, yes: bool) -> Self {
        self.mask_process = yes;
        self
    }

    #[must_use]
    pub fn graceful_degradation(mut self, yes: bool) -> Self {
        self.graceful_degradation = yes;
        self
    }

    #[must_use]
    pub fn health_check_interval_s(mut self, secs: u64) -> Self {
        self.health_check_interval_s = secs;
        self
    }

    #[must_use]
    pub fn crash_detection_timeout_s(mut self, secs: u64) -> Self {
        self.crash_detection_timeout_s = secs;
        self
    }

    #[must_use]
    pub fn max_recovery_attempts(mut self, n: u32) -> Self {
        self.max_recovery_attempts = n;
        self
    }

    #[must_use]
    pub fn max_tab_retries(mut self, n: u32) -> Self {
        self.max_tab_retries = n;
        self
    }

    #[must_use]
    pub fn degradation_emergency_failure_count(mut self, n: u32) -> Self {
        self.degradation_emergency_failure_count = n;
        self
    }

    #[must_use]
    pub fn checkpoint_snapshot_retention(mut self, n: usize) -> Self {
        self.checkpoint_snapshot_retention = n;
        self
    }

    #[must_use]
    pub fn checkpoint_snapshot_max_age_secs(mut self, secs: u64) -> Self {
        self.checkpoint_snapshot_max_age_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_snapshot_dir() {
        let cfg = EngineConfig::builder()
            .snapshot_dir("/tmp/semscrape-snapshots")
            .strategy_timeout_ms(1_500)
            .build()
            .expect("build should succeed once snapshot_dir is set");
        assert_eq!(cfg.strategy_timeout_ms(), 1_500);
        assert!(cfg.snapshot_dir().is_absolute());
    }
}
