//! Stealth orchestrator: applies components D-H to a single
//! browser context in the fixed order the original coordinator used -
//! fingerprint, then proxy, then anti-detection masking, then consent
//! dismissal - publishing one [`EngineEvent::StealthApplied`] summarizing
//! what was applied versus skipped.
//!
//! Grounded in `original_source/src/stealth/coordinator.py`'s
//! `StealthCoordinator.setup_context`, which runs the same four steps in
//! the same order and treats a subsystem failure as a skip rather than an
//! abort when degraded operation is allowed.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::driver::BrowserDriver;
use crate::events::{EngineEvent, EventBus};

use super::behavior::BehaviorEmulator;
use super::consent::ConsentHandler;
use super::errors::{StealthError, StealthResult};
use super::fingerprint::{BrowserFingerprint, FingerprintNormalizer};
use super::masker::AntiDetectionMasker;
use super::proxy::{ProxyManager, ProxyProvider, ProxySession};

/// Everything the orchestrator established for one context, handed back
/// to the caller so it can drive behavior emulation and proxy teardown
/// later in the session.
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub context_id: String,
    pub fingerprint: Option<BrowserFingerprint>,
    pub proxy_session: Option<ProxySession>,
    pub subsystems_applied: Vec<String>,
    pub subsystems_skipped: Vec<String>,
}

pub struct StealthOrchestrator {
    fingerprint: FingerprintNormalizer,
    proxy_manager: Option<Arc<ProxyManager>>,
    masker: AntiDetectionMasker,
    consent: ConsentHandler,
    behavior: BehaviorEmulator,
    consent_timeout: Duration,
    stealth_enabled: bool,
    graceful_degradation: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl StealthOrchestrator {
    #[must_use]
    pub fn new(config: &EngineConfig, proxy_provider: Option<Arc<dyn ProxyProvider>>) -> Self {
        let proxy_manager = proxy_provider.map(|provider| {
            Arc::new(ProxyManager::new(provider, config.proxy_rotation(), config.proxy_cooldown()))
        });
        Self {
            fingerprint: FingerprintNormalizer::new(true),
            proxy_manager,
            masker: AntiDetectionMasker::from_config(config),
            consent: ConsentHandler::new(),
            behavior: BehaviorEmulator::new(config.behavior_intensity()),
            consent_timeout: config.consent_timeout(),
            stealth_enabled: config.stealth_enabled(),
            graceful_degradation: config.graceful_degradation(),
            event_bus: config.event_bus().cloned(),
        }
    }

    #[must_use]
    pub fn behavior(&self) -> &BehaviorEmulator {
        &self.behavior
    }

    #[must_use]
    pub fn consent_handler(&self) -> &ConsentHandler {
        &self.consent
    }

    #[must_use]
    pub fn proxy_manager(&self) -> Option<&Arc<ProxyManager>> {
        self.proxy_manager.as_ref()
    }

    async fn publish(&self, event: EngineEvent) {
        let Some(bus) = &self.event_bus else { return };
        if let Err(e) = bus.publish(event).await {
            tracing::debug!(error = %e, "stealth event publish failed (best-effort)");
        }
    }

    /// Runs fingerprint -> proxy -> masking -> consent-dismissal against
    /// `driver`, in that order. When `stealth_enabled` is false every step
    /// is skipped and an empty profile is returned - callers still get a
    /// `StealthApplied` event so downstream metrics stay consistent.
    pub async fn setup_context(
        &self,
        driver: &dyn BrowserDriver,
        match_id: &str,
    ) -> StealthResult<StealthProfile> {
        let context_id = Uuid::new_v4().to_string();
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        if !self.stealth_enabled {
            skipped.extend(["fingerprint", "proxy", "mask", "consent"].map(String::from));
            let profile = StealthProfile {
                context_id: context_id.clone(),
                fingerprint: None,
                proxy_session: None,
                subsystems_applied: applied,
                subsystems_skipped: skipped.clone(),
            };
            self.publish(EngineEvent::stealth_applied(context_id, Vec::new(), skipped)).await;
            return Ok(profile);
        }

        let fingerprint = match self.fingerprint.generate(None, None) {
            Ok(fp) => {
                applied.push("fingerprint".to_string());
                Some(fp)
            }
            Err(e) if self.graceful_degradation => {
                tracing::warn!(error = %e, "fingerprint generation failed, continuing without one");
                skipped.push("fingerprint".to_string());
                None
            }
            Err(e) => return Err(e),
        };

        let proxy_session = if let Some(manager) = &self.proxy_manager {
            match manager.get_next_session(match_id, None).await {
                Ok(session) => {
                    if let Some(url) = &session.proxy_url {
                        match driver.set_proxy(url, None, None).await {
                            Ok(()) => applied.push("proxy".to_string()),
                            Err(e) if self.graceful_degradation => {
                                tracing::warn!(error = %e, "proxy bind failed, continuing without one");
                                skipped.push("proxy".to_string());
                            }
                            Err(e) => return Err(StealthError::Driver(e)),
                        }
                    } else {
                        skipped.push("proxy".to_string());
                    }
                    Some(session)
                }
                Err(e) if self.graceful_degradation => {
                    tracing::warn!(error = %e, "proxy session acquisition failed, continuing without one");
                    skipped.push("proxy".to_string());
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            skipped.push("proxy".to_string());
            None
        };

        match self.masker.apply(driver).await {
            Ok(report) => {
                applied.extend(report.applied);
                skipped.extend(report.skipped);
            }
            Err(e) if self.graceful_degradation => {
                tracing::warn!(error = %e, "anti-detection masking failed, continuing without it");
                skipped.push("mask".to_string());
            }
            Err(e) => return Err(e),
        }

        match self.consent.detect_and_accept(driver, self.consent_timeout, true).await {
            Ok(true) => applied.push("consent".to_string()),
            Ok(false) => skipped.push("consent".to_string()),
            Err(e) if self.graceful_degradation => {
                tracing::warn!(error = %e, "consent handling failed, continuing");
                skipped.push("consent".to_string());
            }
            Err(e) => return Err(e),
        }

        self.publish(EngineEvent::stealth_applied(context_id.clone(), applied.clone(), skipped.clone()))
            .await;

        Ok(StealthProfile {
            context_id,
            fingerprint,
            proxy_session,
            subsystems_applied: applied,
            subsystems_skipped: skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfigBuilder;
    use crate::driver::fake::FakeDriver;
    use crate::stealth::proxy::MockProxyProvider;

    #[tokio::test]
    async fn disabled_stealth_skips_everything() {
        let config = EngineConfigBuilder::new()
            .snapshot_dir("/tmp/snap")
            .stealth_enabled(false)
            .build()
            .unwrap();
        let orchestrator = StealthOrchestrator::new(&config, None);
        let driver = FakeDriver::new("<html></html>", "https://example.test");

        let profile = orchestrator.setup_context(&driver, "match-1").await.unwrap();
        assert!(profile.subsystems_applied.is_empty());
        assert_eq!(profile.subsystems_skipped.len(), 4);
    }

    #[tokio::test]
    async fn enabled_stealth_applies_fingerprint_and_mask() {
        let config = EngineConfigBuilder::new().snapshot_dir("/tmp/snap").build().unwrap();
        let orchestrator =
            StealthOrchestrator::new(&config, Some(Arc::new(MockProxyProvider::new())));
        let driver = FakeDriver::new("<html></html>", "https://example.test");

        let profile = orchestrator.setup_context(&driver, "match-1").await.unwrap();
        assert!(profile.fingerprint.is_some());
        assert!(profile.subsystems_applied.contains(&"fingerprint".to_string()));
        assert!(profile.subsystems_applied.contains(&"webdriver".to_string()));
        assert!(profile.subsystems_skipped.contains(&"proxy".to_string()));
    }
}
