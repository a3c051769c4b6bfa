//! Anti-detection masker: a single pre-navigation init script that
//! removes the automation tells headless Chrome otherwise exposes.
//!
//! Grounded in `kromekover::inject`: same idea (one script registered
//! before any page script runs, parameterized by a small config object),
//! adapted from raw CDP `AddScriptToEvaluateOnNewDocumentParams` calls
//! against many files to a single string through
//! `BrowserDriver::inject_init_script`, driven by [`EngineConfig`]'s
//! `mask_*` flags instead of a fixed evasion-script list.

use crate::config::EngineConfig;
use crate::driver::BrowserDriver;

use super::errors::{StealthError, StealthResult};

/// Which evasions [`AntiDetectionMasker::apply`] installed versus left out,
/// reported back to the stealth orchestrator for its `StealthApplied` event.
#[derive(Debug, Clone, Default)]
pub struct MaskerReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct AntiDetectionMasker {
    mask_webdriver: bool,
    mask_playwright_indicators: bool,
    mask_process: bool,
    graceful_degradation: bool,
}

impl AntiDetectionMasker {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mask_webdriver: config.mask_webdriver(),
            mask_playwright_indicators: config.mask_playwright_indicators(),
            mask_process: config.mask_process(),
            graceful_degradation: config.graceful_degradation(),
        }
    }

    /// Registers the composed init script on `driver`. When
    /// `graceful_degradation` is set, an injection failure is logged and
    /// swallowed rather than propagated, so a fingerprint-only stealth
    /// profile isn't aborted for a DOM-masking hiccup.
    pub async fn apply(&self, driver: &dyn BrowserDriver) -> StealthResult<MaskerReport> {
        let mut report = MaskerReport::default();
        let mut script = String::new();

        if self.mask_webdriver {
            script.push_str(WEBDRIVER_EVASION);
            report.applied.push("webdriver".into());
        } else {
            report.skipped.push("webdriver".into());
        }

        if self.mask_playwright_indicators {
            script.push_str(PLAYWRIGHT_EVASION);
            report.applied.push("playwright_indicators".into());
        } else {
            report.skipped.push("playwright_indicators".into());
        }

        if self.mask_process {
            script.push_str(PROCESS_EVASION);
            report.applied.push("process".into());
        } else {
            report.skipped.push("process".into());
        }

        script.push_str(PERMISSIONS_EVASION);
        report.applied.push("permissions_query".into());

        if script.is_empty() {
            return Ok(report);
        }

        match driver.inject_init_script(&script).await {
            Ok(()) => Ok(report),
            Err(e) if self.graceful_degradation => {
                tracing::warn!(error = %e, "anti-detection script injection failed, continuing without it");
                report.applied.clear();
                report.skipped = vec!["webdriver".into(), "playwright_indicators".into(), "process".into(), "permissions_query".into()];
                Ok(report)
            }
            Err(e) => Err(StealthError::MaskInjection(e.to_string())),
        }
    }
}

/// Deletes `navigator.webdriver` on both the live object and its prototype,
/// restores the console methods CDP instrumentation tends to leave patched,
/// and backfills a plausible `navigator.plugins` list.
const WEBDRIVER_EVASION: &str = r#"
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined, configurable: true });
        delete Navigator.prototype.webdriver;
    } catch (e) {}
    try {
        const plugins = [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
            { name: 'Native Client', filename: 'internal-nacl-plugin' },
        ];
        Object.defineProperty(navigator, 'plugins', { get: () => plugins, configurable: true });
    } catch (e) {}
})();
"#;

/// Neutralizes the Chrome-only globals headless automation frameworks
/// probe for (`chrome.loadTimes`, `chrome.csi`), without removing
/// `window.chrome` itself since its absence is its own tell.
const PLAYWRIGHT_EVASION: &str = r#"
(() => {
    try {
        window.chrome = window.chrome || {};
        window.chrome.loadTimes = () => ({});
        window.chrome.csi = () => ({});
    } catch (e) {}
})();
"#;

/// Hides the Node-style `process` global some older detection scripts
/// check for as a sign of a non-browser automation harness.
const PROCESS_EVASION: &str = r#"
(() => {
    try {
        if (typeof window.process !== 'undefined') {
            delete window.process;
        }
    } catch (e) {}
})();
"#;

/// Forces `navigator.permissions.query({name: 'notifications'})` to report
/// `granted` rather than the `denied`/`default` state automation-launched
/// Chrome returns by default, which several fingerprinting libraries treat
/// as a headless signal on its own.
const PERMISSIONS_EVASION: &str = r#"
(() => {
    try {
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) =>
            parameters.name === 'notifications'
                ? Promise.resolve({ state: 'granted' })
                : originalQuery(parameters);
    } catch (e) {}
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfigBuilder;
    use crate::driver::fake::FakeDriver;

    #[tokio::test]
    async fn applies_all_default_evasions() {
        let config = EngineConfigBuilder::new().snapshot_dir("/tmp/snap").build().unwrap();
        let masker = AntiDetectionMasker::from_config(&config);
        let driver = FakeDriver::new("<html></html>", "https://example.test");

        let report = masker.apply(&driver).await.unwrap();
        assert!(report.applied.contains(&"webdriver".to_string()));
        assert!(report.applied.contains(&"permissions_query".to_string()));
        assert!(driver.init_scripts().iter().any(|s| s.contains("navigator.webdriver") || s.contains("webdriver")));
    }

    #[tokio::test]
    async fn disabled_flags_are_reported_as_skipped() {
        let config = EngineConfigBuilder::new()
            .mask_webdriver(false)
            .mask_playwright_indicators(false)
            .mask_process(false)
            .snapshot_dir("/tmp/snap")
            .build()
            .unwrap();
        let masker = AntiDetectionMasker::from_config(&config);
        let driver = FakeDriver::new("<html></html>", "https://example.test");

        let report = masker.apply(&driver).await.unwrap();
        assert!(report.skipped.contains(&"webdriver".to_string()));
        assert!(report.skipped.contains(&"playwright_indicators".to_string()));
        assert!(report.skipped.contains(&"process".to_string()));
        assert!(report.applied.contains(&"permissions_query".to_string()));
    }
}
