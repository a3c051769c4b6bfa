//! Consent handler: a pattern bank of cookie/GDPR dialog
//! shapes, matched against the live DOM and dismissed under a timeout.
//!
//! Grounded in `original_source/src/stealth/consent_handler.py`. That
//! source's default patterns lean on Playwright's `:has-text()` pseudo
//! selector, which the plain-CSS `BrowserDriver::query_selector` surface
//! doesn't support; `text_heuristics` takes over that role here, checked
//! against the dialog's own text content instead of baked into the
//! selector string.

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::driver::BrowserDriver;

use super::errors::{StealthError, StealthResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentPattern {
    pub name: String,
    pub dialog_selector: String,
    pub accept_button_selector: String,
    pub text_heuristics: Vec<String>,
}

impl ConsentPattern {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dialog_selector: impl Into<String>,
        accept_button_selector: impl Into<String>,
        text_heuristics: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dialog_selector: dialog_selector.into(),
            accept_button_selector: accept_button_selector.into(),
            text_heuristics,
        }
    }
}

fn standard_patterns() -> Vec<ConsentPattern> {
    vec![
        ConsentPattern::new(
            "cookie_banner",
            "#cookie-banner, .cookie-banner, [class*='cookie-consent'], [id*='cookie-consent']",
            "#cookie-accept, .cookie-accept, button[class*='accept']",
            vec!["accept".into(), "agree".into(), "got it".into()],
        ),
        ConsentPattern::new(
            "gdpr_modal",
            "#gdpr-modal, .gdpr-modal, [class*='gdpr'], [id*='gdpr']",
            "#gdpr-accept, .gdpr-accept, button[class*='consent']",
            vec!["i agree".into(), "accept all".into(), "consent".into()],
        ),
        ConsentPattern::new(
            "generic_modal",
            "[role='dialog'], .modal-overlay, .consent-overlay",
            ".modal-overlay button, .consent-overlay button, [role='dialog'] button",
            vec!["ok".into(), "continue".into(), "accept".into()],
        ),
    ]
}

/// Detects and dismisses consent dialogs. Custom patterns are registered
/// at runtime and checked ahead of the default bank.
pub struct ConsentHandler {
    custom_patterns: RwLock<Vec<ConsentPattern>>,
    standard_patterns: Vec<ConsentPattern>,
}

impl ConsentHandler {
    #[must_use]
    pub fn new() -> Self {
        Self { custom_patterns: RwLock::new(Vec::new()), standard_patterns: standard_patterns() }
    }

    pub fn register_pattern(&self, pattern: ConsentPattern) {
        self.custom_patterns.write().push(pattern);
    }

    #[must_use]
    pub fn available_patterns(&self) -> Vec<ConsentPattern> {
        let mut patterns = self.custom_patterns.read().clone();
        patterns.extend(self.standard_patterns.iter().cloned());
        patterns
    }

    /// Finds the first registered pattern whose dialog selector resolves
    /// and whose text heuristics (if any) match the page's visible text.
    pub async fn detect_dialog(&self, driver: &dyn BrowserDriver) -> StealthResult<Option<ConsentPattern>> {
        for pattern in self.available_patterns() {
            if driver.query_selector(&pattern.dialog_selector).await?.is_none() {
                continue;
            }
            if pattern.text_heuristics.is_empty() {
                return Ok(Some(pattern));
            }
            let mut matched = false;
            for keyword in &pattern.text_heuristics {
                if !driver.find_by_text(keyword, false, None).await?.is_empty() {
                    matched = true;
                    break;
                }
            }
            if matched {
                return Ok(Some(pattern));
            }
        }
        Ok(None)
    }

    /// Clicks the accept button for `pattern`.
    pub async fn accept_consent(&self, driver: &dyn BrowserDriver, pattern: &ConsentPattern) -> StealthResult<()> {
        driver.click(&pattern.accept_button_selector).await?;
        Ok(())
    }

    /// Races dialog detection against `timeout`; on a hit, clicks accept
    /// and (unless `verify_dismissal` is false) confirms the dialog
    /// selector no longer resolves.
    pub async fn detect_and_accept(
        &self,
        driver: &dyn BrowserDriver,
        timeout: Duration,
        verify_dismissal: bool,
    ) -> StealthResult<bool> {
        let detection = tokio::time::timeout(timeout, async {
            loop {
                if let Some(pattern) = self.detect_dialog(driver).await? {
                    return Ok::<_, StealthError>(Some(pattern));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        let pattern = match detection {
            Ok(Ok(Some(pattern))) => pattern,
            Ok(Ok(None)) | Err(_) => return Ok(false),
            Ok(Err(e)) => return Err(e),
        };

        self.accept_consent(driver, &pattern).await?;

        if verify_dismissal {
            self.wait_for_dialog_dismiss(driver, &pattern, Duration::from_secs(5)).await?;
        }
        Ok(true)
    }

    pub async fn wait_for_dialog_dismiss(
        &self,
        driver: &dyn BrowserDriver,
        pattern: &ConsentPattern,
        timeout: Duration,
    ) -> StealthResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if driver.query_selector(&pattern.dialog_selector).await?.is_none() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn validate_no_dialog(&self, driver: &dyn BrowserDriver) -> StealthResult<bool> {
        Ok(self.detect_dialog(driver).await?.is_none())
    }
}

impl Default for ConsentHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;

    #[tokio::test]
    async fn detects_registered_custom_pattern_first() {
        let driver = FakeDriver::new(
            r#"<div id="my-banner"><button id="my-accept">Accept</button></div>"#,
            "https://example.test",
        );
        let handler = ConsentHandler::new();
        handler.register_pattern(ConsentPattern::new("custom", "#my-banner", "#my-accept", vec![]));

        let detected = handler.detect_dialog(&driver).await.unwrap();
        assert_eq!(detected.unwrap().name, "custom");
    }

    #[tokio::test]
    async fn no_dialog_means_no_detection() {
        let driver = FakeDriver::new(r#"<div id="content">hello</div>"#, "https://example.test");
        let handler = ConsentHandler::new();
        assert!(handler.detect_dialog(&driver).await.unwrap().is_none());
        assert!(handler.validate_no_dialog(&driver).await.unwrap());
    }
}
