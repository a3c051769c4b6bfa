//! Browser driver adapter: the narrow trait every other
//! subsystem is built against, so the resolver/stealth/resilience code
//! never touches `chromiumoxide` directly. A concrete implementation over
//! `chromiumoxide::Page` backs real runs; an in-memory fake over
//! `scraper`/`ego-tree` backs tests.

pub mod chromium;
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;

use crate::selectors::BoundingBox;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("element not found for selector: {0}")]
    NotFound(String),
    #[error("script evaluation failed: {0}")]
    EvalFailed(String),
    #[error("navigation failed: {0}")]
    NavigationFailed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// One live (or simulated) DOM element.
#[async_trait]
pub trait DriverElement: Send + Sync {
    async fn tag_name(&self) -> DriverResult<String>;
    async fn text(&self) -> DriverResult<Option<String>>;
    async fn attribute(&self, name: &str) -> DriverResult<Option<String>>;
    async fn attributes(&self) -> DriverResult<std::collections::HashMap<String, String>>;
    /// Ancestor-chain path string used by the position-stability heuristic.
    async fn dom_path(&self) -> DriverResult<String>;
    async fn is_visible(&self) -> DriverResult<bool>;
    async fn is_interactable(&self) -> DriverResult<bool>;
    async fn bounding_box(&self) -> DriverResult<Option<BoundingBox>>;
}

/// The query/eval/navigate surface every strategy and stealth subsystem
/// needs from a browser context (one tab).
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn query_selector(&self, css: &str) -> DriverResult<Option<Box<dyn DriverElement>>>;
    async fn query_selector_all(&self, css: &str) -> DriverResult<Vec<Box<dyn DriverElement>>>;
    /// Finds elements whose own text contains `pattern`, optionally
    /// restricted to descendants of `scope` (a CSS selector).
    async fn find_by_text(
        &self,
        pattern: &str,
        case_sensitive: bool,
        scope: Option<&str>,
    ) -> DriverResult<Vec<Box<dyn DriverElement>>>;
    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;
    async fn navigate(&self, url: &str) -> DriverResult<()>;
    /// Registers a script to run before any page script on every future
    /// navigation — the hook the stealth masker and fingerprint normalizer
    /// use to install their evasions ahead of page load.
    async fn inject_init_script(&self, script: &str) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;

    /// Raw mouse move to viewport coordinates, the primitive the behavior
    /// emulator (§4.F) samples along its Bézier travel curve.
    async fn mouse_move(&self, x: f64, y: f64) -> DriverResult<()>;
    /// Raw mouse press+release at viewport coordinates.
    async fn mouse_click(&self, x: f64, y: f64) -> DriverResult<()>;
    /// Clicks the first element matching `css` (used for consent-banner
    /// accept buttons, where coordinates aren't known up front).
    async fn click(&self, css: &str) -> DriverResult<()>;
    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()>;
    /// Binds a proxy to this context. Host/port selection happens at
    /// browser-launch time (Chrome has no runtime proxy-server switch);
    /// this call wires up credentials for proxy authentication.
    async fn set_proxy(&self, url: &str, username: Option<&str>, password: Option<&str>) -> DriverResult<()>;

    /// Polls `query_selector` until it resolves or `timeout` elapses.
    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> DriverResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.query_selector(css).await?.is_some() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
