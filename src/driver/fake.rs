//! In-memory [`BrowserDriver`] backed by `scraper`/`ego-tree`, standing in
//! for a real browser in unit and integration tests. No JavaScript runs;
//! `evaluate` only understands the handful of literal scripts this crate
//! itself injects (stealth probes), matched by substring.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ego_tree::NodeId;
use parking_lot::RwLock;
use scraper::{ElementRef, Html, Selector};

use crate::selectors::BoundingBox;

use super::{BrowserDriver, DriverElement, DriverError, DriverResult};

struct FakeState {
    document: Html,
    url: String,
    init_scripts: Vec<String>,
    mouse_position: (f64, f64),
    mouse_moves: Vec<(f64, f64)>,
    clicks: Vec<(f64, f64)>,
    clicked_selectors: Vec<String>,
    scrolls: Vec<(f64, f64)>,
    proxy: Option<(String, Option<String>, Option<String>)>,
}

/// A fake browser context over a fixed HTML string. Useful for exercising
/// the resolver/strategies without a real Chromium process.
pub struct FakeDriver {
    state: RwLock<FakeState>,
}

impl FakeDriver {
    #[must_use]
    pub fn new(html: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(FakeState {
                document: Html::parse_document(html.as_ref()),
                url: url.into(),
                init_scripts: Vec::new(),
                mouse_position: (0.0, 0.0),
                mouse_moves: Vec::new(),
                clicks: Vec::new(),
                clicked_selectors: Vec::new(),
                scrolls: Vec::new(),
                proxy: None,
            }),
        }
    }

    /// Replace the page content in place, as a navigation would.
    pub fn set_html(&self, html: impl AsRef<str>) {
        self.state.write().document = Html::parse_document(html.as_ref());
    }

    #[must_use]
    pub fn init_scripts(&self) -> Vec<String> {
        self.state.read().init_scripts.clone()
    }

    #[must_use]
    pub fn mouse_moves(&self) -> Vec<(f64, f64)> {
        self.state.read().mouse_moves.clone()
    }

    #[must_use]
    pub fn clicks(&self) -> Vec<(f64, f64)> {
        self.state.read().clicks.clone()
    }

    #[must_use]
    pub fn clicked_selectors(&self) -> Vec<String> {
        self.state.read().clicked_selectors.clone()
    }

    #[must_use]
    pub fn scrolls(&self) -> Vec<(f64, f64)> {
        self.state.read().scrolls.clone()
    }

    #[must_use]
    pub fn proxy(&self) -> Option<(String, Option<String>, Option<String>)> {
        self.state.read().proxy.clone()
    }
}

pub struct FakeElement {
    document: Arc<Html>,
    node_id: NodeId,
}

impl FakeElement {
    fn with_ref<T>(&self, f: impl FnOnce(ElementRef<'_>) -> T) -> DriverResult<T> {
        let node_ref = self
            .document
            .tree
            .get(self.node_id)
            .ok_or_else(|| DriverError::NotFound("stale element handle".into()))?;
        let element = ElementRef::wrap(node_ref)
            .ok_or_else(|| DriverError::NotFound("node is not an element".into()))?;
        Ok(f(element))
    }
}

#[async_trait]
impl DriverElement for FakeElement {
    async fn tag_name(&self) -> DriverResult<String> {
        self.with_ref(|el| el.value().name().to_string())
    }

    async fn text(&self) -> DriverResult<Option<String>> {
        self.with_ref(|el| {
            let text: String = el.text().collect();
            if text.is_empty() { None } else { Some(text) }
        })
    }

    async fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        self.with_ref(|el| el.value().attr(name).map(str::to_string))
    }

    async fn attributes(&self) -> DriverResult<HashMap<String, String>> {
        self.with_ref(|el| {
            el.value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
    }

    async fn dom_path(&self) -> DriverResult<String> {
        self.with_ref(|el| {
            let mut parts = Vec::new();
            for ancestor in el.ancestors() {
                if let Some(anc) = ElementRef::wrap(ancestor) {
                    let mut part = anc.value().name().to_string();
                    if let Some(id) = anc.value().attr("id") {
                        part.push('#');
                        part.push_str(id);
                    } else if let Some(class) = anc.value().attr("class") {
                        part.push('.');
                        part.push_str(&class.split_whitespace().collect::<Vec<_>>().join("."));
                    }
                    parts.push(part);
                }
            }
            parts.reverse();
            parts.join(" > ")
        })
    }

    async fn is_visible(&self) -> DriverResult<bool> {
        self.with_ref(|el| {
            let style = el.value().attr("style").unwrap_or("");
            !(style.contains("display:none")
                || style.contains("display: none")
                || style.contains("visibility:hidden")
                || style.contains("visibility: hidden")
                || el.value().attr("hidden").is_some())
        })
    }

    async fn is_interactable(&self) -> DriverResult<bool> {
        self.with_ref(|el| el.value().attr("disabled").is_none())
    }

    async fn bounding_box(&self) -> DriverResult<Option<BoundingBox>> {
        Ok(None)
    }
}

fn scoped_roots(document: &Html, scope: Option<&str>) -> DriverResult<Vec<NodeId>> {
    match scope {
        None => Ok(vec![document.tree.root().id()]),
        Some(sel) => {
            let selector = Selector::parse(sel)
                .map_err(|e| DriverError::EvalFailed(format!("invalid selector {sel:?}: {e:?}")))?;
            Ok(document.select(&selector).map(|el| el.id()).collect())
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn query_selector(&self, css: &str) -> DriverResult<Option<Box<dyn DriverElement>>> {
        Ok(self
            .query_selector_all(css)
            .await?
            .into_iter()
            .next())
    }

    async fn query_selector_all(&self, css: &str) -> DriverResult<Vec<Box<dyn DriverElement>>> {
        let selector = Selector::parse(css)
            .map_err(|e| DriverError::EvalFailed(format!("invalid selector {css:?}: {e:?}")))?;
        let guard = self.state.read();
        let document = Arc::new(guard.document.clone());
        let elements = document
            .select(&selector)
            .map(|el| {
                Box::new(FakeElement {
                    document: Arc::clone(&document),
                    node_id: el.id(),
                }) as Box<dyn DriverElement>
            })
            .collect();
        Ok(elements)
    }

    async fn find_by_text(
        &self,
        pattern: &str,
        case_sensitive: bool,
        scope: Option<&str>,
    ) -> DriverResult<Vec<Box<dyn DriverElement>>> {
        let guard = self.state.read();
        let document = Arc::new(guard.document.clone());
        let roots = scoped_roots(&document, scope)?;
        let needle = if case_sensitive {
            pattern.to_string()
        } else {
            pattern.to_lowercase()
        };

        let all = Selector::parse("*").expect("`*` is always a valid selector");
        let mut out = Vec::new();
        for el in document.select(&all) {
            let within_scope = roots
                .iter()
                .any(|root| *root == el.id() || el.ancestors().any(|a| a.id() == *root));
            if !within_scope {
                continue;
            }
            // Leaf elements only, matching the chromium driver's
            // childless-text-node behavior.
            if el.children().next().is_some() {
                continue;
            }
            let text: String = el.text().collect();
            let hay = if case_sensitive { text.clone() } else { text.to_lowercase() };
            if hay.contains(&needle) {
                out.push(Box::new(FakeElement {
                    document: Arc::clone(&document),
                    node_id: el.id(),
                }) as Box<dyn DriverElement>);
            }
        }
        Ok(out)
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        if script.contains("navigator.webdriver") {
            return Ok(serde_json::Value::Bool(false));
        }
        Ok(serde_json::Value::Null)
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.state.write().url = url.to_string();
        Ok(())
    }

    async fn inject_init_script(&self, script: &str) -> DriverResult<()> {
        self.state.write().init_scripts.push(script.to_string());
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.read().url.clone())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> DriverResult<()> {
        let mut state = self.state.write();
        state.mouse_position = (x, y);
        state.mouse_moves.push((x, y));
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> DriverResult<()> {
        self.state.write().clicks.push((x, y));
        Ok(())
    }

    async fn click(&self, css: &str) -> DriverResult<()> {
        self.query_selector(css)
            .await?
            .ok_or_else(|| DriverError::NotFound(css.to_string()))?;
        self.state.write().clicked_selectors.push(css.to_string());
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()> {
        self.state.write().scrolls.push((dx, dy));
        Ok(())
    }

    async fn set_proxy(&self, url: &str, username: Option<&str>, password: Option<&str>) -> DriverResult<()> {
        self.state.write().proxy = Some((
            url.to_string(),
            username.map(str::to_string),
            password.map(str::to_string),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_element_by_text() {
        let driver = FakeDriver::new(
            r#"<html><body><div class="match-header"><span class="team-name">Manchester United</span></div></body></html>"#,
            "https://example.test/match/1",
        );
        let matches = driver.find_by_text("Manchester United", false, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].text().await.unwrap().as_deref(),
            Some("Manchester United")
        );
    }

    #[tokio::test]
    async fn attribute_lookup_by_css() {
        let driver = FakeDriver::new(
            r#"<html><body><span id="home-score" data-value="2">2</span></body></html>"#,
            "https://example.test",
        );
        let el = driver.query_selector("#home-score").await.unwrap().unwrap();
        assert_eq!(el.attribute("data-value").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn dom_path_includes_ancestors() {
        let driver = FakeDriver::new(
            r#"<html><body><div id="main"><span class="score">1-0</span></div></body></html>"#,
            "https://example.test",
        );
        let el = driver.query_selector("span.score").await.unwrap().unwrap();
        let path = el.dom_path().await.unwrap();
        assert!(path.contains("div#main"));
    }
}
