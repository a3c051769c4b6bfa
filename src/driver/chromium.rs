//! `chromiumoxide`-backed implementation of [`BrowserDriver`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chromiumoxide::{Page, cdp};
use cdp::browser_protocol::input::{DispatchMouseEventParams, DispatchMouseEventType, MouseButton};

use crate::selectors::BoundingBox;

use super::{BrowserDriver, DriverElement, DriverError, DriverResult};

struct ProxyAuth {
    username: Option<String>,
    password: Option<String>,
}

pub struct ChromiumDriver {
    page: Page,
    proxy_auth: Mutex<Option<ProxyAuth>>,
}

impl ChromiumDriver {
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self { page, proxy_auth: Mutex::new(None) }
    }
}

pub struct ChromiumElement {
    element: chromiumoxide::element::Element,
}

#[async_trait]
impl DriverElement for ChromiumElement {
    async fn tag_name(&self) -> DriverResult<String> {
        let value = self
            .element
            .call_js_fn("function() { return this.tagName.toLowerCase(); }", false)
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(value
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    async fn text(&self) -> DriverResult<Option<String>> {
        self.element
            .inner_text()
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))
    }

    async fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        self.element
            .attribute(name)
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))
    }

    async fn attributes(&self) -> DriverResult<HashMap<String, String>> {
        let value = self
            .element
            .call_js_fn(
                "function() { const o = {}; for (const a of this.attributes) { o[a.name] = a.value; } return o; }",
                false,
            )
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        let map = value
            .value
            .and_then(|v| serde_json::from_value::<HashMap<String, String>>(v).ok())
            .unwrap_or_default();
        Ok(map)
    }

    async fn dom_path(&self) -> DriverResult<String> {
        let value = self
            .element
            .call_js_fn(
                "function() { \
                    let parts = []; let el = this; \
                    while (el && el.nodeType === 1 && parts.length < 8) { \
                        let part = el.tagName.toLowerCase(); \
                        if (el.id) part += '#' + el.id; \
                        else if (el.className) part += '.' + String(el.className).trim().split(/\\s+/).join('.'); \
                        parts.unshift(part); el = el.parentElement; \
                    } \
                    return parts.join(' > '); \
                }",
                false,
            )
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(value
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    async fn is_visible(&self) -> DriverResult<bool> {
        let value = self
            .element
            .call_js_fn(
                "function() { \
                    const r = this.getBoundingClientRect(); \
                    const s = window.getComputedStyle(this); \
                    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; \
                }",
                false,
            )
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(value.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn is_interactable(&self) -> DriverResult<bool> {
        let value = self
            .element
            .call_js_fn(
                "function() { return !this.disabled && this.offsetParent !== null; }",
                false,
            )
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(value.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn bounding_box(&self) -> DriverResult<Option<BoundingBox>> {
        let value = self
            .element
            .call_js_fn(
                "function() { const r = this.getBoundingClientRect(); return { x: r.x, y: r.y, width: r.width, height: r.height }; }",
                false,
            )
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(value
            .value
            .and_then(|v| serde_json::from_value::<BoundingBox>(v).ok()))
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn query_selector(&self, css: &str) -> DriverResult<Option<Box<dyn DriverElement>>> {
        match self.page.find_element(css).await {
            Ok(element) => Ok(Some(Box::new(ChromiumElement { element }))),
            Err(_) => Ok(None),
        }
    }

    async fn query_selector_all(&self, css: &str) -> DriverResult<Vec<Box<dyn DriverElement>>> {
        let elements = self
            .page
            .find_elements(css)
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromiumElement { element }) as Box<dyn DriverElement>)
            .collect())
    }

    async fn find_by_text(
        &self,
        pattern: &str,
        case_sensitive: bool,
        scope: Option<&str>,
    ) -> DriverResult<Vec<Box<dyn DriverElement>>> {
        let marker = format!("data-semscrape-match-{}", xxhash_rust::xxh3::xxh3_64(pattern.as_bytes()));
        let root_expr = match scope {
            Some(s) => format!("document.querySelectorAll({:?})", s),
            None => "[document.body]".to_string(),
        };
        let script = format!(
            "(() => {{ \
                const needle = {needle}; \
                const hay = (s) => {case_fold}; \
                const roots = Array.from({root_expr}); \
                roots.forEach(root => {{ \
                    root.querySelectorAll('*').forEach(el => {{ \
                        const t = el.textContent || ''; \
                        if (el.children.length === 0 && hay(t).includes(hay(needle))) {{ \
                            el.setAttribute('{marker}', '1'); \
                        }} \
                    }}); \
                }}); \
            }})()",
            needle = serde_json::to_string(pattern).unwrap_or_default(),
            case_fold = if case_sensitive { "s" } else { "s.toLowerCase()" },
            root_expr = root_expr,
            marker = marker,
        );
        self.page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        self.query_selector_all(&format!("[{marker}]")).await
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn inject_init_script(&self, script: &str) -> DriverResult<()> {
        self.page
            .execute(cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
                source: script.to_string(),
                include_command_line_api: None,
                world_name: None,
                run_immediately: None,
            })
            .await
            .map_err(|e| DriverError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.page
            .url()
            .await
            .map_err(|e| DriverError::Other(anyhow::anyhow!(e.to_string())))?
            .ok_or_else(|| DriverError::Other(anyhow::anyhow!("page has no URL yet")))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> DriverResult<()> {
        self.page
            .execute(
                DispatchMouseEventParams::builder()
                    .r#type(DispatchMouseEventType::MouseMoved)
                    .x(x)
                    .y(y)
                    .build()
                    .map_err(|e| DriverError::Other(anyhow::anyhow!(e)))?,
            )
            .await
            .map_err(|e| DriverError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> DriverResult<()> {
        for event_type in [DispatchMouseEventType::MousePressed, DispatchMouseEventType::MouseReleased] {
            self.page
                .execute(
                    DispatchMouseEventParams::builder()
                        .r#type(event_type)
                        .x(x)
                        .y(y)
                        .button(MouseButton::Left)
                        .click_count(1)
                        .build()
                        .map_err(|e| DriverError::Other(anyhow::anyhow!(e)))?,
                )
                .await
                .map_err(|e| DriverError::Other(anyhow::anyhow!(e.to_string())))?;
        }
        Ok(())
    }

    async fn click(&self, css: &str) -> DriverResult<()> {
        let element = self
            .page
            .find_element(css)
            .await
            .map_err(|_| DriverError::NotFound(css.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()> {
        self.page
            .evaluate(format!("window.scrollBy({dx}, {dy});"))
            .await
            .map_err(|e| DriverError::EvalFailed(e.to_string()))?;
        Ok(())
    }

    async fn set_proxy(&self, url: &str, username: Option<&str>, password: Option<&str>) -> DriverResult<()> {
        *self.proxy_auth.lock().expect("proxy_auth mutex poisoned") = Some(ProxyAuth {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        });
        tracing::debug!(proxy_url = %url, "proxy binding recorded for context; host/port fixed at browser launch");
        Ok(())
    }
}
