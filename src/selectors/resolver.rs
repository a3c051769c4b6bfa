//! Selector resolver: the core of the selectors subsystem.
//!
//! `resolve()` implements spec §4.N's algorithm: look the selector up,
//! re-validate its shape, gate on tab context, then try each strategy in
//! ascending priority order under its own timeout until one clears the
//! selector's confidence threshold. Every attempt is scored and recorded
//! against the strategy's rolling history; total failure persists a debug
//! snapshot (when a [`SnapshotStore`](crate::snapshot::SnapshotStore) is
//! configured) rather than just returning an error, so a human can see
//! what the page actually looked like.
//!
//! Grounded on `original_source/src/selectors/engine.py`'s `resolve`/
//! `resolve_batch` (the shape-validate-then-loop-then-publish shape is
//! kept; the ambient logger/metrics/storage-adapter machinery is replaced
//! by this crate's event bus and explicit [`CorrelationId`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::config::EngineConfig;
use crate::correlation::CorrelationId;
use crate::driver::BrowserDriver;
use crate::events::{EngineEvent, EventBus};
use crate::selectors::errors::{ResolverError, ResolverResult};
use crate::selectors::model::{SelectorResult, TabContext, TabState};
use crate::selectors::registry::SelectorRegistry;
use crate::selectors::scorer::ConfidenceScorer;
use crate::selectors::validation::ValidationEngine;
use crate::snapshot::{SnapshotStore, SnapshotType};

/// Everything a single `resolve()` call needs about the page it is
/// operating against. Borrowed, not owned: the caller keeps the driver and
/// tab map alive for the duration of the call.
pub struct ResolveContext<'a> {
    pub driver: &'a dyn BrowserDriver,
    pub url: String,
    /// The tab the caller is currently resolving against, if the caller is
    /// tab-scoped. `None` means "resolve against whatever the driver is
    /// pointed at right now," which only works for selectors with no
    /// declared `tab_context`.
    pub tab_context: Option<TabContext>,
    pub correlation_id: CorrelationId,
}

impl<'a> ResolveContext<'a> {
    #[must_use]
    pub fn new(driver: &'a dyn BrowserDriver, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            tab_context: None,
            correlation_id: CorrelationId::new(),
        }
    }

    #[must_use]
    pub fn with_tab_context(mut self, tab_context: TabContext) -> Self {
        self.tab_context = Some(tab_context);
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

pub struct SelectorResolver {
    registry: Arc<SelectorRegistry>,
    scorer: ConfidenceScorer,
    validator: ValidationEngine,
    event_bus: Option<Arc<EventBus>>,
    snapshot_store: Option<Arc<SnapshotStore>>,
    strategy_timeout: Duration,
    min_acceptable_confidence: f32,
    default_batch_concurrency: usize,
}

impl SelectorResolver {
    #[must_use]
    pub fn new(registry: Arc<SelectorRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            scorer: ConfidenceScorer::new(*config.confidence_weights()),
            validator: ValidationEngine::new(),
            event_bus: config.event_bus().cloned(),
            snapshot_store: None,
            strategy_timeout: Duration::from_millis(config.strategy_timeout_ms()),
            min_acceptable_confidence: config.min_acceptable_confidence(),
            default_batch_concurrency: 32,
        }
    }

    #[must_use]
    pub fn with_snapshot_store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SelectorRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn confidence_scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    async fn publish(&self, event: EngineEvent) {
        let Some(bus) = &self.event_bus else { return };
        if let Err(e) = bus.publish(event).await {
            tracing::debug!(error = %e, "resolver event publish failed (best-effort)");
        }
    }

    /// Resolves `name` against `ctx`. Returns `Err` only for the two cases
    /// that mean "the caller asked for something that cannot be resolved
    /// at all" (unknown name, malformed selector shape); every other
    /// outcome, including exhausting all strategies, comes back as an `Ok`
    /// [`SelectorResult`] with `success: false` so callers can inspect
    /// `failure_reason` and `snapshot_id` without matching on an error.
    pub async fn resolve(&self, name: &str, ctx: &ResolveContext<'_>) -> ResolverResult<SelectorResult> {
        let started = Instant::now();
        let correlation_id = ctx.correlation_id.clone();

        let selector = self
            .registry
            .get(name)
            .ok_or_else(|| ResolverError::SelectorNotFound(name.to_string()))?;

        selector.validate_shape()?;

        self.publish(EngineEvent::resolution_started(correlation_id.clone(), name))
            .await;

        // Tab-context gate (spec §4.N step 3 / scenario 5): must happen
        // before any strategy runs, and a gate failure captures no
        // snapshot — there is no DOM worth inspecting if the tab itself
        // isn't the one we think it is.
        let scope = match &selector.tab_context {
            Some(required) => match &ctx.tab_context {
                Some(tab) if &tab.tab_type == required || &tab.tab_id == required => {
                    if tab.state == TabState::NotLoaded {
                        let elapsed = started.elapsed();
                        let result = SelectorResult::failure(name, "tab_context_inactive", elapsed);
                        self.publish(EngineEvent::resolution_completed(correlation_id, name, false, 0.0))
                            .await;
                        return Ok(result);
                    }
                    tab.dom_scope_expr.clone()
                }
                _ => {
                    let elapsed = started.elapsed();
                    let result = SelectorResult::failure(name, "tab_context_inactive", elapsed);
                    self.publish(EngineEvent::resolution_completed(correlation_id, name, false, 0.0))
                        .await;
                    return Ok(result);
                }
            },
            None => ctx.tab_context.as_ref().and_then(|tab| tab.dom_scope_expr.clone()),
        };

        let mut best: Option<(f32, Vec<crate::selectors::model::ValidationOutcome>)> = None;
        let mut attempts: u32 = 0;

        for strategy in selector.ordered_strategies() {
            if let Err(reason) = strategy.kind.validate_config() {
                tracing::debug!(selector = name, strategy = strategy.label(), %reason, "skipping strategy with invalid config");
                continue;
            }

            attempts += 1;
            let attempt_started = Instant::now();
            let outcome = tokio::time::timeout(self.strategy_timeout, strategy.kind.attempt(ctx.driver, scope.as_deref())).await;
            let elapsed = attempt_started.elapsed();

            let candidate = match outcome {
                Ok(Ok(candidate)) => candidate,
                Ok(Err(e)) => {
                    self.scorer.record_attempt(name, strategy.label(), false);
                    self.publish(EngineEvent::strategy_attempted(
                        correlation_id.clone(),
                        name,
                        strategy.label(),
                        false,
                        0.0,
                        elapsed.as_millis() as u64,
                    ))
                    .await;
                    tracing::debug!(selector = name, strategy = strategy.label(), error = %e, "strategy attempt failed");
                    continue;
                }
                Err(_) => {
                    self.scorer.record_attempt(name, strategy.label(), false);
                    self.publish(EngineEvent::strategy_attempted(
                        correlation_id.clone(),
                        name,
                        strategy.label(),
                        false,
                        0.0,
                        self.strategy_timeout.as_millis() as u64,
                    ))
                    .await;
                    tracing::debug!(selector = name, strategy = strategy.label(), timeout_ms = self.strategy_timeout.as_millis(), "strategy attempt timed out");
                    continue;
                }
            };

            let (validation_outcomes, content_score, required_ok) =
                self.validator.validate(&selector.validation_rules, &candidate.element);
            let confidence = self.scorer.score(name, strategy.label(), &candidate, content_score, elapsed);
            let accepted = required_ok && confidence >= selector.confidence_threshold;

            self.scorer.record_attempt(name, strategy.label(), accepted);
            self.publish(EngineEvent::strategy_attempted(
                correlation_id.clone(),
                name,
                strategy.label(),
                accepted,
                confidence,
                elapsed.as_millis() as u64,
            ))
            .await;

            if !required_ok {
                for failed in validation_outcomes.iter().filter(|o| !o.passed) {
                    self.publish(EngineEvent::ValidationFailed {
                        correlation_id: correlation_id.clone(),
                        selector_name: name.to_string(),
                        rule: failed.rule_type.clone(),
                        reason: failed.message.clone(),
                        timestamp: chrono::Utc::now(),
                    })
                    .await;
                }
            }

            if accepted {
                let mut metadata = HashMap::new();
                metadata.insert("attempts".to_string(), attempts.to_string());
                let result = SelectorResult {
                    selector_name: name.to_string(),
                    strategy_used: Some(strategy.label().to_string()),
                    element: Some(candidate.element),
                    confidence_score: confidence,
                    resolution_time: started.elapsed(),
                    validation_results: validation_outcomes,
                    success: true,
                    timestamp: chrono::Utc::now(),
                    failure_reason: None,
                    snapshot_id: None,
                    tab_context: selector.tab_context.clone(),
                    metadata,
                };
                self.publish(EngineEvent::resolution_completed(correlation_id, name, true, confidence))
                    .await;
                return Ok(result);
            }

            if best.as_ref().is_none_or(|(c, _)| confidence > *c) {
                best = Some((confidence, validation_outcomes));
            }
        }

        // Every strategy exhausted without clearing the threshold. Spec
        // §4.N step 6's literal reason string, kept verbatim so callers
        // can match on it.
        let best_confidence = best.as_ref().map_or(0.0, |(c, _)| *c);
        let failure_reason = "All strategies failed".to_string();

        let snapshot_id = self.capture_failure_snapshot(name, ctx, &failure_reason, attempts).await;

        let mut metadata = HashMap::new();
        metadata.insert("attempts".to_string(), attempts.to_string());
        let result = SelectorResult {
            selector_name: name.to_string(),
            strategy_used: None,
            element: None,
            confidence_score: best_confidence,
            resolution_time: started.elapsed(),
            validation_results: best.map(|(_, o)| o).unwrap_or_default(),
            success: false,
            timestamp: chrono::Utc::now(),
            failure_reason: Some(failure_reason),
            snapshot_id,
            tab_context: selector.tab_context.clone(),
            metadata,
        };
        self.publish(EngineEvent::resolution_completed(correlation_id, name, false, best_confidence))
            .await;
        Ok(result)
    }

    async fn capture_failure_snapshot(
        &self,
        name: &str,
        ctx: &ResolveContext<'_>,
        failure_reason: &str,
        attempt: u32,
    ) -> Option<String> {
        let store = self.snapshot_store.as_ref()?;
        let dom_content = ctx
            .driver
            .evaluate("document.documentElement.outerHTML")
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        match store
            .persist(
                name,
                SnapshotType::Failure,
                &ctx.url,
                ctx.tab_context.as_ref().map(|t| t.tab_type.clone()),
                dom_content,
                Some(failure_reason.to_string()),
                attempt,
            )
            .await
        {
            Ok(snapshot) => {
                self.publish(EngineEvent::SnapshotPersisted {
                    snapshot_id: snapshot.id.clone(),
                    url: ctx.url.clone(),
                    timestamp: chrono::Utc::now(),
                })
                .await;
                Some(snapshot.id)
            }
            Err(e) => {
                tracing::warn!(selector = name, error = %e, "failed to persist failure snapshot");
                None
            }
        }
    }

    /// Resolves every name in `names` concurrently, bounded by
    /// `max_concurrency` (default: `names.len()`, capped at 32 per spec
    /// §4.N). A per-selector failure (unknown name, bad shape) becomes a
    /// failed [`SelectorResult`] in the output rather than aborting the
    /// whole batch.
    pub async fn resolve_batch(
        &self,
        names: &[String],
        ctx: &ResolveContext<'_>,
        max_concurrency: Option<usize>,
    ) -> Vec<SelectorResult> {
        let concurrency = max_concurrency
            .unwrap_or_else(|| names.len().max(1))
            .min(self.default_batch_concurrency)
            .max(1);

        stream::iter(names.iter())
            .map(|name| async move {
                match self.resolve(name, ctx).await {
                    Ok(result) => result,
                    Err(e) => SelectorResult::failure(name, e.to_string(), Duration::from_secs(0)),
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::selectors::model::{DomRelationship, SemanticSelector, StrategyKind, StrategyPattern, ValidationRule};

    fn sample_selector(threshold: f32) -> SemanticSelector {
        SemanticSelector::new("home_score", threshold)
            .with_strategy(StrategyPattern::new(
                0,
                StrategyKind::AttributeMatch {
                    attribute: "id".into(),
                    value_pattern: "^home-score$".into(),
                    tag: None,
                },
            ))
            .with_strategy(StrategyPattern::new(
                1,
                StrategyKind::TextAnchor {
                    anchor_text: "2".into(),
                    case_sensitive: false,
                    proximity_selector: None,
                },
            ))
            .with_strategy(StrategyPattern::new(
                2,
                StrategyKind::DomRelationship {
                    parent_selector: "div#main".into(),
                    relationship: DomRelationship::Descendant("span".into()),
                },
            ))
            .with_validation(ValidationRule::DataType {
                kind: crate::selectors::model::DataTypeKind::Integer,
                weight: 1.0,
                required: true,
            })
    }

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .snapshot_dir(std::env::temp_dir().join("semscrape-resolver-test"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_via_first_matching_strategy() {
        let registry = Arc::new(SelectorRegistry::new());
        registry.register(sample_selector(0.5)).unwrap();
        let resolver = SelectorResolver::new(registry, &config());

        let driver = FakeDriver::new(
            r#"<html><body><div id="main"><span id="home-score">2</span></div></body></html>"#,
            "https://example.test",
        );
        let ctx = ResolveContext::new(&driver, "https://example.test");
        let result = resolver.resolve("home_score", &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.strategy_used.as_deref(), Some("attribute_match"));
    }

    #[tokio::test]
    async fn unknown_selector_is_an_error() {
        let registry = Arc::new(SelectorRegistry::new());
        let resolver = SelectorResolver::new(registry, &config());
        let driver = FakeDriver::new("<html></html>", "https://example.test");
        let ctx = ResolveContext::new(&driver, "https://example.test");
        assert!(matches!(
            resolver.resolve("missing", &ctx).await,
            Err(ResolverError::SelectorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_strategies_yield_failure_result_not_error() {
        let registry = Arc::new(SelectorRegistry::new());
        registry.register(sample_selector(0.99)).unwrap();
        let resolver = SelectorResolver::new(registry, &config());
        let driver = FakeDriver::new("<html><body></body></html>", "https://example.test");
        let ctx = ResolveContext::new(&driver, "https://example.test");
        let result = resolver.resolve("home_score", &ctx).await.unwrap();
        assert!(!result.success);
        assert!(result.failure_reason.is_some());
    }

    #[tokio::test]
    async fn tab_context_gate_rejects_inactive_tab() {
        let registry = Arc::new(SelectorRegistry::new());
        registry.register(sample_selector(0.5).with_tab_context("main")).unwrap();
        let resolver = SelectorResolver::new(registry, &config());
        let driver = FakeDriver::new(
            r#"<html><body><div id="main"><span id="home-score">2</span></div></body></html>"#,
            "https://example.test",
        );
        let tab = TabContext {
            tab_id: "t1".into(),
            tab_type: "main".into(),
            state: crate::selectors::model::TabState::Loaded,
            visibility: true,
            dom_scope_expr: None,
        };
        let ctx = ResolveContext::new(&driver, "https://example.test").with_tab_context(tab);
        let result = resolver.resolve("home_score", &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failure_reason.as_deref(), Some("tab_context_inactive"));
        assert!(result.snapshot_id.is_none());
    }

    #[tokio::test]
    async fn resolve_batch_resolves_each_name_independently() {
        let registry = Arc::new(SelectorRegistry::new());
        registry.register(sample_selector(0.5)).unwrap();
        let resolver = SelectorResolver::new(registry, &config());
        let driver = FakeDriver::new(
            r#"<html><body><div id="main"><span id="home-score">2</span></div></body></html>"#,
            "https://example.test",
        );
        let ctx = ResolveContext::new(&driver, "https://example.test");
        let names = vec!["home_score".to_string(), "missing".to_string()];
        let results = resolver.resolve_batch(&names, &ctx, None).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.success));
        assert!(results.iter().any(|r| !r.success));
    }
}
