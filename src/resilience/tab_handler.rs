//! Bounded-concurrency per-tab retry/skip pipeline.
//!
//! Uses the same bounded-semaphore, per-item retry budget, aggregate
//! report structure as `crawl_engine::domain_limiter`'s rate-limited URL
//! processing, applied to tabs instead of URLs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::resilience::failure::{FailureClassifier, FailureSeverity};
use crate::selectors::TabContext;

/// What happened to a single tab after the handler finished with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabOutcome {
    Succeeded,
    /// Retried until a transient classification stopped recurring, or
    /// retries ran out and the last attempt still failed.
    Failed { reason: String, snapshot_id: Option<String> },
    /// A non-transient classification hit on the first attempt.
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct TabHandlerReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub per_tab: HashMap<String, TabOutcome>,
}

/// The per-tab unit of work. Returns `Err(message)` on failure; the
/// handler classifies the message to decide retry vs skip. Capturing a
/// failure snapshot on a permanent failure is the caller's
/// responsibility — the closure can return one via `Err`'s message, but
/// the handler has no driver handle of its own to take one itself.
pub type TabProcessor = Arc<dyn Fn(TabContext) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

pub struct TabHandler {
    classifier: FailureClassifier,
    concurrency: Arc<Semaphore>,
    max_retries: u32,
    retry_base: Duration,
}

impl TabHandler {
    #[must_use]
    pub fn new(max_concurrency: usize, max_retries: u32) -> Self {
        Self {
            classifier: FailureClassifier::new(),
            concurrency: Arc::new(Semaphore::new(max_concurrency.max(1))),
            max_retries,
            retry_base: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Processes every tab in `tabs` concurrently (bounded by the
    /// configured semaphore), retrying transient failures up to
    /// `max_retries` times with `base * retry_count` backoff, per spec
    /// §4.Q.
    pub async fn process_all(&self, tabs: Vec<TabContext>, processor: TabProcessor) -> TabHandlerReport {
        let total = tabs.len();
        let mut handles = Vec::with_capacity(total);

        for tab in tabs {
            let permit_src = self.concurrency.clone();
            let processor = processor.clone();
            let max_retries = self.max_retries;
            let retry_base = self.retry_base;

            handles.push(tokio::spawn(async move {
                let _permit = permit_src.acquire_owned().await.expect("semaphore not closed");
                let classifier = FailureClassifier::new();
                let tab_id = tab.tab_id.clone();
                let mut retry_count = 0u32;
                loop {
                    match processor(tab.clone()).await {
                        Ok(()) => return (tab_id, TabOutcome::Succeeded),
                        Err(message) => {
                            let outcome = classifier.classify(&message);
                            let transient = matches!(
                                outcome.category,
                                crate::resilience::failure::ClassificationCategory::Network
                                    | crate::resilience::failure::ClassificationCategory::Timeout
                                    | crate::resilience::failure::ClassificationCategory::Browser
                            ) && outcome.severity < FailureSeverity::Critical;

                            if transient && retry_count < max_retries {
                                retry_count += 1;
                                tokio::time::sleep(retry_base * retry_count).await;
                                continue;
                            }
                            if transient {
                                return (tab_id, TabOutcome::Failed { reason: message, snapshot_id: None });
                            }
                            return (tab_id, TabOutcome::Skipped { reason: message });
                        }
                    }
                }
            }));
        }

        let mut per_tab = HashMap::with_capacity(total);
        for handle in handles {
            if let Ok((tab_id, outcome)) = handle.await {
                per_tab.insert(tab_id, outcome);
            }
        }

        let succeeded = per_tab.values().filter(|o| matches!(o, TabOutcome::Succeeded)).count();
        let failed = per_tab.values().filter(|o| matches!(o, TabOutcome::Failed { .. })).count();
        let skipped = per_tab.values().filter(|o| matches!(o, TabOutcome::Skipped { .. })).count();

        TabHandlerReport { total, succeeded, failed, skipped, per_tab }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::TabState;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tab(id: &str) -> TabContext {
        TabContext {
            tab_id: id.to_string(),
            tab_type: "main".to_string(),
            state: TabState::Loaded,
            visibility: true,
            dom_scope_expr: None,
        }
    }

    #[tokio::test]
    async fn succeeding_tabs_all_report_succeeded() {
        let handler = TabHandler::new(5, 3);
        let processor: TabProcessor = Arc::new(|_tab| Box::pin(async { Ok(()) }));
        let report = handler
            .process_all(vec![tab("t1"), tab("t2"), tab("t3")], processor)
            .await;
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let processor: TabProcessor = Arc::new(move |_tab| {
            let attempts = attempts_clone.clone();
            Box::pin(async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection timed out".to_string())
                } else {
                    Ok(())
                }
            })
        });
        let handler = TabHandler::new(1, 3).with_retry_base(Duration::from_millis(1));
        let report = handler.process_all(vec![tab("t1")], processor).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_skipped_without_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let processor: TabProcessor = Arc::new(move |_tab| {
            let attempts = attempts_clone.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("validation failed: malformed response".to_string())
            })
        });
        let handler = TabHandler::new(1, 3);
        let report = handler.process_all(vec![tab("t1")], processor).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
