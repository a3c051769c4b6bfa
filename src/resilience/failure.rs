//! Failure classification and per-category recovery.
//!
//! Classification is pattern-based over the error message against an
//! ordered table; the first matching pattern wins. The table's eleven
//! categories are a finer grain than [`FailureCategory`]'s five-value
//! `FailureEvent.category`; [`ClassificationCategory::coarsen`] maps
//! down to that for event construction. Generalizes
//! `crawl_engine::crawl_types::FailureKind`'s message-substring matching,
//! retryability, and delay multiplier into the full category list, kept
//! separate from the narrower network/browser/content split its own
//! retry queue needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::correlation::CorrelationId;
use crate::events::{EngineEvent, EventBus};

/// Severity of a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum FailureSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FailureSeverity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Broad category carried on a [`FailureEvent`] (spec §3's five-value enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FailureCategory {
    Network,
    Browser,
    System,
    Application,
    External,
}

impl FailureCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Browser => "browser",
            Self::System => "system",
            Self::Application => "application",
            Self::External => "external",
        }
    }
}

/// The classifier's finer-grained pattern-table category (spec §4.P).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ClassificationCategory {
    Network,
    Timeout,
    Authentication,
    Permission,
    Validation,
    System,
    Memory,
    Disk,
    Database,
    Browser,
    Unknown,
}

impl ClassificationCategory {
    /// Maps the classifier's eleven categories down to the five the data
    /// model's `FailureEvent.category` carries. `Timeout` folds into
    /// `Network` (both are transient transport-layer concerns); `Memory`
    /// and `Disk` fold into `System`; `Authentication`, `Permission`, and
    /// `Validation` fold into `Application` (all three are "the caller did
    /// something the target rejected," not an infrastructure failure);
    /// `Database` folds into `External` (it's a dependency this crate does
    /// not own); `Unknown` defaults to `Application` since that is the
    /// handler's skip-and-continue category, the safest default when the
    /// classifier genuinely cannot tell what happened.
    #[must_use]
    pub fn coarsen(self) -> FailureCategory {
        match self {
            Self::Network | Self::Timeout => FailureCategory::Network,
            Self::Browser => FailureCategory::Browser,
            Self::System | Self::Memory | Self::Disk => FailureCategory::System,
            Self::Authentication | Self::Permission | Self::Validation | Self::Unknown => {
                FailureCategory::Application
            }
            Self::Database => FailureCategory::External,
        }
    }
}

/// A `FailureEvent` as specified in spec §3. `stack` and `job_id`/
/// `component`/`operation` are free-form context the caller may or may not
/// have available.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FailureEvent {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: CorrelationId,
    pub severity: FailureSeverity,
    pub category: FailureCategory,
    pub source: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub stack: Option<String>,
    pub resolved: bool,
    pub recovery_action: Option<String>,
    pub resolution_time: Option<Duration>,
    pub job_id: Option<String>,
    pub component: Option<String>,
    pub operation: Option<String>,
}

struct ClassificationPattern {
    category: ClassificationCategory,
    keywords: &'static [&'static str],
    severity: FailureSeverity,
    suggested_action: &'static str,
}

/// Outcome of running the error message through the pattern table.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub category: ClassificationCategory,
    pub severity: FailureSeverity,
    pub suggested_action: String,
}

/// Pattern-matches an error message against the ordered category table.
/// Stateless and cheap to construct; kept as its own type (rather than
/// free functions) so a caller can swap in a custom table for testing.
pub struct FailureClassifier {
    table: Vec<ClassificationPattern>,
}

impl FailureClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self { table: default_table() }
    }

    #[must_use]
    pub fn classify(&self, message: &str) -> ClassificationOutcome {
        let lower = message.to_lowercase();
        for pattern in &self.table {
            if pattern.keywords.iter().any(|kw| lower.contains(kw)) {
                return ClassificationOutcome {
                    category: pattern.category,
                    severity: pattern.severity,
                    suggested_action: pattern.suggested_action.to_string(),
                };
            }
        }
        ClassificationOutcome {
            category: ClassificationCategory::Unknown,
            severity: FailureSeverity::Medium,
            suggested_action: "log and continue".to_string(),
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn default_table() -> Vec<ClassificationPattern> {
    vec![
        ClassificationPattern {
            category: ClassificationCategory::Timeout,
            keywords: &["timeout", "timed out", "deadline exceeded"],
            severity: FailureSeverity::Medium,
            suggested_action: "retry with backoff",
        },
        ClassificationPattern {
            category: ClassificationCategory::Network,
            keywords: &["connection refused", "connection reset", "dns", "network", "unreachable", "econnreset"],
            severity: FailureSeverity::Medium,
            suggested_action: "retry with backoff",
        },
        ClassificationPattern {
            category: ClassificationCategory::Authentication,
            keywords: &["unauthorized", "authentication failed", "401", "invalid credentials"],
            severity: FailureSeverity::High,
            suggested_action: "skip and alert",
        },
        ClassificationPattern {
            category: ClassificationCategory::Permission,
            keywords: &["forbidden", "403", "permission denied", "access denied"],
            severity: FailureSeverity::High,
            suggested_action: "skip and alert",
        },
        ClassificationPattern {
            category: ClassificationCategory::Validation,
            keywords: &["validation", "invalid input", "malformed", "schema"],
            severity: FailureSeverity::Low,
            suggested_action: "skip",
        },
        ClassificationPattern {
            category: ClassificationCategory::Memory,
            keywords: &["out of memory", "oom", "allocation failed"],
            severity: FailureSeverity::Critical,
            suggested_action: "abort",
        },
        ClassificationPattern {
            category: ClassificationCategory::Disk,
            keywords: &["no space left", "disk full", "enospc"],
            severity: FailureSeverity::Critical,
            suggested_action: "abort",
        },
        ClassificationPattern {
            category: ClassificationCategory::Database,
            keywords: &["database", "sql", "connection pool exhausted"],
            severity: FailureSeverity::High,
            suggested_action: "retry with exponential backoff",
        },
        ClassificationPattern {
            category: ClassificationCategory::Browser,
            keywords: &["browser", "chrome", "cdp", "target closed", "page crashed", "session closed"],
            severity: FailureSeverity::High,
            suggested_action: "restart browser",
        },
        ClassificationPattern {
            category: ClassificationCategory::System,
            keywords: &["panic", "segmentation fault", "system error", "resource exhausted"],
            severity: FailureSeverity::Critical,
            suggested_action: "abort",
        },
    ]
}

/// Symbolic recovery action the handler takes for a category. Execution of
/// the action itself (actually restarting a browser, actually retrying)
/// belongs to the caller wiring this handler into the resolver/tab
/// handler/browser recovery loop; this type only records the *decision*.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RecoveryAction {
    RetryWithBackoff { max_attempts: u32 },
    RestartBrowser { preserve_session: bool },
    Abort,
    Skip,
    RetryExponential { cap: u32 },
}

impl RecoveryAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryWithBackoff { .. } => "retry_with_backoff",
            Self::RestartBrowser { .. } => "restart_browser",
            Self::Abort => "abort",
            Self::Skip => "skip",
            Self::RetryExponential { .. } => "retry_exponential",
        }
    }
}

/// Outcome of handling one [`FailureEvent`].
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub action: RecoveryAction,
    pub success: bool,
    pub resolution_time: Duration,
}

/// Routes classified failures to a per-category recovery action and
/// publishes the handled-failure/recovery event pair spec §4.P requires.
/// Recovery strategies are registered per [`FailureCategory`]; defaults
/// mirror spec §4.P exactly (`System` only escalates to `Abort` at
/// `Critical` severity — lower-severity system failures retry instead).
pub struct FailureHandler {
    classifier: FailureClassifier,
    strategies: RwLock<HashMap<FailureCategory, RecoveryAction>>,
    event_bus: Option<Arc<EventBus>>,
}

impl FailureHandler {
    #[must_use]
    pub fn new(event_bus: Option<Arc<EventBus>>) -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(FailureCategory::Network, RecoveryAction::RetryWithBackoff { max_attempts: 3 });
        strategies.insert(FailureCategory::Browser, RecoveryAction::RestartBrowser { preserve_session: true });
        strategies.insert(FailureCategory::Application, RecoveryAction::Skip);
        strategies.insert(FailureCategory::External, RecoveryAction::RetryExponential { cap: 5 });
        // System has no blanket default; `recovery_action_for` escalates to
        // Abort at Critical severity and otherwise falls back to retry.
        Self {
            classifier: FailureClassifier::new(),
            strategies: RwLock::new(strategies),
            event_bus,
        }
    }

    pub fn register_strategy(&self, category: FailureCategory, action: RecoveryAction) {
        self.strategies.write().insert(category, action);
    }

    fn recovery_action_for(&self, category: FailureCategory, severity: FailureSeverity) -> RecoveryAction {
        if category == FailureCategory::System && severity == FailureSeverity::Critical {
            return RecoveryAction::Abort;
        }
        self.strategies
            .read()
            .get(&category)
            .cloned()
            .unwrap_or(RecoveryAction::Skip)
    }

    /// Classifies `message`, builds a [`FailureEvent`], determines the
    /// recovery action, and publishes `failure_event` then (on a
    /// successful recovery decision, i.e. anything but `Abort`)
    /// `recovery_event`.
    pub async fn handle(
        &self,
        correlation_id: CorrelationId,
        message: &str,
        source: impl Into<String>,
        context: HashMap<String, String>,
    ) -> (FailureEvent, RecoveryOutcome) {
        let started = std::time::Instant::now();
        let outcome = self.classifier.classify(message);
        let category = outcome.category.coarsen();
        let action = self.recovery_action_for(category, outcome.severity);

        let event = FailureEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            correlation_id: correlation_id.clone(),
            severity: outcome.severity,
            category,
            source: source.into(),
            message: message.to_string(),
            context,
            stack: None,
            resolved: !matches!(action, RecoveryAction::Abort),
            recovery_action: Some(action.as_str().to_string()),
            resolution_time: None,
            job_id: None,
            component: None,
            operation: None,
        };

        if let Some(bus) = &self.event_bus {
            let _ = bus
                .publish(EngineEvent::failure(
                    correlation_id.clone(),
                    category.as_str(),
                    outcome.severity.as_str(),
                    message,
                ))
                .await;
        }

        let success = !matches!(action, RecoveryAction::Abort);
        if success {
            if let Some(bus) = &self.event_bus {
                let _ = bus
                    .publish(EngineEvent::recovery(
                        source_for_event(&event),
                        category.as_str(),
                        action.as_str(),
                        0,
                    ))
                    .await;
            }
        }

        let recovery = RecoveryOutcome {
            action,
            success,
            resolution_time: started.elapsed(),
        };
        (event, recovery)
    }
}

fn source_for_event(event: &FailureEvent) -> String {
    if event.source.is_empty() {
        "unknown".to_string()
    } else {
        event.source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_network_timeout_before_generic_network() {
        let classifier = FailureClassifier::new();
        let outcome = classifier.classify("connection timed out after 30s");
        assert_eq!(outcome.category, ClassificationCategory::Timeout);
    }

    #[test]
    fn unmatched_message_is_unknown() {
        let classifier = FailureClassifier::new();
        let outcome = classifier.classify("something entirely novel happened");
        assert_eq!(outcome.category, ClassificationCategory::Unknown);
        assert_eq!(outcome.category.coarsen(), FailureCategory::Application);
    }

    #[test]
    fn memory_and_disk_coarsen_to_system() {
        assert_eq!(ClassificationCategory::Memory.coarsen(), FailureCategory::System);
        assert_eq!(ClassificationCategory::Disk.coarsen(), FailureCategory::System);
    }

    #[tokio::test]
    async fn network_failure_recovers_via_retry() {
        let handler = FailureHandler::new(None);
        let (event, outcome) = handler
            .handle(CorrelationId::new(), "connection refused by peer", "driver", HashMap::new())
            .await;
        assert_eq!(event.category, FailureCategory::Network);
        assert!(outcome.success);
        assert!(matches!(outcome.action, RecoveryAction::RetryWithBackoff { .. }));
    }

    #[tokio::test]
    async fn critical_system_failure_aborts() {
        let handler = FailureHandler::new(None);
        let (event, outcome) = handler
            .handle(CorrelationId::new(), "out of memory: allocation failed", "worker", HashMap::new())
            .await;
        assert_eq!(event.category, FailureCategory::System);
        assert!(!outcome.success);
        assert_eq!(outcome.action, RecoveryAction::Abort);
        assert!(!event.resolved);
    }

    #[tokio::test]
    async fn custom_strategy_overrides_default() {
        let handler = FailureHandler::new(None);
        handler.register_strategy(FailureCategory::Network, RecoveryAction::Skip);
        let (_, outcome) = handler
            .handle(CorrelationId::new(), "dns lookup failed", "driver", HashMap::new())
            .await;
        assert_eq!(outcome.action, RecoveryAction::Skip);
    }
}
