//! Explicit correlation handles threaded through operation contexts.
//!
//! Every entry point that can emit an event or a failure takes a
//! [`CorrelationId`] (or a [`CorrelationScope`] wrapping one) as an
//! explicit value, rather than reading it out of thread-local storage.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Identifies a single logical operation (one selector resolution, one
/// tab's crawl, one abort execution) across the events and failures it
/// produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a child id that shares the parent's prefix, for sub-operations
    /// (e.g. one strategy attempt within a resolution) that should be
    /// traceable back to their parent without being indistinguishable from it.
    #[must_use]
    pub fn child(&self, suffix: &str) -> Self {
        Self(Arc::from(format!("{}.{suffix}", self.0)))
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

/// A `tracing` span carrying a [`CorrelationId`] as a structured field, for
/// call sites that would rather enter a scope than thread the id through
/// every leaf helper by hand. Holding the guard keeps the id attached to
/// every event logged underneath it; the id itself still has to be passed
/// explicitly to anything that needs it outside of logging (event
/// publishing, failure records), same as everywhere else in this crate.
pub struct CorrelationScope {
    _span: tracing::span::EnteredSpan,
}

impl CorrelationScope {
    #[must_use]
    pub fn enter(correlation_id: &CorrelationId) -> Self {
        let span = tracing::info_span!("operation", correlation_id = %correlation_id);
        Self { _span: span.entered() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_carries_parent_prefix() {
        let parent = CorrelationId::from("run-42");
        let child = parent.child("strategy-1");
        assert!(child.as_str().starts_with(parent.as_str()));
        assert_ne!(child, parent);
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
