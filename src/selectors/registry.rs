//! Selector registry: holds the live set of
//! [`SemanticSelector`]s, validating shape on every write and swapping
//! entries under a lock so readers never observe a half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::selectors::model::{SemanticSelector, ShapeError};

#[derive(Debug, Clone)]
pub struct SelectorMetadata {
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl SelectorMetadata {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            registered_at: now,
            last_updated: now,
            usage_count: 0,
            last_used: None,
        }
    }
}

struct Entry {
    selector: Arc<SemanticSelector>,
    metadata: SelectorMetadata,
}

/// Thread-safe store of named selectors, secondarily indexed by tab
/// context so callers can ask "what selectors apply to this tab region."
pub struct SelectorRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    by_tab_context: DashMap<String, std::collections::HashSet<String>>,
}

impl SelectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            by_tab_context: DashMap::new(),
        }
    }

    /// Validates shape, then registers or replaces the named selector.
    pub fn register(&self, selector: SemanticSelector) -> Result<(), ShapeError> {
        selector.validate_shape()?;
        let name = selector.name.clone();
        let tab_context = selector.tab_context.clone();

        let mut entries = self.entries.write();
        let metadata = match entries.get(&name) {
            Some(existing) => SelectorMetadata {
                last_updated: Utc::now(),
                ..existing.metadata.clone()
            },
            None => SelectorMetadata::new(),
        };
        entries.insert(
            name.clone(),
            Entry {
                selector: Arc::new(selector),
                metadata,
            },
        );
        drop(entries);

        if let Some(ctx) = tab_context {
            self.by_tab_context.entry(ctx).or_default().insert(name);
        }
        Ok(())
    }

    #[must_use]
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        for mut set in self.by_tab_context.iter_mut() {
            set.remove(name);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<SemanticSelector>> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(name)?;
        entry.metadata.usage_count += 1;
        entry.metadata.last_used = Some(Utc::now());
        Some(Arc::clone(&entry.selector))
    }

    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<SelectorMetadata> {
        self.entries.read().get(name).map(|e| e.metadata.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<Arc<SemanticSelector>> {
        self.entries
            .read()
            .values()
            .map(|e| Arc::clone(&e.selector))
            .collect()
    }

    #[must_use]
    pub fn list_for_tab_context(&self, tab_context: &str) -> Vec<Arc<SemanticSelector>> {
        let Some(names) = self.by_tab_context.get(tab_context) else {
            return Vec::new();
        };
        let entries = self.entries.read();
        names
            .iter()
            .filter_map(|name| entries.get(name).map(|e| Arc::clone(&e.selector)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::model::{StrategyKind, StrategyPattern};

    fn sample(name: &str) -> SemanticSelector {
        let mut sel = SemanticSelector::new(name, 0.8).with_tab_context("main");
        for i in 0..3 {
            sel = sel.with_strategy(StrategyPattern::new(
                i,
                StrategyKind::TextAnchor {
                    anchor_text: "x".into(),
                    case_sensitive: false,
                    proximity_selector: None,
                },
            ));
        }
        sel
    }

    #[test]
    fn rejects_malformed_selector_on_register() {
        let registry = SelectorRegistry::new();
        let bad = SemanticSelector::new("too_few", 0.5);
        assert!(registry.register(bad).is_err());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn get_tracks_usage_count() {
        let registry = SelectorRegistry::new();
        registry.register(sample("home_score")).unwrap();
        registry.get("home_score").unwrap();
        registry.get("home_score").unwrap();
        assert_eq!(registry.metadata("home_score").unwrap().usage_count, 2);
    }

    #[test]
    fn tab_context_index_tracks_membership() {
        let registry = SelectorRegistry::new();
        registry.register(sample("home_score")).unwrap();
        registry.register(sample("away_score")).unwrap();
        assert_eq!(registry.list_for_tab_context("main").len(), 2);
        registry.unregister("home_score");
        assert_eq!(registry.list_for_tab_context("main").len(), 1);
    }
}
