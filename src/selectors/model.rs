//! Data model shared by the strategies, confidence scorer, validation
//! engine, registry, and resolver.
//!
//! Strategy variants and validation-rule kinds follow the corpus this was
//! distilled from (`original_source/src/selectors/engine.py`) rather than
//! an invented taxonomy: four strategy shapes (text anchor, attribute
//! match, DOM relationship, role-based) tried in ascending `priority`
//! order, four validation-rule shapes layered on top of whichever
//! candidate clears the confidence gate.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A named thing a caller wants resolved to a live DOM element
/// (`"home_team_score"`, `"match_status"`), together with the strategies
/// that can find it and the rules that confirm a candidate is right.
///
/// Invariants (enforced by [`SemanticSelector::validate_shape`], run at
/// registration and on every registry update): `name` non-empty, at least
/// three strategies, strategy priorities unique, every rule weight and the
/// selector's own `confidence_threshold` in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSelector {
    pub name: String,
    /// Scopes resolution to a named tab region (spec §3 Tab Context). A
    /// selector without one resolves against whatever tab the caller's
    /// context points at.
    pub tab_context: Option<String>,
    /// Tried in ascending `priority` order until one clears
    /// `confidence_threshold`.
    pub strategies: Vec<StrategyPattern>,
    pub validation_rules: Vec<ValidationRule>,
    pub confidence_threshold: f32,
}

impl SemanticSelector {
    #[must_use]
    pub fn new(name: impl Into<String>, confidence_threshold: f32) -> Self {
        Self {
            name: name.into(),
            tab_context: None,
            strategies: Vec::new(),
            validation_rules: Vec::new(),
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn with_tab_context(mut self, tab_context: impl Into<String>) -> Self {
        self.tab_context = Some(tab_context.into());
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyPattern) -> Self {
        self.strategies.push(strategy);
        self
    }

    #[must_use]
    pub fn with_validation(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    /// Ordered (ascending priority) view of the strategies, the order the
    /// resolver tries them in.
    #[must_use]
    pub fn ordered_strategies(&self) -> Vec<&StrategyPattern> {
        let mut v: Vec<&StrategyPattern> = self.strategies.iter().collect();
        v.sort_by_key(|s| s.priority);
        v
    }

    /// Shape validation per spec §4.N step 2. Does not touch the network
    /// or a page; pure structural check.
    pub fn validate_shape(&self) -> Result<(), ShapeError> {
        if self.name.trim().is_empty() {
            return Err(ShapeError::EmptyName);
        }
        if self.strategies.len() < 3 {
            return Err(ShapeError::TooFewStrategies {
                found: self.strategies.len(),
            });
        }
        let mut seen_priorities = HashSet::new();
        for s in &self.strategies {
            if !seen_priorities.insert(s.priority) {
                return Err(ShapeError::DuplicatePriority(s.priority));
            }
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ShapeError::ThresholdOutOfRange(self.confidence_threshold));
        }
        for rule in &self.validation_rules {
            let w = rule.weight();
            if !(0.0..=1.0).contains(&w) {
                return Err(ShapeError::RuleWeightOutOfRange(w));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ShapeError {
    #[error("selector name must not be empty")]
    EmptyName,
    #[error("selector must declare at least 3 strategies, found {found}")]
    TooFewStrategies { found: usize },
    #[error("duplicate strategy priority: {0}")]
    DuplicatePriority(i32),
    #[error("confidence_threshold {0} out of range [0,1]")]
    ThresholdOutOfRange(f32),
    #[error("validation rule weight {0} out of range [0,1]")]
    RuleWeightOutOfRange(f32),
}

/// One strategy entry: a priority (lower tried first, ties broken toward
/// the earlier/lower priority per spec §4.N tie-breaking policy) plus its
/// tagged-variant configuration.
///
/// REDESIGN FLAGS: the source's duck-typed "strategy config" dict becomes
/// this explicit tagged variant; unknown shapes are rejected at
/// construction (the enum simply has no arm for them) rather than at
/// first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPattern {
    pub priority: i32,
    pub kind: StrategyKind,
}

impl StrategyPattern {
    #[must_use]
    pub fn new(priority: i32, kind: StrategyKind) -> Self {
        Self { priority, kind }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Locate an element whose normalized text equals `anchor_text`,
    /// optionally restricted to descendants of `proximity_selector`.
    TextAnchor {
        anchor_text: String,
        case_sensitive: bool,
        proximity_selector: Option<String>,
    },
    /// Locate an element whose attribute value matches `value_pattern`
    /// (a regex), optionally constrained to a tag name.
    AttributeMatch {
        attribute: String,
        value_pattern: String,
        tag: Option<String>,
    },
    /// Navigate from `parent_selector` via a DOM relationship.
    DomRelationship {
        parent_selector: String,
        relationship: DomRelationship,
    },
    /// Locate by ARIA role, optionally with an accessible name.
    RoleBased {
        role: String,
        accessible_name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomRelationship {
    /// nth-child (0-indexed) of the parent.
    Child(u32),
    /// First descendant matching a tag/selector fragment.
    Descendant(String),
    /// Next sibling of the parent match.
    Sibling,
}

impl StrategyKind {
    /// Stable label used in events/metrics/logs and as `strategy_used` in
    /// [`SelectorResult`] — the literal strings spec §8's scenarios assert
    /// on (`"text_anchor"`, `"attribute_match"`, ...).
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::TextAnchor { .. } => "text_anchor",
            Self::AttributeMatch { .. } => "attribute_match",
            Self::DomRelationship { .. } => "dom_relationship",
            Self::RoleBased { .. } => "role_based",
        }
    }
}

/// A rule a candidate element's extracted content must satisfy to count
/// toward the content-validation confidence factor. `weight` is a
/// per-rule weight normalized among a selector's own rules before being
/// multiplied by the outer `content_validation` factor weight (see
/// `scorer::ConfidenceScorer`, which resolves the open question on rule
/// weight normalization per spec.md's normative note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidationRule {
    Regex {
        pattern: String,
        weight: f32,
        required: bool,
    },
    DataType {
        kind: DataTypeKind,
        weight: f32,
        required: bool,
    },
    Semantic {
        kind: SemanticKind,
        weight: f32,
        required: bool,
    },
    Custom {
        name: String,
        weight: f32,
        required: bool,
    },
}

impl ValidationRule {
    #[must_use]
    pub fn weight(&self) -> f32 {
        match self {
            Self::Regex { weight, .. }
            | Self::DataType { weight, .. }
            | Self::Semantic { weight, .. }
            | Self::Custom { weight, .. } => *weight,
        }
    }

    #[must_use]
    pub fn required(&self) -> bool {
        match self {
            Self::Regex { required, .. }
            | Self::DataType { required, .. }
            | Self::Semantic { required, .. }
            | Self::Custom { required, .. } => *required,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Regex { .. } => "regex",
            Self::DataType { .. } => "data_type",
            Self::Semantic { .. } => "semantic",
            Self::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DataTypeKind {
    Integer,
    Float,
    String,
    Boolean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SemanticKind {
    Score,
    Odds,
    TeamName,
    Time,
    Date,
}

/// Everything extracted about a resolved (or attempted) element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    /// Ancestor tag chain with attributes, e.g. `div.container > div#main.score`,
    /// used by the position-stability confidence factor.
    pub path: String,
    pub attributes: HashMap<String, String>,
    pub classes: HashSet<String>,
    pub text: Option<String>,
    pub visible: bool,
    pub interactable: bool,
    pub bounding_box: Option<BoundingBox>,
}

impl ElementInfo {
    /// Normalized text used for text-anchor comparisons: trimmed, with
    /// interior whitespace collapsed. Empty-after-trim counts as no text
    /// per spec §4.N edge policy.
    #[must_use]
    pub fn normalized_text(&self) -> Option<String> {
        let text = self.text.as_deref()?;
        let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Outcome of validating one candidate element against one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub rule_type: String,
    pub passed: bool,
    pub score: f32,
    pub weight: f32,
    pub message: String,
}

/// The outcome of resolving one [`SemanticSelector`] against a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorResult {
    pub selector_name: String,
    pub strategy_used: Option<String>,
    pub element: Option<ElementInfo>,
    pub confidence_score: f32,
    #[serde(with = "duration_millis")]
    pub resolution_time: Duration,
    pub validation_results: Vec<ValidationOutcome>,
    pub success: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub failure_reason: Option<String>,
    pub snapshot_id: Option<String>,
    pub tab_context: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl SelectorResult {
    #[must_use]
    pub fn failure(
        selector_name: impl Into<String>,
        reason: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            selector_name: selector_name.into(),
            strategy_used: None,
            element: None,
            confidence_score: 0.0,
            resolution_time: elapsed,
            validation_results: Vec::new(),
            success: false,
            timestamp: chrono::Utc::now(),
            failure_reason: Some(reason.into()),
            snapshot_id: None,
            tab_context: None,
            metadata: HashMap::new(),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Tab state as tracked by a page's tab-scope map (spec §3 Tab Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabState {
    NotLoaded,
    Loaded,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabContext {
    pub tab_id: String,
    pub tab_type: String,
    pub state: TabState,
    pub visibility: bool,
    /// CSS scope expression content-only strategies are restricted to
    /// once the tab gate passes.
    pub dom_scope_expr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector_with(n: usize) -> SemanticSelector {
        let mut sel = SemanticSelector::new("home_team_name", 0.8);
        for i in 0..n {
            sel.strategies.push(StrategyPattern::new(
                i as i32,
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
    fn rejects_fewer_than_three_strategies() {
        assert_eq!(
            selector_with(2).validate_shape(),
            Err(ShapeError::TooFewStrategies { found: 2 })
        );
        assert!(selector_with(3).validate_shape().is_ok());
    }

    #[test]
    fn rejects_duplicate_priorities() {
        let mut sel = selector_with(3);
        sel.strategies[1].priority = sel.strategies[0].priority;
        assert!(matches!(
            sel.validate_shape(),
            Err(ShapeError::DuplicatePriority(_))
        ));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut sel = selector_with(3);
        sel.confidence_threshold = 1.5;
        assert!(matches!(
            sel.validate_shape(),
            Err(ShapeError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn ordered_strategies_is_ascending_priority() {
        let mut sel = selector_with(3);
        sel.strategies[0].priority = 10;
        sel.strategies[1].priority = 0;
        sel.strategies[2].priority = 5;
        let ordered = sel.ordered_strategies();
        assert_eq!(
            ordered.iter().map(|s| s.priority).collect::<Vec<_>>(),
            vec![0, 5, 10]
        );
    }

    #[test]
    fn normalized_text_collapses_whitespace_and_trims() {
        let el = ElementInfo {
            tag: "span".into(),
            path: String::new(),
            attributes: HashMap::new(),
            classes: HashSet::new(),
            text: Some("  Manchester   United \n".into()),
            visible: true,
            interactable: false,
            bounding_box: None,
        };
        assert_eq!(el.normalized_text().as_deref(), Some("Manchester United"));
    }

    #[test]
    fn empty_after_trim_counts_as_no_text() {
        let el = ElementInfo {
            tag: "span".into(),
            path: String::new(),
            attributes: HashMap::new(),
            classes: HashSet::new(),
            text: Some("   \n\t ".into()),
            visible: true,
            interactable: false,
            bounding_box: None,
        };
        assert_eq!(el.normalized_text(), None);
    }
}
