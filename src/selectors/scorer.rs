//! Confidence scorer: folds content validation, DOM-path stability,
//! historical success rate, timing, visibility, and interactability into a
//! single `[0,1]` score, gated by an environment-specific minimum before a
//! result counts as a success.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::selectors::model::ElementInfo;
use crate::selectors::strategies::Candidate;

/// Per-factor weights. Defaults match spec §4.K: content validation carries
/// the most weight, then position stability and strategy history equally,
/// then performance, then visibility/interactability as tiebreakers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub content_validation: f32,
    pub position_stability: f32,
    pub strategy_history: f32,
    pub performance: f32,
    pub visibility: f32,
    pub interactability: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            content_validation: 0.40,
            position_stability: 0.20,
            strategy_history: 0.20,
            performance: 0.10,
            visibility: 0.05,
            interactability: 0.05,
        }
    }
}

/// Named deployment tiers, each with its own default minimum acceptable
/// confidence (spec §4.K quality gate table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
    Development,
    Testing,
}

impl Environment {
    #[must_use]
    pub fn default_min_confidence(self) -> f32 {
        match self {
            Self::Production => 0.90,
            Self::Staging => 0.80,
            Self::Development => 0.70,
            Self::Testing => 0.60,
        }
    }
}

#[derive(Default)]
struct StrategyStats {
    attempts: u64,
    successes: u64,
}

impl StrategyStats {
    fn success_rate(&self) -> f32 {
        if self.attempts == 0 {
            // No history yet; neither reward nor penalize.
            0.5
        } else {
            self.successes as f32 / self.attempts as f32
        }
    }
}

/// Rolling per-selector-per-strategy success history plus the weighted
/// scoring function itself.
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
    history: RwLock<HashMap<String, StrategyStats>>,
}

impl ConfidenceScorer {
    #[must_use]
    pub fn new(weights: ConfidenceWeights) -> Self {
        Self {
            weights,
            history: RwLock::new(HashMap::new()),
        }
    }

    fn history_key(selector_name: &str, strategy_label: &str) -> String {
        format!("{selector_name}::{strategy_label}")
    }

    pub fn record_attempt(&self, selector_name: &str, strategy_label: &str, success: bool) {
        let key = Self::history_key(selector_name, strategy_label);
        let mut history = self.history.write();
        let stats = history.entry(key).or_default();
        stats.attempts += 1;
        if success {
            stats.successes += 1;
        }
    }

    fn strategy_history_factor(&self, selector_name: &str, strategy_label: &str) -> f32 {
        let key = Self::history_key(selector_name, strategy_label);
        self.history
            .read()
            .get(&key)
            .map(StrategyStats::success_rate)
            .unwrap_or(0.5)
    }

    /// Position-stability factor: a pure DOM-path heuristic. `+0.3` if the
    /// path contains an `id=`, `+0.2` if it contains a semantic tag, `-0.2`
    /// if it nests more than three `div`s, `-0.1` if it uses more than one
    /// `:nth-child` segment.
    fn position_stability_factor(path: &str) -> f32 {
        let mut score: f32 = 0.5;
        if path.contains("id=") {
            score += 0.3;
        }
        const SEMANTIC_TAGS: &[&str] = &["article", "section", "header", "footer", "main", "nav", "table", "tr", "td"];
        if SEMANTIC_TAGS.iter().any(|t| path.contains(t)) {
            score += 0.2;
        }
        let div_depth = path.matches("div").count();
        if div_depth > 3 {
            score -= 0.2;
        }
        let nth_child_count = path.matches(":nth-child").count();
        if nth_child_count > 1 {
            score -= 0.1;
        }
        score.clamp(0.0, 1.0)
    }

    /// Piecewise-linear timing curve: fast resolutions score near 1.0,
    /// resolutions past one second decay toward 0.
    fn performance_factor(elapsed: Duration) -> f32 {
        let ms = elapsed.as_millis() as f32;
        if ms <= 50.0 {
            1.0
        } else if ms <= 100.0 {
            1.0 - (ms - 50.0) / 50.0 * 0.1
        } else if ms <= 500.0 {
            0.9 - (ms - 100.0) / 400.0 * 0.4
        } else if ms <= 1000.0 {
            0.5 - (ms - 500.0) / 500.0 * 0.3
        } else {
            (0.2 - (ms - 1000.0) / 5000.0).max(0.0)
        }
    }

    /// Folds a candidate's validation outcomes, DOM-path stability, timing,
    /// and element state into the final `[0,1]` confidence score.
    ///
    /// `content_validation_score` is the selector's own rules folded
    /// beforehand by the validation engine: each rule's weight normalized
    /// among the selector's rules, then the weighted average multiplied by
    /// this factor's outer weight — the resolution spec.md's open question
    /// on rule-weight normalization calls for.
    #[must_use]
    pub fn score(
        &self,
        selector_name: &str,
        strategy_label: &str,
        candidate: &Candidate,
        content_validation_score: f32,
        elapsed: Duration,
    ) -> f32 {
        let ElementInfo { path, visible, interactable, .. } = &candidate.element;

        let content = content_validation_score.clamp(0.0, 1.0) * self.weights.content_validation;
        let position = Self::position_stability_factor(path) * self.weights.position_stability;
        let history = self.strategy_history_factor(selector_name, strategy_label) * self.weights.strategy_history;
        let performance = Self::performance_factor(elapsed) * self.weights.performance;
        let visibility = f32::from(*visible) * self.weights.visibility;
        let interactability = f32::from(*interactable) * self.weights.interactability;

        (content + position + history + performance + visibility + interactability).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap as Map, HashSet};

    fn candidate(path: &str, quality: f32, visible: bool, interactable: bool) -> Candidate {
        Candidate {
            element: ElementInfo {
                tag: "span".into(),
                path: path.into(),
                attributes: Map::new(),
                classes: HashSet::new(),
                text: Some("2".into()),
                visible,
                interactable,
                bounding_box: None,
            },
            quality,
        }
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        let scorer = ConfidenceScorer::new(ConfidenceWeights::default());
        let c = candidate("div#main > span.score", 1.0, true, true);
        let score = scorer.score("home_score", "text_anchor", &c, 1.0, Duration::from_millis(10));
        assert!((0.0..=1.0).contains(&score));
        assert!(score > 0.8);
    }

    #[test]
    fn degraded_candidate_scores_lower() {
        let scorer = ConfidenceScorer::new(ConfidenceWeights::default());
        let good = candidate("div#main > span.score", 1.0, true, true);
        let bad = candidate("div > div > div > div > span", 0.2, false, false);
        let good_score = scorer.score("s", "text_anchor", &good, 1.0, Duration::from_millis(10));
        let bad_score = scorer.score("s", "text_anchor", &bad, 0.2, Duration::from_millis(900));
        assert!(good_score > bad_score);
    }

    #[test]
    fn history_improves_with_recorded_successes() {
        let scorer = ConfidenceScorer::new(ConfidenceWeights::default());
        let c = candidate("div#main span", 0.8, true, true);
        let before = scorer.score("s", "attribute_match", &c, 0.8, Duration::from_millis(10));
        for _ in 0..10 {
            scorer.record_attempt("s", "attribute_match", true);
        }
        let after = scorer.score("s", "attribute_match", &c, 0.8, Duration::from_millis(10));
        assert!(after > before);
    }

    #[test]
    fn environment_defaults_match_spec_table() {
        assert_eq!(Environment::Production.default_min_confidence(), 0.90);
        assert_eq!(Environment::Staging.default_min_confidence(), 0.80);
        assert_eq!(Environment::Development.default_min_confidence(), 0.70);
        assert_eq!(Environment::Testing.default_min_confidence(), 0.60);
    }

    proptest::proptest! {
        // The scorer folds six independently-weighted factors together;
        // none of spec §4.K's weight table or the piecewise performance
        // curve should ever be able to push the result outside [0, 1],
        // no matter how the individual factors combine.
        #[test]
        fn score_never_leaves_unit_interval(
            quality in 0.0f32..=1.0,
            content_validation_score in -1.0f32..=2.0,
            visible in proptest::bool::ANY,
            interactable in proptest::bool::ANY,
            elapsed_ms in 0u64..10_000,
            div_depth in 0usize..6,
        ) {
            let scorer = ConfidenceScorer::new(ConfidenceWeights::default());
            let path = format!("{}span.score", "div > ".repeat(div_depth));
            let c = candidate(&path, quality, visible, interactable);
            let score = scorer.score("s", "text_anchor", &c, content_validation_score, Duration::from_millis(elapsed_ms));
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
