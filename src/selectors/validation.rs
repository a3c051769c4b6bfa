//! Validation engine: checks a candidate element's extracted
//! content against a selector's declared [`ValidationRule`]s, producing one
//! [`ValidationOutcome`] per rule plus the weighted score the confidence
//! scorer's content-validation factor expects.

use regex::Regex;

use crate::selectors::model::{DataTypeKind, ElementInfo, SemanticKind, ValidationOutcome, ValidationRule};

pub struct ValidationEngine;

impl ValidationEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluates every rule against `element`, returning the outcomes and
    /// the folded content-validation score: each rule's weight normalized
    /// among the selector's own rules, then averaged by `passed` score.
    /// A `required` rule that fails forces the overall outcome to fail
    /// regardless of the numeric score.
    #[must_use]
    pub fn validate(
        &self,
        rules: &[ValidationRule],
        element: &ElementInfo,
    ) -> (Vec<ValidationOutcome>, f32, bool) {
        if rules.is_empty() {
            return (Vec::new(), 1.0, true);
        }

        let total_weight: f32 = rules.iter().map(ValidationRule::weight).sum();
        let mut outcomes = Vec::with_capacity(rules.len());
        let mut weighted_sum = 0.0;
        let mut required_failed = false;

        for rule in rules {
            let outcome = self.evaluate_rule(rule, element);
            if rule.required() && !outcome.passed {
                required_failed = true;
            }
            let normalized_weight = if total_weight > 0.0 {
                rule.weight() / total_weight
            } else {
                1.0 / rules.len() as f32
            };
            weighted_sum += outcome.score * normalized_weight;
            outcomes.push(outcome);
        }

        (outcomes, weighted_sum.clamp(0.0, 1.0), !required_failed)
    }

    fn evaluate_rule(&self, rule: &ValidationRule, element: &ElementInfo) -> ValidationOutcome {
        match rule {
            ValidationRule::Regex { pattern, weight, required } => {
                self.evaluate_regex(pattern, *weight, *required, element)
            }
            ValidationRule::DataType { kind, weight, required } => {
                self.evaluate_data_type(*kind, *weight, *required, element)
            }
            ValidationRule::Semantic { kind, weight, required } => {
                self.evaluate_semantic(*kind, *weight, *required, element)
            }
            ValidationRule::Custom { name, weight, required } => ValidationOutcome {
                rule_type: "custom".into(),
                passed: false,
                score: 0.0,
                weight: *weight,
                message: format!("no handler registered for custom rule {name:?}; required={required}"),
            },
        }
    }

    fn evaluate_regex(&self, pattern: &str, weight: f32, required: bool, element: &ElementInfo) -> ValidationOutcome {
        let text = element.normalized_text().unwrap_or_default();
        // Anchored to require a full match of the trimmed text (spec §4.L),
        // matching `re.fullmatch` in the original implementation — a bare
        // `is_match` would let `\d+` pass on `"abc123def"`.
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) => {
                let passed = re.is_match(&text);
                ValidationOutcome {
                    rule_type: "regex".into(),
                    passed,
                    score: if passed { 1.0 } else { 0.0 },
                    weight,
                    message: if passed {
                        format!("{text:?} matches {pattern:?}")
                    } else {
                        format!("{text:?} does not match {pattern:?}")
                    },
                }
            }
            Err(e) => ValidationOutcome {
                rule_type: "regex".into(),
                passed: !required,
                score: 0.0,
                weight,
                message: format!("invalid regex {pattern:?}: {e}"),
            },
        }
    }

    fn evaluate_data_type(
        &self,
        kind: DataTypeKind,
        weight: f32,
        _required: bool,
        element: &ElementInfo,
    ) -> ValidationOutcome {
        let text = element.normalized_text().unwrap_or_default();
        let passed = match kind {
            DataTypeKind::Integer => text.trim().parse::<i64>().is_ok(),
            DataTypeKind::Float => text.trim().replace(',', "").parse::<f64>().is_ok(),
            DataTypeKind::String => !text.is_empty(),
            DataTypeKind::Boolean => matches!(
                text.trim().to_lowercase().as_str(),
                "true" | "false" | "yes" | "no" | "0" | "1"
            ),
        };
        ValidationOutcome {
            rule_type: "data_type".into(),
            passed,
            score: if passed { 1.0 } else { 0.0 },
            weight,
            message: format!("{text:?} as {kind:?}: {passed}"),
        }
    }

    fn evaluate_semantic(
        &self,
        kind: SemanticKind,
        weight: f32,
        _required: bool,
        element: &ElementInfo,
    ) -> ValidationOutcome {
        let text = element.normalized_text().unwrap_or_default();
        let passed = match kind {
            SemanticKind::Score => {
                // Spec §4.L: "score = small unsigned int", a single number
                // like "2", not a scoreline like "2-1".
                static SCORE_RE: once_cell::sync::Lazy<Regex> =
                    once_cell::sync::Lazy::new(|| Regex::new(r"^\d{1,2}$").unwrap());
                SCORE_RE.is_match(text.trim())
            }
            SemanticKind::Odds => {
                static ODDS_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
                    Regex::new(r"^[+-]?\d+(\.\d+)?$|^\d+/\d+$").unwrap()
                });
                ODDS_RE.is_match(text.trim())
            }
            SemanticKind::TeamName => {
                let trimmed = text.trim();
                let len = trimmed.chars().count();
                (2..=50).contains(&len)
                    && trimmed.chars().any(char::is_alphabetic)
                    && trimmed.chars().all(|c| c.is_alphabetic() || c == ' ' || c == '-')
            }
            SemanticKind::Time => {
                static TIME_RE: once_cell::sync::Lazy<Regex> =
                    once_cell::sync::Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}(\s*[AaPp][Mm])?$").unwrap());
                TIME_RE.is_match(text.trim())
            }
            SemanticKind::Date => {
                static DATE_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
                    Regex::new(r"^\d{4}-\d{2}-\d{2}$|^\d{1,2}/\d{1,2}/\d{2,4}$").unwrap()
                });
                DATE_RE.is_match(text.trim())
            }
        };
        ValidationOutcome {
            rule_type: "semantic".into(),
            passed,
            score: if passed { 1.0 } else { 0.0 },
            weight,
            message: format!("{text:?} as {kind:?}: {passed}"),
        }
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn element(text: &str) -> ElementInfo {
        ElementInfo {
            tag: "span".into(),
            path: String::new(),
            attributes: HashMap::new(),
            classes: HashSet::new(),
            text: Some(text.into()),
            visible: true,
            interactable: false,
            bounding_box: None,
        }
    }

    #[test]
    fn score_semantic_rule_passes() {
        let engine = ValidationEngine::new();
        let rules = vec![ValidationRule::Semantic {
            kind: SemanticKind::Score,
            weight: 1.0,
            required: true,
        }];
        let (outcomes, score, ok) = engine.validate(&rules, &element("2"));
        assert!(ok);
        assert_eq!(score, 1.0);
        assert!(outcomes[0].passed);
    }

    #[test]
    fn score_semantic_rule_rejects_scoreline() {
        let engine = ValidationEngine::new();
        let rules = vec![ValidationRule::Semantic {
            kind: SemanticKind::Score,
            weight: 1.0,
            required: true,
        }];
        let (outcomes, _score, ok) = engine.validate(&rules, &element("2-1"));
        assert!(!ok);
        assert!(!outcomes[0].passed);
    }

    #[test]
    fn required_rule_failure_fails_overall_even_with_partial_score() {
        let engine = ValidationEngine::new();
        let rules = vec![
            ValidationRule::Semantic {
                kind: SemanticKind::Score,
                weight: 0.5,
                required: true,
            },
            ValidationRule::DataType {
                kind: DataTypeKind::String,
                weight: 0.5,
                required: false,
            },
        ];
        let (_, score, ok) = engine.validate(&rules, &element("not a score"));
        assert!(!ok);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn empty_rules_trivially_pass() {
        let engine = ValidationEngine::new();
        let (outcomes, score, ok) = engine.validate(&[], &element("anything"));
        assert!(outcomes.is_empty());
        assert_eq!(score, 1.0);
        assert!(ok);
    }
}
