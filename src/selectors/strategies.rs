//! Strategy implementations.
//!
//! Each strategy's `attempt` returns `Ok(candidate)` or `Err(reason)` —
//! never an exception used for control flow (REDESIGN FLAGS) — and the
//! resolver pattern-matches on the result. `candidate.quality` is the
//! strategy-specific confidence reward/penalty described in spec §4.J
//! (exact match beats substring, `id` beats `data-*` beats `class`, path
//! depth decays, an accessible name is a bonus); the confidence scorer
//! blends it into the position-stability factor alongside
//! the path heuristic, since both describe how durable a match is likely
//! to be against markup churn — see DESIGN.md for why this crate resolves
//! that ambiguity this way.

use std::time::Instant;

use regex::Regex;

use crate::driver::BrowserDriver;
use crate::selectors::errors::{ResolverError, ResolverResult};
use crate::selectors::model::{DomRelationship, ElementInfo, StrategyKind};

/// One strategy's raw finding, before validation-rule folding.
pub struct Candidate {
    pub element: ElementInfo,
    /// Strategy-specific match quality in `[0,1]`.
    pub quality: f32,
}

impl StrategyKind {
    /// Pure structural check a strategy's own configuration must satisfy
    /// before it is ever tried (spec §3: `validate_config()`).
    pub fn validate_config(&self) -> Result<(), String> {
        match self {
            Self::TextAnchor { anchor_text, .. } => {
                if anchor_text.trim().is_empty() {
                    return Err("text_anchor requires non-empty anchor_text".into());
                }
            }
            Self::AttributeMatch {
                attribute,
                value_pattern,
                ..
            } => {
                if attribute.trim().is_empty() {
                    return Err("attribute_match requires a non-empty attribute name".into());
                }
                Regex::new(value_pattern)
                    .map_err(|e| format!("attribute_match value_pattern invalid regex: {e}"))?;
            }
            Self::DomRelationship { parent_selector, .. } => {
                if parent_selector.trim().is_empty() {
                    return Err("dom_relationship requires a non-empty parent_selector".into());
                }
            }
            Self::RoleBased { role, .. } => {
                if role.trim().is_empty() {
                    return Err("role_based requires a non-empty role".into());
                }
            }
        }
        Ok(())
    }

    /// Attempt to locate one element under `driver` matching this
    /// strategy's configuration, restricted to `scope` when a tab
    /// `dom_scope_expr` applies (spec §4.N step 3).
    pub async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        scope: Option<&str>,
    ) -> ResolverResult<Candidate> {
        let started = Instant::now();
        let result = match self {
            Self::TextAnchor {
                anchor_text,
                case_sensitive,
                proximity_selector,
            } => attempt_text_anchor(driver, anchor_text, *case_sensitive, proximity_selector.as_deref(), scope).await,
            Self::AttributeMatch {
                attribute,
                value_pattern,
                tag,
            } => attempt_attribute_match(driver, attribute, value_pattern, tag.as_deref(), scope).await,
            Self::DomRelationship {
                parent_selector,
                relationship,
            } => attempt_dom_relationship(driver, parent_selector, relationship, scope).await,
            Self::RoleBased {
                role,
                accessible_name,
            } => attempt_role_based(driver, role, accessible_name.as_deref(), scope).await,
        };
        let _elapsed = started.elapsed();
        result
    }
}

fn scoped(css: &str, scope: Option<&str>) -> String {
    match scope {
        Some(s) if !s.is_empty() => format!("{s} {css}"),
        _ => css.to_string(),
    }
}

async fn element_info(
    driver: &dyn BrowserDriver,
    element: &dyn crate::driver::DriverElement,
) -> ResolverResult<ElementInfo> {
    let tag = element.tag_name().await?;
    let text = element.text().await?;
    let attributes = element.attributes().await?;
    let classes = attributes
        .get("class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let path = element.dom_path().await?;
    let visible = element.is_visible().await?;
    let interactable = element.is_interactable().await?;
    let bounding_box = element.bounding_box().await?;
    let _ = driver;
    Ok(ElementInfo {
        tag,
        path,
        attributes,
        classes,
        text,
        visible,
        interactable,
        bounding_box,
    })
}

async fn attempt_text_anchor(
    driver: &dyn BrowserDriver,
    anchor_text: &str,
    case_sensitive: bool,
    proximity_selector: Option<&str>,
    scope: Option<&str>,
) -> ResolverResult<Candidate> {
    let proximity_scope = proximity_selector.map(|p| scoped(p, scope));
    let matches = driver
        .find_by_text(anchor_text, case_sensitive, proximity_scope.as_deref())
        .await?;

    let mut best: Option<(ElementInfo, f32)> = None;
    for element in &matches {
        let info = element_info(driver, element.as_ref()).await?;
        let normalized = info.normalized_text();
        let quality = match &normalized {
            Some(t) if eq_fold(t, anchor_text, case_sensitive) => 1.0,
            Some(t) if contains_fold(t, anchor_text, case_sensitive) => 0.6,
            _ => 0.0,
        };
        if normalized.is_none() {
            continue;
        }
        if best.as_ref().is_none_or(|(_, q)| quality > *q) {
            best = Some((info, quality));
        }
    }

    let (element, quality) = best.ok_or_else(|| {
        ResolverError::StrategyExecution(format!("no element with text matching {anchor_text:?}"))
    })?;
    Ok(Candidate { element, quality })
}

fn eq_fold(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

fn contains_fold(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Attribute specificity ranking used for the attribute-match confidence
/// reward: `id` beats `data-*` beats everything else, which beats `class`.
fn attribute_specificity(attribute: &str) -> f32 {
    if attribute == "id" {
        1.0
    } else if attribute.starts_with("data-") {
        0.75
    } else if attribute == "class" {
        0.4
    } else {
        0.6
    }
}

async fn attempt_attribute_match(
    driver: &dyn BrowserDriver,
    attribute: &str,
    value_pattern: &str,
    tag: Option<&str>,
    scope: Option<&str>,
) -> ResolverResult<Candidate> {
    let re = Regex::new(value_pattern)
        .map_err(|e| ResolverError::StrategyExecution(format!("invalid value_pattern: {e}")))?;
    let css = scoped(tag.unwrap_or("*"), scope);
    let elements = driver.query_selector_all(&css).await?;

    let mut best: Option<(ElementInfo, f32)> = None;
    for element in &elements {
        let Some(value) = element.attribute(attribute).await? else {
            continue;
        };
        let Some(full) = re.find(&value) else {
            continue;
        };
        let is_full_match = full.start() == 0 && full.end() == value.len();
        let specificity = attribute_specificity(attribute);
        let quality = if is_full_match {
            specificity
        } else {
            specificity * 0.6
        };
        let info = element_info(driver, element.as_ref()).await?;
        if best.as_ref().is_none_or(|(_, q)| quality > *q) {
            best = Some((info, quality));
        }
    }

    let (element, quality) = best.ok_or_else(|| {
        ResolverError::StrategyExecution(format!(
            "no element with attribute {attribute}={value_pattern:?}"
        ))
    })?;
    Ok(Candidate { element, quality })
}

async fn attempt_dom_relationship(
    driver: &dyn BrowserDriver,
    parent_selector: &str,
    relationship: &DomRelationship,
    scope: Option<&str>,
) -> ResolverResult<Candidate> {
    let parent_css = scoped(parent_selector, scope);
    let parent_exists = driver.query_selector(&parent_css).await?.is_some();
    if !parent_exists {
        return Err(ResolverError::StrategyExecution(format!(
            "parent_selector {parent_selector:?} did not resolve"
        )));
    }

    let (css, depth, positional) = match relationship {
        DomRelationship::Child(nth) => (
            format!("{parent_css} > :nth-child({})", nth + 1),
            1,
            true,
        ),
        DomRelationship::Descendant(kind) => (format!("{parent_css} {kind}"), 2, false),
        DomRelationship::Sibling => (format!("{parent_css} ~ *"), 1, false),
    };

    let element = driver
        .query_selector(&css)
        .await?
        .ok_or_else(|| ResolverError::StrategyExecution(format!("relationship target {css:?} not found")))?;
    let info = element_info(driver, element.as_ref()).await?;

    // Decays with path depth and with use of positional (:nth-child)
    // segments, per spec §4.J.
    let mut quality = 1.0 - 0.15 * f32::from(depth - 1);
    if positional {
        quality -= 0.1;
    }
    Ok(Candidate {
        element: info,
        quality: quality.clamp(0.0, 1.0),
    })
}

async fn attempt_role_based(
    driver: &dyn BrowserDriver,
    role: &str,
    accessible_name: Option<&str>,
    scope: Option<&str>,
) -> ResolverResult<Candidate> {
    let css = scoped(&format!("[role={role:?}]"), scope);
    let elements = driver.query_selector_all(&css).await?;

    let mut best: Option<(ElementInfo, f32)> = None;
    for element in &elements {
        let aria_label = element.attribute("aria-label").await?;
        let info = element_info(driver, element.as_ref()).await?;

        if let Some(expected_name) = accessible_name {
            let matches_name = aria_label
                .as_deref()
                .map(|l| l.eq_ignore_ascii_case(expected_name))
                .unwrap_or(false)
                || info
                    .normalized_text()
                    .as_deref()
                    .map(|t| t.eq_ignore_ascii_case(expected_name))
                    .unwrap_or(false);
            if !matches_name {
                continue;
            }
        }

        let quality = if aria_label.is_some() { 0.9 } else { 0.6 };
        if best.as_ref().is_none_or(|(_, q)| quality > *q) {
            best = Some((info, quality));
        }
    }

    let (element, quality) = best.ok_or_else(|| {
        ResolverError::StrategyExecution(format!("no element with role={role:?} found"))
    })?;
    Ok(Candidate { element, quality })
}
