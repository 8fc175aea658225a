//! Confidence assignment and validation flags.
//!
//! Validation happens in two passes. [`apply_base_rules`] runs locally and
//! always: it assigns per-type confidence floors (or penalty scores for
//! empty content) and sets `validated` from the configured threshold.
//! [`apply_overlay`] then optionally folds in second-opinion confidences
//! from the reasoning service, keyed by element id; elements absent from
//! the overlay keep their local verdict. The final validated count is
//! always recomputed from the elements themselves, never trusted from an
//! intermediate value.

use crate::model::Element;
use std::collections::HashMap;
use tracing::debug;

/// Apply the local per-type confidence rules and set `validated` flags.
///
/// | type  | valid when                      | confidence if valid | if invalid |
/// |-------|---------------------------------|---------------------|------------|
/// | text  | non-empty stripped string       | max(current, 0.8)   | 0.3        |
/// | table | structured `rows` is non-empty  | max(current, 0.9)   | 0.4        |
/// | page  | always                          | 1.0                 | —          |
///
/// Other element types keep their current confidence and only get the
/// threshold check.
pub fn apply_base_rules(elements: &mut [Element], threshold: f64) {
    for element in elements.iter_mut() {
        match element.kind.as_str() {
            "text" => {
                let has_content = element
                    .content
                    .as_text()
                    .is_some_and(|s| !s.trim().is_empty());
                element.confidence = if has_content {
                    element.confidence.max(0.8)
                } else {
                    0.3
                };
            }
            "table" => {
                let has_rows = element
                    .content
                    .as_structured()
                    .and_then(|m| m.get("rows"))
                    .and_then(|rows| rows.as_array())
                    .is_some_and(|rows| !rows.is_empty());
                element.confidence = if has_rows {
                    element.confidence.max(0.9)
                } else {
                    0.4
                };
            }
            "page" => {
                element.confidence = 1.0;
            }
            _ => {}
        }
        element.validated = element.confidence >= threshold;
    }
}

/// Overlay second-opinion confidences onto matching elements.
///
/// Every element whose id appears in `overlay` has its confidence and
/// `validated` flag overwritten; all others are untouched. Returns how many
/// elements were updated.
pub fn apply_overlay(
    elements: &mut [Element],
    overlay: &HashMap<String, f64>,
    threshold: f64,
) -> usize {
    let mut updated = 0;
    for element in elements.iter_mut() {
        if let Some(&confidence) = overlay.get(&element.id) {
            element.confidence = confidence;
            element.validated = confidence >= threshold;
            updated += 1;
        }
    }
    debug!("overlay updated {updated}/{} elements", elements.len());
    updated
}

/// Count elements currently marked validated.
pub fn validated_count(elements: &[Element]) -> usize {
    elements.iter().filter(|e| e.validated).count()
}
