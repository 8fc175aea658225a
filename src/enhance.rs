//! Reasoning-service enhancement: chunk, fan out, reorder, merge.
//!
//! [`Enhancer`] wraps the three staged enhancement operations around the
//! chunking ([`crate::chunk`]), scheduling ([`crate::schedule`]) and merging
//! ([`crate::merge`]) primitives:
//!
//! * [`Enhancer::extract_structured`] — schema-driven extraction from raw
//!   text, merged across chunks;
//! * [`Enhancer::enhance_structure`] — a second-opinion element tree; the
//!   caller supersedes the local tree only when this returns a non-empty,
//!   schema-valid list;
//! * [`Enhancer::second_opinion`] — per-element-id confidence overlay for
//!   the validation stage.
//!
//! The scheduler yields results in completion order; every operation here
//! carries the chunk index through the worker and restores submission order
//! before merging, so the combined output is deterministic for a given set
//! of worker responses.
//!
//! All failures here are [`EnhancementError`]s: the pipeline logs them and
//! keeps its locally-built data.

use crate::chunk::{split_elements, split_text};
use crate::config::PipelineConfig;
use crate::error::EnhancementError;
use crate::merge::merge_partials;
use crate::model::Element;
use crate::prompts::{
    structure_user_content, validation_user_content, EXTRACTION_SYSTEM_PROMPT,
    STRUCTURE_SYSTEM_PROMPT, VALIDATION_SYSTEM_PROMPT,
};
use crate::reasoning::ReasoningService;
use crate::schedule::{run_chunks, SchedulerOptions};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Staged reasoning-service refinement over chunked inputs.
pub struct Enhancer {
    service: Arc<dyn ReasoningService>,
    config: PipelineConfig,
}

impl Enhancer {
    pub fn new(service: Arc<dyn ReasoningService>, config: PipelineConfig) -> Self {
        Self { service, config }
    }

    fn extract_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_concurrent: self.config.extract_max_concurrent,
            pacing_delay: self.config.extract_pacing,
        }
    }

    fn structure_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_concurrent: self.config.structure_max_concurrent,
            pacing_delay: self.config.structure_pacing,
        }
    }

    /// Extract structured content from `text` according to `schema`.
    ///
    /// Oversized text is chunked at paragraph boundaries and fanned out;
    /// per-chunk failures degrade to empty partials, and the partials are
    /// merged in submission order with [`merge_partials`].
    pub async fn extract_structured(
        &self,
        text: &str,
        schema: &Value,
    ) -> Result<Map<String, Value>, EnhancementError> {
        let chunks = split_text(text, self.config.text_chunk_chars);
        info!("split text into {} chunk(s) for extraction", chunks.len());

        if chunks.len() == 1 {
            return self.extract_from_chunk(&chunks[0], schema).await;
        }

        let indexed: Vec<(usize, Map<String, Value>)> = run_chunks(
            chunks,
            |chunk, index, _total| async move {
                let partial = self.extract_from_chunk(&chunk, schema).await?;
                Ok((index, partial))
            },
            |index| (index, Map::new()),
            self.extract_options(),
        )
        .await;

        Ok(merge_partials(reorder(indexed)))
    }

    /// A best-effort structure for when the reasoning service is
    /// unavailable: the schema's keys with empty/null values.
    pub fn fallback_structure(schema: &Value) -> Map<String, Value> {
        let mut result = Map::new();
        if let Value::Object(schema) = schema {
            for (key, value) in schema {
                let empty = match value {
                    Value::Object(_) => Value::Object(Map::new()),
                    Value::Array(_) => Value::Array(vec![]),
                    _ => Value::Null,
                };
                result.insert(key.clone(), empty);
            }
        }
        result
    }

    /// Ask the service for an enhanced element tree.
    ///
    /// Chunks that come back unusable fall back to their original elements,
    /// so the returned list always covers the whole input. The caller
    /// decides whether to supersede the local tree.
    pub async fn enhance_structure(
        &self,
        elements: &[Element],
    ) -> Result<Vec<Element>, EnhancementError> {
        let chunks = split_elements(elements, self.config.elements_per_chunk);
        info!(
            "split {} elements into {} chunk(s) for structure enhancement",
            elements.len(),
            chunks.len()
        );
        let originals = chunks.clone();

        let indexed: Vec<(usize, Vec<Element>)> = run_chunks(
            chunks,
            |chunk, index, total| {
                let originals = &originals;
                async move {
                    let chunk_json = serde_json::to_string(&chunk).map_err(|e| {
                        EnhancementError::Unusable {
                            detail: e.to_string(),
                        }
                    })?;
                    let response = self
                        .service
                        .call(
                            STRUCTURE_SYSTEM_PROMPT,
                            &structure_user_content(&chunk_json, index, total),
                            None,
                        )
                        .await?;
                    Ok((index, parse_structure_response(response, &originals[index])))
                }
            },
            |index| (index, originals[index].clone()),
            self.structure_options(),
        )
        .await;

        let enhanced: Vec<Element> = reorder(indexed).into_iter().flatten().collect();
        Ok(enhanced)
    }

    /// Second-opinion confidences per element id for the validation stage.
    ///
    /// The first two validation-sized text chunks serve as source context
    /// for every element chunk. Elements absent from the combined response
    /// keep their local verdict.
    pub async fn second_opinion(
        &self,
        raw_text: &str,
        elements: &[Element],
    ) -> Result<HashMap<String, f64>, EnhancementError> {
        let text_chunks = split_text(raw_text, self.config.validation_chunk_chars);
        let sample_len = text_chunks.len().min(2);
        let text_sample = text_chunks[..sample_len].join("\n\n");

        let chunks = split_elements(elements, self.config.elements_per_chunk);
        info!(
            "split {} elements into {} chunk(s) for validation",
            elements.len(),
            chunks.len()
        );

        let indexed: Vec<(usize, HashMap<String, f64>)> = run_chunks(
            chunks,
            |chunk, index, total| {
                let text_sample = &text_sample;
                async move {
                    let chunk_json = serde_json::to_string(&chunk).map_err(|e| {
                        EnhancementError::Unusable {
                            detail: e.to_string(),
                        }
                    })?;
                    let response = self
                        .service
                        .call(
                            VALIDATION_SYSTEM_PROMPT,
                            &validation_user_content(text_sample, &chunk_json, index, total),
                            None,
                        )
                        .await?;
                    Ok((index, parse_validation_response(response)))
                }
            },
            |index| (index, HashMap::new()),
            self.extract_options(),
        )
        .await;

        let mut overlay = HashMap::new();
        for (_, partial) in reorder_indexed(indexed) {
            overlay.extend(partial);
        }
        Ok(overlay)
    }

    async fn extract_from_chunk(
        &self,
        chunk: &str,
        schema: &Value,
    ) -> Result<Map<String, Value>, EnhancementError> {
        let response = self
            .service
            .call(EXTRACTION_SYSTEM_PROMPT, chunk, Some(schema))
            .await?;
        match response {
            Value::Object(map) => Ok(map),
            other => Err(EnhancementError::Unusable {
                detail: format!("expected a JSON object, got {}", kind_of(&other)),
            }),
        }
    }
}

/// Restore submission order and drop the indices.
fn reorder<T>(mut indexed: Vec<(usize, T)>) -> Vec<T> {
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, value)| value).collect()
}

/// Restore submission order, keeping the indices.
fn reorder_indexed<T>(mut indexed: Vec<(usize, T)>) -> Vec<(usize, T)> {
    indexed.sort_by_key(|(index, _)| *index);
    indexed
}

/// Decode a structure-enhancement response into elements.
///
/// Accepts a bare array or `{"elements": [...]}`. Anything else — including
/// element lists that fail schema validation — falls back to the chunk's
/// original elements.
fn parse_structure_response(response: Value, original: &[Element]) -> Vec<Element> {
    let candidates = match response {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => match map.remove("elements") {
            Some(Value::Array(items)) => Value::Array(items),
            _ => {
                warn!("structure response has no element list; keeping original chunk");
                return original.to_vec();
            }
        },
        _ => {
            warn!("structure response is not JSON array/object; keeping original chunk");
            return original.to_vec();
        }
    };

    match serde_json::from_value::<Vec<Element>>(candidates) {
        Ok(elements) if !elements.is_empty() => elements,
        Ok(_) => original.to_vec(),
        Err(e) => {
            warn!("enhanced elements failed schema validation: {e}; keeping original chunk");
            original.to_vec()
        }
    }
}

/// Decode a validation response into an id → confidence map.
fn parse_validation_response(response: Value) -> HashMap<String, f64> {
    let mut partial = HashMap::new();
    let Some(entries) = response.get("elements").and_then(Value::as_array) else {
        return partial;
    };
    for entry in entries {
        let (Some(id), Some(confidence)) = (
            entry.get("id").and_then(Value::as_str),
            entry.get("confidence").and_then(Value::as_f64),
        ) else {
            continue;
        };
        partial.insert(id.to_string(), confidence);
    }
    partial
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
