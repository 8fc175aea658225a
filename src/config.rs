//! Configuration for the document processing pipeline.
//!
//! Every knob lives in one [`PipelineConfig`] struct, built via its
//! validating builder. Keeping the full configuration in one place makes it
//! trivial to share across transactions, log, and diff two runs to
//! understand why their outputs differ.

use crate::error::Doc2TreeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use doc2tree::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .confidence_threshold(0.8)
///     .elements_per_chunk(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Confidence at or above which an element counts as validated. Default: 0.7.
    pub confidence_threshold: f64,

    /// Maximum characters per text chunk for structured extraction. Default: 4000.
    ///
    /// Sized so one chunk plus the system prompt stays comfortably inside a
    /// single reasoning-service request.
    pub text_chunk_chars: usize,

    /// Maximum characters per text chunk when building the validation
    /// context sample. Default: 3000.
    pub validation_chunk_chars: usize,

    /// Characters of raw text handed to the validation stage as source
    /// context. Default: 5000.
    pub validation_sample_chars: usize,

    /// Maximum elements per chunk for structure/validation calls. Default: 20.
    pub elements_per_chunk: usize,

    /// Concurrency ceiling for extraction and validation calls. Default: 2.
    pub extract_max_concurrent: usize,

    /// Pacing delay each scheduler slot waits after a completed extraction
    /// or validation call. Default: 1 s.
    ///
    /// Together with `extract_max_concurrent` this bounds the steady-state
    /// call rate to `max_concurrent / pacing_delay`; there is no dynamic
    /// back-off on observed rate-limit errors.
    pub extract_pacing: Duration,

    /// Concurrency ceiling for structure-enhancement calls. Default: 1.
    ///
    /// Structure prompts carry whole element chunks and draw much larger
    /// completions, so they get the most conservative pacing.
    pub structure_max_concurrent: usize,

    /// Pacing delay for structure-enhancement calls. Default: 2 s.
    pub structure_pacing: Duration,

    /// Reasoning model identifier. Default: "gpt-4o".
    pub model: String,

    /// Sampling temperature for reasoning calls. Default: 0.2.
    ///
    /// Low temperature keeps extraction and validation deterministic and
    /// faithful to the source text.
    pub temperature: f32,

    /// Maximum tokens per reasoning completion. Default: 1000.
    pub max_completion_tokens: u32,

    /// Per-call timeout for the reasoning service. Default: 60 s.
    pub service_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            text_chunk_chars: 4000,
            validation_chunk_chars: 3000,
            validation_sample_chars: 5000,
            elements_per_chunk: 20,
            extract_max_concurrent: 2,
            extract_pacing: Duration::from_secs(1),
            structure_max_concurrent: 1,
            structure_pacing: Duration::from_secs(2),
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_completion_tokens: 1000,
            service_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn text_chunk_chars(mut self, chars: usize) -> Self {
        self.config.text_chunk_chars = chars.max(1);
        self
    }

    pub fn validation_chunk_chars(mut self, chars: usize) -> Self {
        self.config.validation_chunk_chars = chars.max(1);
        self
    }

    pub fn validation_sample_chars(mut self, chars: usize) -> Self {
        self.config.validation_sample_chars = chars;
        self
    }

    pub fn elements_per_chunk(mut self, n: usize) -> Self {
        self.config.elements_per_chunk = n.max(1);
        self
    }

    pub fn extract_max_concurrent(mut self, n: usize) -> Self {
        self.config.extract_max_concurrent = n.max(1);
        self
    }

    pub fn extract_pacing(mut self, pacing: Duration) -> Self {
        self.config.extract_pacing = pacing;
        self
    }

    pub fn structure_max_concurrent(mut self, n: usize) -> Self {
        self.config.structure_max_concurrent = n.max(1);
        self
    }

    pub fn structure_pacing(mut self, pacing: Duration) -> Self {
        self.config.structure_pacing = pacing;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_completion_tokens(mut self, n: u32) -> Self {
        self.config.max_completion_tokens = n;
        self
    }

    pub fn service_timeout(mut self, timeout: Duration) -> Self {
        self.config.service_timeout = timeout;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Doc2TreeError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(Doc2TreeError::InvalidConfig(format!(
                "confidence_threshold must be in [0,1], got {}",
                c.confidence_threshold
            )));
        }
        if c.text_chunk_chars == 0 || c.validation_chunk_chars == 0 {
            return Err(Doc2TreeError::InvalidConfig(
                "chunk sizes must be ≥ 1".into(),
            ));
        }
        if c.extract_max_concurrent == 0 || c.structure_max_concurrent == 0 {
            return Err(Doc2TreeError::InvalidConfig(
                "scheduler concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
