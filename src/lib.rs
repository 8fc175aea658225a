//! # doc2tree
//!
//! Turn documents into validated, visually-grounded element trees.
//!
//! ## Why this crate?
//!
//! Downstream consumers of document extraction rarely want a flat blob of
//! text — they want to know *what* was on each page, *where* it was, and
//! *how much* to trust it. This crate extracts raw content from a document,
//! assembles it into a page → element tree with normalised bounding boxes,
//! scores every element's confidence, and persists the whole result as an
//! auditable snapshot. An OpenAI-compatible reasoning service can refine
//! structure and confidence scores, but it is strictly optional: every
//! enhancement degrades to the locally-built result on failure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Parse       extract raw text + fragments (lopdf, spawn_blocking)
//!  ├─ 2. Structure   page → text/table element tree, deterministic ids
//!  ├─ 3. Validate    per-type confidence rules + optional second opinion
//!  ├─ 4. Highlight   per-type display styling on every leaf element
//!  └─ 5. Store       summary + snapshot, in memory or mirrored to JSON
//! ```
//!
//! Each stage transition persists the full snapshot, so polling the store
//! mid-run always shows a consistent status, log, and progress picture.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2tree::{MemoryStore, PdfExtractor, Pipeline, PipelineConfig, ResultStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let store = Arc::new(MemoryStore::new());
//!     let pipeline = Pipeline::new(
//!         Arc::new(PdfExtractor::new()),
//!         store.clone(),
//!         None, // no reasoning service: fully offline
//!         config,
//!     );
//!     let id = pipeline.process(Path::new("invoice.pdf"), "invoice.pdf").await?;
//!     let result = store.get(&id).await?.ok_or("missing result")?;
//!     println!("{}: {} elements", result.status, result.extracted_elements.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2tree` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc2tree = { version = "0.1", default-features = false }
//! ```
//!
//! ## Enhancement
//!
//! With an `OPENAI_API_KEY` (or any OpenAI-compatible endpoint), the
//! structuring and validation stages each get a reasoning-service pass:
//! structure enhancement may merge and re-parent elements, and validation
//! overlays second-opinion confidence scores. Calls are chunked, bounded to
//! a small concurrency ceiling, and paced with a fixed per-slot delay — see
//! [`schedule::run_chunks`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chunk;
pub mod config;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod reasoning;
pub mod schedule;
pub mod store;
pub mod structure;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use enhance::Enhancer;
pub use error::{Doc2TreeError, EnhancementError, ServiceError};
pub use extract::{Extraction, PdfExtractor, RawFragment, TextExtractor};
pub use model::{
    BoundingBox, CorrectionRequest, DocumentMetadata, DocumentType, Element, ElementContent,
    ProcessingResult, ProcessingStatus, VisualGrounding,
};
pub use pipeline::{apply_corrections, Pipeline};
pub use reasoning::{OpenAiReasoning, ReasoningService};
pub use store::{MemoryStore, ResultStore};
