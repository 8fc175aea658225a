//! The six-stage document processing workflow.
//!
//! [`Pipeline::process`] drives one transaction through
//! pending → parsing → structuring → validating → highlighting → storing,
//! persisting the whole snapshot at every stage boundary so an observer
//! polling the store always sees a consistent picture of how far the
//! transaction got. Fatal stage errors land the transaction in a terminal
//! `failed` snapshot with the error message recorded; enhancement failures
//! are logged into the snapshot and the locally-built data stands.
//!
//! Collaborators are injected: the extractor and store are trait objects,
//! and the [`Enhancer`] is optional — without it the pipeline is fully
//! deterministic and offline.

use crate::config::PipelineConfig;
use crate::enhance::Enhancer;
use crate::error::Doc2TreeError;
use crate::extract::TextExtractor;
use crate::model::{
    CorrectionRequest, DocumentMetadata, DocumentType, Element, ProcessingResult,
    ProcessingStatus,
};
use crate::store::ResultStore;
use crate::structure::build_element_tree;
use crate::validate::{apply_base_rules, apply_overlay, validated_count};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Highlight styling applied to every non-page element.
const HIGHLIGHT_BORDER_WIDTH: u32 = 2;
const HIGHLIGHT_OPACITY: f64 = 0.3;
const SUMMARY_PREVIEW_CHARS: usize = 100;

fn highlight_color(kind: &str) -> &'static str {
    match kind {
        "text" => "#3B82F6",
        "table" => "#10B981",
        "form_field" => "#F59E0B",
        "image" => "#8B5CF6",
        "header" => "#EF4444",
        _ => "#6B7280",
    }
}

/// Document processing pipeline with injected collaborators.
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    store: Arc<dyn ResultStore>,
    enhancer: Option<Enhancer>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        store: Arc<dyn ResultStore>,
        enhancer: Option<Enhancer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            enhancer,
            config,
        }
    }

    /// Process the document at `path` end to end.
    ///
    /// Returns the new transaction id. Stage failures after the initial
    /// snapshot do NOT surface as `Err`: they are recorded in the
    /// transaction's terminal `failed` snapshot, and the id is still
    /// returned so the caller can inspect it. Only failures before a
    /// snapshot exists (unsupported format, unreadable file, store down)
    /// come back as `Err`.
    pub async fn process(&self, path: &Path, filename: &str) -> Result<String, Doc2TreeError> {
        let document_type = DocumentType::from_filename(filename).ok_or_else(|| {
            Doc2TreeError::UnsupportedFormat {
                filename: filename.to_string(),
            }
        })?;
        let file_size = file_size(path).await?;

        let transaction_id = Uuid::new_v4().to_string();
        let metadata = DocumentMetadata {
            filename: filename.to_string(),
            file_size,
            document_type,
            page_count: 0,
            upload_timestamp: Utc::now(),
            processing_start: Some(Utc::now()),
            processing_end: None,
            ocr_languages: Vec::new(),
            ocr_models_used: Vec::new(),
        };
        let mut state = ProcessingResult::new(transaction_id.clone(), metadata);
        self.store.put(state.clone()).await?;
        info!("transaction {transaction_id}: accepted '{filename}' ({file_size} bytes)");

        // ── Parsing ───────────────────────────────────────────────────────
        self.begin_stage(&mut state, ProcessingStatus::Parsing, "Parsing document")
            .await?;
        let extraction = match self.extractor.extract(path, filename).await {
            Ok(extraction) => extraction,
            Err(e) => return self.fail(state, e).await,
        };
        state.metadata.page_count = extraction.metadata.page_count;
        state.metadata.ocr_languages = extraction.metadata.ocr_languages;
        state.metadata.ocr_models_used = extraction.metadata.ocr_models_used;
        state.raw_text = Some(extraction.full_text);
        state.log(format!(
            "Extracted {} fragments from {} page(s)",
            extraction.fragments.len(),
            state.metadata.page_count
        ));

        // ── Structuring ───────────────────────────────────────────────────
        self.begin_stage(
            &mut state,
            ProcessingStatus::Structuring,
            "Structuring content",
        )
        .await?;
        let mut elements = build_element_tree(&extraction.fragments);
        if let (Some(enhancer), false) = (&self.enhancer, elements.is_empty()) {
            match enhancer.enhance_structure(&elements).await {
                Ok(enhanced) if !enhanced.is_empty() => {
                    if enhanced != elements {
                        state.log("Structure enhanced via reasoning service");
                    }
                    elements = enhanced;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("transaction {transaction_id}: structure enhancement failed: {e}");
                    state.log("LLM enhancement failed, using basic structure");
                }
            }
        }
        state.log(format!("Structured {} elements", elements.len()));
        state.extracted_elements = elements;

        // ── Validating ────────────────────────────────────────────────────
        self.begin_stage(
            &mut state,
            ProcessingStatus::Validating,
            "Validating elements",
        )
        .await?;
        let threshold = self.config.confidence_threshold;
        apply_base_rules(&mut state.extracted_elements, threshold);
        if let (Some(enhancer), Some(raw_text)) = (&self.enhancer, &state.raw_text) {
            if !state.extracted_elements.is_empty() {
                let sample: String = raw_text
                    .chars()
                    .take(self.config.validation_sample_chars)
                    .collect();
                match enhancer.second_opinion(&sample, &state.extracted_elements).await {
                    Ok(overlay) if !overlay.is_empty() => {
                        let updated =
                            apply_overlay(&mut state.extracted_elements, &overlay, threshold);
                        state.log(format!("Second-opinion validation updated {updated} elements"));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("transaction {transaction_id}: validation enhancement failed: {e}");
                        state.log("LLM validation failed, using local confidence scores");
                    }
                }
            }
        }
        state.log(format!(
            "Validated {}/{} elements",
            validated_count(&state.extracted_elements),
            state.extracted_elements.len()
        ));

        // ── Highlighting ──────────────────────────────────────────────────
        self.begin_stage(
            &mut state,
            ProcessingStatus::Highlighting,
            "Generating highlights",
        )
        .await?;
        let highlighted = annotate_highlights(&mut state.extracted_elements);
        state.log(format!("Generated highlighting metadata for {highlighted} elements"));

        // ── Storing ───────────────────────────────────────────────────────
        self.begin_stage(&mut state, ProcessingStatus::Storing, "Storing results")
            .await?;
        state.structured_data = Some(build_structured_data(&state.extracted_elements));
        state.metadata.processing_end = Some(Utc::now());
        state.status = ProcessingStatus::Completed;
        state.log("Completed processing");
        self.store.put(state).await?;
        info!("transaction {transaction_id}: completed");

        Ok(transaction_id)
    }

    async fn begin_stage(
        &self,
        state: &mut ProcessingResult,
        status: ProcessingStatus,
        label: &str,
    ) -> Result<(), Doc2TreeError> {
        state.status = status;
        state.log(label);
        self.store.put(state.clone()).await
    }

    /// Record a fatal stage error as a terminal `failed` snapshot.
    ///
    /// Still returns the transaction id: the failure is part of the
    /// transaction's observable history, not an exceptional path for the
    /// caller.
    async fn fail(
        &self,
        mut state: ProcessingResult,
        cause: Doc2TreeError,
    ) -> Result<String, Doc2TreeError> {
        error!(
            "transaction {}: processing failed: {cause}",
            state.transaction_id
        );
        let transaction_id = state.transaction_id.clone();
        state.status = ProcessingStatus::Failed;
        state.error_message = Some(cause.to_string());
        state.log(format!("Processing failed: {cause}"));
        if let Err(persist) = self.store.put(state).await {
            warn!("transaction {transaction_id}: could not persist failure snapshot: {persist}");
        }
        Ok(transaction_id)
    }
}

async fn file_size(path: &Path) -> Result<u64, Doc2TreeError> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => Doc2TreeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Doc2TreeError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    Ok(meta.len())
}

/// Attach highlight styling to every non-page element. Returns how many
/// elements were annotated.
fn annotate_highlights(elements: &mut [Element]) -> usize {
    let mut annotated = 0;
    for element in elements.iter_mut() {
        if element.kind == "page" {
            continue;
        }
        element.metadata.insert(
            "highlight_color".to_string(),
            Value::String(highlight_color(&element.kind).to_string()),
        );
        element
            .metadata
            .insert("border_width".to_string(), json!(HIGHLIGHT_BORDER_WIDTH));
        element
            .metadata
            .insert("opacity".to_string(), json!(HIGHLIGHT_OPACITY));
        annotated += 1;
    }
    annotated
}

/// Build the queryable summary stored alongside the element tree.
fn build_structured_data(elements: &[Element]) -> Value {
    let mut by_page: BTreeMap<u32, Vec<Value>> = BTreeMap::new();
    let mut pages = 0usize;
    let mut texts = 0usize;
    let mut tables = 0usize;

    for element in elements {
        match element.kind.as_str() {
            "page" => {
                pages += 1;
                continue;
            }
            "text" => texts += 1,
            "table" => tables += 1,
            _ => {}
        }
        by_page
            .entry(element.grounding.page_number)
            .or_default()
            .push(json!({
                "id": element.id,
                "type": element.kind,
                "content": element.content.preview(SUMMARY_PREVIEW_CHARS),
                "confidence": element.confidence,
                "validated": element.validated,
            }));
    }

    let mut elements_by_page = Map::new();
    for (page, entries) in by_page {
        elements_by_page.insert(page.to_string(), Value::Array(entries));
    }

    json!({
        "summary": {
            "total_elements": elements.len(),
            "pages": pages,
            "text_elements": texts,
            "table_elements": tables,
            "validated_elements": validated_count(elements),
        },
        "elements_by_page": elements_by_page,
    })
}

/// Apply human corrections to a stored result.
///
/// Each correction overwrites the element's content (and optionally type),
/// marks it validated, and backs up the original content with the
/// correction timestamp and notes under the element's `corrections` map.
/// Returns how many corrections matched an element.
pub async fn apply_corrections(
    store: &dyn ResultStore,
    transaction_id: &str,
    corrections: &[CorrectionRequest],
) -> Result<usize, Doc2TreeError> {
    let corrections = corrections.to_vec();
    let applied = Arc::new(AtomicUsize::new(0));
    let applied_in = applied.clone();

    let found = store
        .update(
            transaction_id,
            Box::new(move |result| {
                let mut count = 0;
                for correction in corrections {
                    let Some(element) = result
                        .extracted_elements
                        .iter_mut()
                        .find(|e| e.id == correction.element_id)
                    else {
                        continue;
                    };

                    let mut backup = element.corrections.take().unwrap_or_default();
                    backup.insert(
                        "original_content".to_string(),
                        serde_json::to_value(&element.content).unwrap_or(Value::Null),
                    );
                    backup.insert(
                        "corrected_at".to_string(),
                        Value::String(Utc::now().to_rfc3339()),
                    );
                    if let Some(notes) = correction.notes {
                        backup.insert("notes".to_string(), Value::String(notes));
                    }
                    element.corrections = Some(backup);

                    element.content = correction.corrected_content;
                    if let Some(kind) = correction.corrected_type {
                        element.kind = kind;
                    }
                    element.validated = true;
                    count += 1;
                }
                result.log(format!("Applied {count} corrections"));
                applied_in.store(count, Ordering::SeqCst);
            }),
        )
        .await?;

    if !found {
        return Err(Doc2TreeError::UnknownTransaction {
            transaction_id: transaction_id.to_string(),
        });
    }
    Ok(applied.load(Ordering::SeqCst))
}
