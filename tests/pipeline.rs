//! End-to-end pipeline tests with fake collaborators.
//!
//! Every collaborator seam is injected: a `FakeExtractor` stands in for PDF
//! parsing and a `FakeReasoning` answers enhancement calls by dispatching on
//! the system prompt. No network, no real documents — the tests exercise
//! the full stage sequence, snapshot persistence, degradation paths and the
//! correction flow.

use async_trait::async_trait;
use chrono::Utc;
use doc2tree::{
    apply_corrections, CorrectionRequest, Doc2TreeError, DocumentMetadata, DocumentType,
    ElementContent, Extraction, MemoryStore, Pipeline, PipelineConfig, ProcessingResult,
    ProcessingStatus, RawFragment, ReasoningService, ResultStore, ServiceError, TextExtractor,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeExtractor {
    fail: bool,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, path: &Path, filename: &str) -> Result<Extraction, Doc2TreeError> {
        if self.fail {
            return Err(Doc2TreeError::CorruptDocument {
                path: path.to_path_buf(),
                detail: "xref table is damaged".to_string(),
            });
        }
        Ok(Extraction {
            full_text: "ACME Corp Invoice #42\n\nTotal due: $1,250.00".to_string(),
            fragments: vec![
                RawFragment::Text {
                    text: "ACME Corp Invoice #42".to_string(),
                    page: Some(1),
                    bbox: None,
                    confidence: None,
                },
                RawFragment::Text {
                    text: "Total due: $1,250.00".to_string(),
                    page: Some(1),
                    bbox: None,
                    confidence: None,
                },
            ],
            metadata: DocumentMetadata {
                filename: filename.to_string(),
                file_size: 0,
                document_type: DocumentType::Pdf,
                page_count: 1,
                upload_timestamp: Utc::now(),
                processing_start: None,
                processing_end: None,
                ocr_languages: vec!["en".to_string()],
                ocr_models_used: vec![],
            },
        })
    }
}

/// Dispatches on the system prompt: structure and validation calls get their
/// configured responses; unconfigured calls fail with a timeout.
struct FakeReasoning {
    structure_response: Option<Value>,
    validation_response: Option<Value>,
}

impl FakeReasoning {
    fn unavailable() -> Self {
        Self {
            structure_response: None,
            validation_response: None,
        }
    }
}

#[async_trait]
impl ReasoningService for FakeReasoning {
    async fn call(
        &self,
        system_prompt: &str,
        _user_content: &str,
        _schema_hint: Option<&Value>,
    ) -> Result<Value, ServiceError> {
        let response = if system_prompt.contains("structure analyzer") {
            &self.structure_response
        } else if system_prompt.contains("validation system") {
            &self.validation_response
        } else {
            &None
        };
        response.clone().ok_or(ServiceError::Timeout)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fast_config() -> PipelineConfig {
    PipelineConfig::builder()
        .extract_pacing(Duration::from_millis(0))
        .structure_pacing(Duration::from_millis(0))
        .build()
        .unwrap()
}

fn offline_pipeline(store: Arc<MemoryStore>) -> Pipeline {
    Pipeline::new(
        Arc::new(FakeExtractor { fail: false }),
        store,
        None,
        fast_config(),
    )
}

fn enhanced_pipeline(store: Arc<MemoryStore>, service: FakeReasoning) -> Pipeline {
    let config = fast_config();
    let enhancer = doc2tree::Enhancer::new(Arc::new(service), config.clone());
    Pipeline::new(
        Arc::new(FakeExtractor { fail: false }),
        store,
        Some(enhancer),
        config,
    )
}

/// A dummy input file; the fake extractor ignores its content but the
/// pipeline stats its size.
fn dummy_input(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("invoice.pdf");
    std::fs::write(&path, b"%PDF-dummy").unwrap();
    path
}

fn log_position(result: &ProcessingResult, needle: &str) -> Option<usize> {
    result.processing_log.iter().position(|l| l.contains(needle))
}

async fn run(pipeline: &Pipeline, store: &MemoryStore, path: &Path) -> ProcessingResult {
    let id = pipeline.process(path, "invoice.pdf").await.unwrap();
    store.get(&id).await.unwrap().unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn offline_run_completes_with_summary_and_log_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = offline_pipeline(store.clone());

    let result = run(&pipeline, &store, &dummy_input(&dir)).await;

    assert_eq!(result.status, ProcessingStatus::Completed);
    assert_eq!(result.status.progress(), 100.0);
    assert!(result.error_message.is_none());
    assert_eq!(result.metadata.page_count, 1);
    assert!(result.metadata.processing_end.is_some());
    assert!(result.raw_text.as_deref().unwrap().contains("Invoice #42"));

    // 1 page container + 2 text elements.
    assert_eq!(result.extracted_elements.len(), 3);
    let summary = &result.structured_data.as_ref().unwrap()["summary"];
    assert_eq!(summary["total_elements"], json!(3));
    assert_eq!(summary["pages"], json!(1));
    assert_eq!(summary["text_elements"], json!(2));
    assert_eq!(summary["validated_elements"], json!(3));

    // Stages appear in the log in pipeline order.
    let stages = [
        "Parsing document",
        "Structuring content",
        "Validating elements",
        "Generating highlights",
        "Storing results",
        "Completed processing",
    ];
    let positions: Vec<usize> = stages
        .iter()
        .map(|s| log_position(&result, s).unwrap_or_else(|| panic!("missing log entry: {s}")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[tokio::test]
async fn leaf_elements_carry_highlight_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = offline_pipeline(store.clone());

    let result = run(&pipeline, &store, &dummy_input(&dir)).await;

    let page = result
        .extracted_elements
        .iter()
        .find(|e| e.kind == "page")
        .unwrap();
    assert!(page.metadata.is_empty());

    for text in result.extracted_elements.iter().filter(|e| e.kind == "text") {
        assert_eq!(
            text.metadata.get("highlight_color"),
            Some(&json!("#3B82F6"))
        );
        assert_eq!(text.metadata.get("border_width"), Some(&json!(2)));
        assert_eq!(text.metadata.get("opacity"), Some(&json!(0.3)));
        assert!(text.validated);
        assert!(text.confidence >= 0.8);
    }
}

#[tokio::test]
async fn extractor_failure_lands_in_a_terminal_failed_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        Arc::new(FakeExtractor { fail: true }),
        store.clone(),
        None,
        fast_config(),
    );

    let id = pipeline
        .process(&dummy_input(&dir), "invoice.pdf")
        .await
        .unwrap();
    let result = store.get(&id).await.unwrap().unwrap();

    assert_eq!(result.status, ProcessingStatus::Failed);
    let message = result.error_message.as_deref().unwrap();
    assert!(message.contains("xref table is damaged"), "got: {message}");
    assert!(log_position(&result, "Processing failed").is_some());
    // The pipeline never reached structuring.
    assert!(log_position(&result, "Structuring content").is_none());
    assert!(result.extracted_elements.is_empty());
}

#[tokio::test]
async fn unsupported_extension_fails_before_any_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"plain text").unwrap();

    let store = Arc::new(MemoryStore::new());
    let pipeline = offline_pipeline(store.clone());

    let err = pipeline.process(&path, "notes.txt").await.unwrap_err();
    assert!(matches!(err, Doc2TreeError::UnsupportedFormat { .. }));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn unavailable_reasoning_service_degrades_to_local_results() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = enhanced_pipeline(store.clone(), FakeReasoning::unavailable());

    let result = run(&pipeline, &store, &dummy_input(&dir)).await;

    // Still completes with the locally-built tree and rule-based confidences.
    assert_eq!(result.status, ProcessingStatus::Completed);
    assert_eq!(result.extracted_elements.len(), 3);
    assert!(log_position(&result, "Structure enhanced").is_none());
    let text = result
        .extracted_elements
        .iter()
        .find(|e| e.id == "text_1_0")
        .unwrap();
    assert_eq!(text.confidence, 0.8);
    assert!(text.validated);
}

#[tokio::test]
async fn structure_enhancement_supersedes_the_local_tree() {
    let enhanced_elements = json!({"elements": [
        {
            "id": "page_1",
            "type": "page",
            "content": "Page 1",
            "children_ids": ["header_1_0"],
            "grounding": {
                "page_number": 1,
                "bounding_box": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0}
            }
        },
        {
            "id": "header_1_0",
            "type": "header",
            "content": "ACME Corp Invoice #42",
            "parent_id": "page_1",
            "confidence": 0.85,
            "grounding": {
                "page_number": 1,
                "bounding_box": {"x": 0.0, "y": 0.0, "width": 0.5, "height": 0.05}
            }
        }
    ]});

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = enhanced_pipeline(
        store.clone(),
        FakeReasoning {
            structure_response: Some(enhanced_elements),
            validation_response: None,
        },
    );

    let result = run(&pipeline, &store, &dummy_input(&dir)).await;

    assert_eq!(result.status, ProcessingStatus::Completed);
    assert!(log_position(&result, "Structure enhanced via reasoning service").is_some());
    assert_eq!(result.extracted_elements.len(), 2);
    let header = result
        .extracted_elements
        .iter()
        .find(|e| e.id == "header_1_0")
        .unwrap();
    assert_eq!(header.kind, "header");
    // Highlighting ran over the enhanced tree.
    assert_eq!(
        header.metadata.get("highlight_color"),
        Some(&json!("#EF4444"))
    );
}

#[tokio::test]
async fn validation_overlay_overrides_rule_based_confidence() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = enhanced_pipeline(
        store.clone(),
        FakeReasoning {
            structure_response: None,
            validation_response: Some(json!({"elements": [
                {"id": "text_1_1", "confidence": 0.2}
            ]})),
        },
    );

    let result = run(&pipeline, &store, &dummy_input(&dir)).await;

    assert!(log_position(&result, "Second-opinion validation updated 1 elements").is_some());
    let flagged = result
        .extracted_elements
        .iter()
        .find(|e| e.id == "text_1_1")
        .unwrap();
    assert_eq!(flagged.confidence, 0.2);
    assert!(!flagged.validated);

    // The untouched sibling keeps its rule-based verdict.
    let other = result
        .extracted_elements
        .iter()
        .find(|e| e.id == "text_1_0")
        .unwrap();
    assert!(other.validated);
    let summary = &result.structured_data.as_ref().unwrap()["summary"];
    assert_eq!(summary["validated_elements"], json!(2));
}

#[tokio::test]
async fn corrections_flow_against_a_completed_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = offline_pipeline(store.clone());

    let id = pipeline
        .process(&dummy_input(&dir), "invoice.pdf")
        .await
        .unwrap();

    let corrections = vec![CorrectionRequest {
        element_id: "text_1_1".to_string(),
        corrected_content: ElementContent::Text("Total due: $1,520.00".to_string()),
        corrected_type: None,
        notes: Some("transposed digits".to_string()),
    }];
    let applied = apply_corrections(store.as_ref(), &id, &corrections)
        .await
        .unwrap();
    assert_eq!(applied, 1);

    let result = store.get(&id).await.unwrap().unwrap();
    let corrected = result
        .extracted_elements
        .iter()
        .find(|e| e.id == "text_1_1")
        .unwrap();
    assert_eq!(corrected.content.as_text(), Some("Total due: $1,520.00"));
    assert!(corrected.validated);
    let backup = corrected.corrections.as_ref().unwrap();
    assert_eq!(
        backup.get("original_content"),
        Some(&json!("Total due: $1,250.00"))
    );
    assert_eq!(backup.get("notes"), Some(&json!("transposed digits")));
}

#[tokio::test]
async fn snapshots_survive_a_store_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();

    let id = {
        let store = Arc::new(MemoryStore::with_storage_dir(storage.path()).await.unwrap());
        let pipeline = offline_pipeline(store.clone());
        pipeline
            .process(&dummy_input(&dir), "invoice.pdf")
            .await
            .unwrap()
    };

    let reopened = MemoryStore::with_storage_dir(storage.path()).await.unwrap();
    let result = reopened.get(&id).await.unwrap().unwrap();
    assert_eq!(result.status, ProcessingStatus::Completed);
    assert_eq!(result.extracted_elements.len(), 3);
    assert_eq!(reopened.list().await.unwrap().len(), 1);
}
