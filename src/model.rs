//! Data model for document processing results.
//!
//! Everything the pipeline produces is captured in one persisted aggregate,
//! [`ProcessingResult`]: a transaction id, a status, document metadata, the
//! extracted element tree, the raw text, a structured summary, and an
//! append-only processing log. Snapshots are replaced whole at the storage
//! layer — there are no partial patches — so a writer always reads, modifies
//! and re-persists the full object.
//!
//! The JSON shape of these types is the wire/persistence format: field names
//! are stable (`type` on elements, `bounding_box` in grounding) and covered
//! by serde round-trip tests below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Input format of the source document, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentType {
    /// Best-effort detection from a filename. Unknown extensions come back
    /// as `None`; the caller decides whether that is an error.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Some(DocumentType::Pdf)
        } else if lower.ends_with(".png") {
            Some(DocumentType::Png)
        } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Some(DocumentType::Jpeg)
        } else {
            None
        }
    }
}

/// Lifecycle of one transaction.
///
/// A transaction progresses monotonically through the non-terminal states in
/// declaration order. `Failed` is reachable from any non-terminal state and,
/// like `Completed`, is absorbing: [`crate::store::ResultStore::set_status`]
/// refuses to move a snapshot out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Parsing,
    Structuring,
    Validating,
    Highlighting,
    Storing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Rough progress percentage for status reporting (0–100).
    pub fn progress(self) -> f32 {
        match self {
            ProcessingStatus::Pending => 0.0,
            ProcessingStatus::Parsing => 20.0,
            ProcessingStatus::Structuring => 40.0,
            ProcessingStatus::Validating => 60.0,
            ProcessingStatus::Highlighting => 80.0,
            ProcessingStatus::Storing => 90.0,
            ProcessingStatus::Completed | ProcessingStatus::Failed => 100.0,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Parsing => "parsing",
            ProcessingStatus::Structuring => "structuring",
            ProcessingStatus::Validating => "validating",
            ProcessingStatus::Highlighting => "highlighting",
            ProcessingStatus::Storing => "storing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Axis-aligned box normalised to the page dimensions at extraction time.
///
/// All four values are in [0,1] relative to page width/height. `x + width`
/// and `y + height` may exceed 1 — extraction noise is tolerated, not
/// clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full-page box (0,0,1,1) used for page container elements.
    pub fn full_page() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}

/// Links an element to its visual source location: page number (1-indexed),
/// normalised bounding box, and the extractor's confidence in the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualGrounding {
    pub page_number: u32,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub confidence: f64,
}

/// Element content: either a raw string (text runs, page labels) or a
/// structured map (tables are `{rows, table_id}`).
///
/// Serialised untagged so the persisted JSON is a plain string or object,
/// matching what reasoning-service responses contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementContent {
    Text(String),
    Structured(Map<String, Value>),
}

impl ElementContent {
    /// Structured table content: `{rows: [[..]], table_id: "..."}`.
    pub fn table(rows: Vec<Vec<String>>, table_id: &str) -> Self {
        let mut map = Map::new();
        map.insert(
            "rows".to_string(),
            Value::Array(
                rows.into_iter()
                    .map(|row| {
                        Value::Array(row.into_iter().map(Value::String).collect())
                    })
                    .collect(),
            ),
        );
        map.insert("table_id".to_string(), Value::String(table_id.to_string()));
        ElementContent::Structured(map)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ElementContent::Text(s) => Some(s),
            ElementContent::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            ElementContent::Text(_) => None,
            ElementContent::Structured(m) => Some(m),
        }
    }

    /// Short preview used in summaries: the string itself, or the structured
    /// content rendered as JSON, truncated to `max_chars`.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = match self {
            ElementContent::Text(s) => s.clone(),
            ElementContent::Structured(m) => Value::Object(m.clone()).to_string(),
        };
        if full.chars().count() <= max_chars {
            full
        } else {
            full.chars().take(max_chars).collect()
        }
    }
}

/// One node of the extracted content tree.
///
/// Elements form a two-level hierarchy: one `page` container per distinct
/// page number, with the page's text and table elements as children. Ids are
/// stable once assigned and unique within a transaction; `parent_id` and
/// `children_ids` are wired symmetrically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    /// Element type: `page`, `text`, `table`, plus an open set of others
    /// (`form_field`, `image`, `header`, …) the reasoning service may emit.
    #[serde(rename = "type")]
    pub kind: String,
    pub content: ElementContent,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    pub grounding: VisualGrounding,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub corrections: Option<Map<String, Value>>,
}

/// Metadata about the source document, captured at upload time and refined
/// after parsing (page count, processing timestamps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub file_size: u64,
    pub document_type: DocumentType,
    pub page_count: u32,
    pub upload_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub processing_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ocr_languages: Vec<String>,
    #[serde(default)]
    pub ocr_models_used: Vec<String>,
}

/// The sole persisted aggregate: one snapshot per transaction id.
///
/// Created with status `Pending` on upload acceptance, mutated by every
/// pipeline stage, and immutable once terminal — except for the sanctioned
/// correction path ([`crate::pipeline::apply_corrections`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub transaction_id: String,
    pub status: ProcessingStatus,
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub extracted_elements: Vec<Element>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub structured_data: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub processing_log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingResult {
    /// Fresh `Pending` snapshot for a newly accepted transaction.
    pub fn new(transaction_id: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: transaction_id.into(),
            status: ProcessingStatus::Pending,
            metadata,
            extracted_elements: Vec::new(),
            raw_text: None,
            structured_data: None,
            error_message: None,
            processing_log: vec![format!("Started processing: {now}")],
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a timestamped line to the processing log.
    pub fn log(&mut self, line: impl fmt::Display) {
        self.processing_log.push(format!("{}: {line}", Utc::now()));
    }
}

/// A human correction to one element of a completed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub element_id: String,
    pub corrected_content: ElementContent,
    #[serde(default)]
    pub corrected_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
