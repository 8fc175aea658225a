//! Text extraction seam and the production PDF extractor.
//!
//! The pipeline never talks to a concrete parsing library directly: it
//! depends on the [`TextExtractor`] capability, which turns a source file
//! into raw positioned fragments plus document metadata. Tests inject a
//! fake; production uses [`PdfExtractor`].
//!
//! [`PdfExtractor`] covers digitally-authored PDFs via `lopdf`. OCR for
//! raster images is deliberately out of scope — a caller with scanned
//! images plugs an OCR-backed implementation into the same seam.

use crate::error::Doc2TreeError;
use crate::model::{BoundingBox, DocumentMetadata, DocumentType};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One positioned fragment of raw content, before tree assembly.
///
/// Bounding boxes and confidences are optional: extractors that cannot
/// produce them leave `None` and the tree builder fills in per-type
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFragment {
    Text {
        text: String,
        /// 1-indexed page number; `None` defaults to page 1.
        page: Option<u32>,
        bbox: Option<BoundingBox>,
        confidence: Option<f64>,
    },
    Table {
        rows: Vec<Vec<String>>,
        table_id: Option<String>,
        page: Option<u32>,
        bbox: Option<BoundingBox>,
    },
}

impl RawFragment {
    /// The fragment's page number, defaulting to 1 when the extractor did
    /// not record one.
    pub fn page(&self) -> u32 {
        match self {
            RawFragment::Text { page, .. } | RawFragment::Table { page, .. } => page.unwrap_or(1),
        }
    }
}

/// Everything an extractor produces for one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub full_text: String,
    pub fragments: Vec<RawFragment>,
    pub metadata: DocumentMetadata,
}

/// Capability interface for raw content extraction.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract raw text and positioned fragments from the file at `path`.
    ///
    /// Fails with a fatal [`Doc2TreeError`] on unreadable or corrupt input;
    /// the pipeline turns that into a terminal `failed` snapshot.
    async fn extract(&self, path: &Path, filename: &str) -> Result<Extraction, Doc2TreeError>;
}

/// Production extractor for digitally-authored PDFs, backed by `lopdf`.
///
/// Produces one text fragment per paragraph of each page. `lopdf` does not
/// expose glyph positions, so fragments carry no bounding boxes and the
/// tree builder's per-type defaults apply.
#[derive(Debug, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, path: &Path, filename: &str) -> Result<Extraction, Doc2TreeError> {
        let document_type = DocumentType::from_filename(filename).ok_or_else(|| {
            Doc2TreeError::UnsupportedFormat {
                filename: filename.to_string(),
            }
        })?;
        if document_type != DocumentType::Pdf {
            return Err(Doc2TreeError::ExtractorUnavailable {
                filename: filename.to_string(),
                hint: "raster images need an OCR-backed TextExtractor".to_string(),
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Doc2TreeError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => Doc2TreeError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let file_size = bytes.len() as u64;

        // lopdf parsing is CPU-bound; keep it off the async executor.
        let owned_path = path.to_path_buf();
        let (full_text, fragments, page_count) =
            tokio::task::spawn_blocking(move || extract_pdf_pages(&owned_path, &bytes))
                .await
                .map_err(|e| Doc2TreeError::Internal(format!("extraction task panicked: {e}")))??;

        info!(
            "extracted {} fragments from {} page(s) of '{filename}'",
            fragments.len(),
            page_count
        );

        let metadata = DocumentMetadata {
            filename: filename.to_string(),
            file_size,
            document_type,
            page_count,
            upload_timestamp: Utc::now(),
            processing_start: None,
            processing_end: None,
            ocr_languages: vec!["en".to_string()],
            ocr_models_used: Vec::new(),
        };

        Ok(Extraction {
            full_text,
            fragments,
            metadata,
        })
    }
}

/// Parse the PDF and walk its pages, producing the raw text and one text
/// fragment per paragraph.
fn extract_pdf_pages(
    path: &PathBuf,
    bytes: &[u8],
) -> Result<(String, Vec<RawFragment>, u32), Doc2TreeError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| Doc2TreeError::CorruptDocument {
        path: path.clone(),
        detail: e.to_string(),
    })?;

    let pages = doc.get_pages();
    let page_count = pages.len() as u32;
    let mut full_text = String::new();
    let mut fragments = Vec::new();

    for (&page_num, _) in &pages {
        let page_text = match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                debug!("page {page_num}: text extraction failed: {e}");
                continue;
            }
        };

        full_text.push_str(&format!("\n--- Page {page_num} ---\n{page_text}\n"));

        for paragraph in page_text.split("\n\n") {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }
            fragments.push(RawFragment::Text {
                text: trimmed.to_string(),
                page: Some(page_num),
                bbox: None,
                confidence: None,
            });
        }
    }

    Ok((full_text, fragments, page_count))
}
