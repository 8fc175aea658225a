//! System prompts for reasoning-service enhancement calls.
//!
//! Centralising every prompt here keeps behaviour changes in one place and
//! lets unit tests inspect prompts without a live service. The pipeline
//! itself never composes prompt text — it hands these to
//! [`crate::enhance::Enhancer`].

/// System prompt for schema-driven structured extraction from raw text.
///
/// The concrete response schema is supplied per call through the
/// reasoning-service schema hint, not embedded here.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert document extraction system. Extract structured information from the provided text.
Follow these rules:
1. Extract only information that is explicitly present in the text
2. Use the exact format specified in the schema
3. If information is not found, use null or empty values
4. Maintain hierarchical relationships between elements

Output must be valid JSON matching the provided schema."#;

/// System prompt for second-opinion validation of extracted elements.
pub const VALIDATION_SYSTEM_PROMPT: &str = r#"You are an expert document validation system. Validate the extracted data against the source text.
For each element in the extracted data:
1. Check if it accurately represents information in the source text
2. Assign a confidence score (0.0-1.0)
3. Suggest corrections for low-confidence elements
4. Flag any missing or incorrect information

Output must be valid JSON of the form {"elements": [{"id": ..., "confidence": ...}], "suggestions": [...]}."#;

/// System prompt for hierarchy/structure enhancement of extracted elements.
pub const STRUCTURE_SYSTEM_PROMPT: &str = r#"You are an expert document structure analyzer. Enhance the structure of extracted document elements.
For the provided elements:
1. Identify parent-child relationships
2. Group related elements
3. Detect section headers and their content
4. Identify tables and their structure
5. Maintain all original information while enhancing relationships

Output must be valid JSON: either an array of elements or {"elements": [...]}."#;

/// Build the user message for one validation chunk.
///
/// `chunk_json` is the serialised element chunk; the 1-indexed chunk
/// position tells the model it is seeing a slice, not the whole document.
pub fn validation_user_content(
    text_sample: &str,
    chunk_json: &str,
    index: usize,
    total: usize,
) -> String {
    format!(
        "SOURCE TEXT SAMPLE:\n{text_sample}\n\nEXTRACTED ELEMENTS (CHUNK {}/{total}):\n{chunk_json}\n\nValidate the extraction and provide results.",
        index + 1
    )
}

/// Build the user message for one structure-enhancement chunk.
pub fn structure_user_content(chunk_json: &str, index: usize, total: usize) -> String {
    format!(
        "DOCUMENT ELEMENTS (CHUNK {}/{total}):\n{chunk_json}\n\nEnhance the structure while preserving all original information.",
        index + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_content_numbers_chunks_from_one() {
        let content = validation_user_content("sample", "[]", 0, 3);
        assert!(content.contains("CHUNK 1/3"));
        assert!(content.contains("sample"));
    }

    #[test]
    fn structure_content_embeds_chunk_json() {
        let content = structure_user_content(r#"[{"id":"text_1_0"}]"#, 1, 2);
        assert!(content.contains("CHUNK 2/2"));
        assert!(content.contains("text_1_0"));
    }
}
