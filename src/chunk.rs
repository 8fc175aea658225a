//! Chunking of oversized text and element lists.
//!
//! Reasoning-service requests have a hard input budget, so text and element
//! lists are partitioned into bounded-size chunks before fan-out. Chunks are
//! ephemeral: they carry no identity beyond their position in the source
//! sequence and are never persisted.
//!
//! [`split_text`] prefers natural boundaries, descending only when the finer
//! boundary still overflows: paragraphs (`"\n\n"`), then sentences (`". "`),
//! then raw characters. Content is never dropped — rejoining the chunks with
//! the boundary separators reconstructs the input.

use crate::model::Element;

/// Split `text` into chunks of at most `max_chunk_size` characters.
///
/// Returns the text unchanged (one chunk) when it already fits. Chunk sizes
/// are measured in characters, not bytes, so multi-byte input never splits
/// inside a code point.
///
/// The only chunks that may exceed `max_chunk_size` are none: even a single
/// oversized sentence is cut into fixed-size character windows.
pub fn split_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    if char_len(text) <= max_chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    // (buffer, char count) — tracking the count avoids re-walking the buffer.
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in text.split("\n\n") {
        let paragraph_len = char_len(paragraph);

        if current_len + paragraph_len + 2 > max_chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if paragraph_len > max_chunk_size {
                // Paragraph alone overflows: descend to sentence boundaries.
                for sentence in paragraph.split(". ") {
                    let sentence_len = char_len(sentence);

                    if current_len + sentence_len + 2 > max_chunk_size {
                        if !current.is_empty() {
                            chunks.push(std::mem::take(&mut current));
                            current_len = 0;
                        }

                        if sentence_len > max_chunk_size {
                            // Sentence alone overflows: raw character windows.
                            push_char_windows(&mut chunks, sentence, max_chunk_size);
                        } else {
                            current.push_str(sentence);
                            current_len = sentence_len;
                        }
                    } else if current.is_empty() {
                        current.push_str(sentence);
                        current_len = sentence_len;
                    } else {
                        current.push_str(". ");
                        current.push_str(sentence);
                        current_len += sentence_len + 2;
                    }
                }
            } else {
                current.push_str(paragraph);
                current_len = paragraph_len;
            }
        } else if current.is_empty() {
            current.push_str(paragraph);
            current_len = paragraph_len;
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_len += paragraph_len + 2;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split `elements` into chunks of at most `max_per_chunk` elements,
/// preserving total count and relative order.
///
/// A new chunk starts early at a page-number transition once the current
/// chunk holds more than 80% of the limit, so one page's elements stay in
/// one chunk unless the page itself overflows the limit.
pub fn split_elements(elements: &[Element], max_per_chunk: usize) -> Vec<Vec<Element>> {
    if elements.len() <= max_per_chunk {
        return vec![elements.to_vec()];
    }

    let mut chunks: Vec<Vec<Element>> = Vec::new();
    let mut current: Vec<Element> = Vec::new();
    let mut current_page: Option<u32> = None;

    for element in elements {
        let page = Some(element.grounding.page_number);

        if page != current_page && current.len() as f64 > max_per_chunk as f64 * 0.8 {
            chunks.push(std::mem::take(&mut current));
        }

        current.push(element.clone());
        current_page = page;

        if current.len() >= max_per_chunk {
            chunks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Append fixed-size character windows of `text` to `chunks`.
fn push_char_windows(chunks: &mut Vec<String>, text: &str, window: usize) {
    let chars: Vec<char> = text.chars().collect();
    for slice in chars.chunks(window) {
        chunks.push(slice.iter().collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, Element, ElementContent, VisualGrounding};
    use serde_json::Map;

    fn text_element(id: &str, page: u32) -> Element {
        Element {
            id: id.to_string(),
            kind: "text".to_string(),
            content: ElementContent::Text(format!("content of {id}")),
            parent_id: None,
            children_ids: vec![],
            grounding: VisualGrounding {
                page_number: page,
                bounding_box: BoundingBox::new(0.0, 0.0, 0.1, 0.05),
                confidence: 0.8,
            },
            metadata: Map::new(),
            confidence: 0.8,
            validated: false,
            corrections: None,
        }
    }

    #[test]
    fn small_text_is_a_single_chunk() {
        let chunks = split_text("short text", 100);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn splits_at_paragraph_boundaries_and_reconstructs() {
        let paragraphs: Vec<String> = (0..8).map(|i| format!("paragraph {i} {}", "x".repeat(30))).collect();
        let text = paragraphs.join("\n\n");
        let chunks = split_text(&text, 100);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "oversized chunk: {chunk:?}");
        }
        assert_eq!(chunks.join("\n\n"), text);
    }

    #[test]
    fn oversized_paragraph_descends_to_sentences() {
        let sentences: Vec<String> = (0..6).map(|i| format!("sentence number {i} {}", "y".repeat(40))).collect();
        let paragraph = sentences.join(". ");
        let chunks = split_text(&paragraph, 120);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120);
        }
        assert_eq!(chunks.join(". "), paragraph);
    }

    #[test]
    fn oversized_sentence_falls_back_to_char_windows() {
        let sentence = "z".repeat(250);
        let chunks = split_text(&sentence, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), sentence);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn char_windows_respect_utf8_boundaries() {
        let sentence = "é".repeat(150);
        let chunks = split_text(&sentence, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 100);
        assert_eq!(chunks.concat(), sentence);
    }

    #[test]
    fn small_element_list_is_a_single_chunk() {
        let elements: Vec<Element> = (0..5).map(|i| text_element(&format!("e{i}"), 1)).collect();
        let chunks = split_elements(&elements, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5);
    }

    #[test]
    fn element_chunks_preserve_count_and_order() {
        let elements: Vec<Element> = (0..53).map(|i| text_element(&format!("e{i}"), 1)).collect();
        let chunks = split_elements(&elements, 10);

        let total: usize = chunks.iter().map(Vec::len).sum();
        assert_eq!(total, 53);
        assert!(chunks.iter().all(|c| c.len() <= 10));

        let flattened: Vec<String> = chunks
            .iter()
            .flatten()
            .map(|e| e.id.clone())
            .collect();
        let expected: Vec<String> = (0..53).map(|i| format!("e{i}")).collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn page_transition_starts_a_new_chunk_when_nearly_full() {
        // 9 elements on page 1 (> 80% of limit 10), then page 2 begins: the
        // page-2 element must open a fresh chunk.
        let mut elements: Vec<Element> = (0..9).map(|i| text_element(&format!("p1_{i}"), 1)).collect();
        for i in 0..4 {
            elements.push(text_element(&format!("p2_{i}"), 2));
        }
        let chunks = split_elements(&elements, 10);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 9);
        assert!(chunks[1].iter().all(|e| e.grounding.page_number == 2));
    }

    #[test]
    fn oversized_page_still_splits() {
        let elements: Vec<Element> = (0..25).map(|i| text_element(&format!("e{i}"), 1)).collect();
        let chunks = split_elements(&elements, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }
}
