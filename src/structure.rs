//! Assembly of raw fragments into the two-level element tree.
//!
//! [`build_element_tree`] groups fragments by page, synthesises exactly one
//! `page` container per distinct page number, and wires each page's text and
//! table elements beneath it with symmetric `parent_id`/`children_ids`
//! links. Ids are deterministic (`page_N`, `text_N_i`, `table_N_i`) so the
//! same input always yields the same tree.
//!
//! This locally-built tree is authoritative: the structuring stage may
//! replace it wholesale with a reasoning-service enhancement, but only when
//! the enhanced list is non-empty and schema-valid.

use crate::extract::RawFragment;
use crate::model::{BoundingBox, Element, ElementContent, VisualGrounding};
use serde_json::Map;
use std::collections::BTreeMap;
use tracing::debug;

/// Default box for a text fragment whose extractor recorded no position.
const DEFAULT_TEXT_BOX: BoundingBox = BoundingBox {
    x: 0.0,
    y: 0.0,
    width: 0.1,
    height: 0.05,
};

/// Default box for a table fragment whose extractor recorded no position.
const DEFAULT_TABLE_BOX: BoundingBox = BoundingBox {
    x: 0.1,
    y: 0.1,
    width: 0.8,
    height: 0.3,
};

const DEFAULT_TEXT_CONFIDENCE: f64 = 0.8;
const TABLE_CONFIDENCE: f64 = 0.9;

/// Build the page → leaf element tree from raw fragments.
///
/// Pages are emitted in ascending page-number order; within a page, text
/// elements come before table elements, each in fragment order. Fragments
/// without a page number land on page 1.
pub fn build_element_tree(fragments: &[RawFragment]) -> Vec<Element> {
    let mut pages: BTreeMap<u32, (Vec<&RawFragment>, Vec<&RawFragment>)> = BTreeMap::new();
    for fragment in fragments {
        let buckets = pages.entry(fragment.page()).or_default();
        match fragment {
            RawFragment::Text { .. } => buckets.0.push(fragment),
            RawFragment::Table { .. } => buckets.1.push(fragment),
        }
    }

    let mut elements = Vec::new();

    for (page_num, (texts, tables)) in pages {
        let page_id = format!("page_{page_num}");
        let mut children_ids = Vec::with_capacity(texts.len() + tables.len());

        let mut page_children = Vec::new();

        for (i, fragment) in texts.iter().enumerate() {
            let RawFragment::Text {
                text,
                bbox,
                confidence,
                ..
            } = fragment
            else {
                continue;
            };
            let id = format!("text_{page_num}_{i}");
            let confidence = confidence.unwrap_or(DEFAULT_TEXT_CONFIDENCE);
            children_ids.push(id.clone());
            page_children.push(Element {
                id,
                kind: "text".to_string(),
                content: ElementContent::Text(text.clone()),
                parent_id: Some(page_id.clone()),
                children_ids: vec![],
                grounding: VisualGrounding {
                    page_number: page_num,
                    bounding_box: bbox.unwrap_or(DEFAULT_TEXT_BOX),
                    confidence,
                },
                metadata: Map::new(),
                confidence,
                validated: false,
                corrections: None,
            });
        }

        for (i, fragment) in tables.iter().enumerate() {
            let RawFragment::Table {
                rows,
                table_id,
                bbox,
                ..
            } = fragment
            else {
                continue;
            };
            let id = format!("table_{page_num}_{i}");
            let table_id = table_id.clone().unwrap_or_else(|| id.clone());
            children_ids.push(id.clone());
            page_children.push(Element {
                id,
                kind: "table".to_string(),
                content: ElementContent::table(rows.clone(), &table_id),
                parent_id: Some(page_id.clone()),
                children_ids: vec![],
                grounding: VisualGrounding {
                    page_number: page_num,
                    bounding_box: bbox.unwrap_or(DEFAULT_TABLE_BOX),
                    confidence: TABLE_CONFIDENCE,
                },
                metadata: Map::new(),
                confidence: TABLE_CONFIDENCE,
                validated: false,
                corrections: None,
            });
        }

        elements.push(Element {
            id: page_id,
            kind: "page".to_string(),
            content: ElementContent::Text(format!("Page {page_num}")),
            parent_id: None,
            children_ids,
            grounding: VisualGrounding {
                page_number: page_num,
                bounding_box: BoundingBox::full_page(),
                confidence: 1.0,
            },
            metadata: Map::new(),
            confidence: 1.0,
            validated: false,
            corrections: None,
        });
        elements.append(&mut page_children);
    }

    debug!(
        "built {} elements from {} fragments",
        elements.len(),
        fragments.len()
    );
    elements
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn text_fragment(text: &str, page: Option<u32>) -> RawFragment {
        RawFragment::Text {
            text: text.to_string(),
            page,
            bbox: None,
            confidence: None,
        }
    }

    #[test]
    fn two_pages_yield_two_page_containers() {
        let fragments = vec![
            text_fragment("alpha", Some(1)),
            text_fragment("beta", Some(1)),
            RawFragment::Table {
                rows: vec![vec!["h".to_string()]],
                table_id: None,
                page: Some(2),
                bbox: None,
            },
        ];
        let elements = build_element_tree(&fragments);

        let page_ids: Vec<&str> = elements
            .iter()
            .filter(|e| e.kind == "page")
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(page_ids, vec!["page_1", "page_2"]);

        let page_1 = elements.iter().find(|e| e.id == "page_1").unwrap();
        assert_eq!(page_1.children_ids, vec!["text_1_0", "text_1_1"]);
        let page_2 = elements.iter().find(|e| e.id == "page_2").unwrap();
        assert_eq!(page_2.children_ids, vec!["table_2_0"]);
    }

    #[test]
    fn parent_references_have_no_orphans() {
        let fragments = vec![
            text_fragment("a", Some(1)),
            text_fragment("b", Some(3)),
            RawFragment::Table {
                rows: vec![vec!["x".to_string(), "y".to_string()]],
                table_id: Some("invoice_items".to_string()),
                page: Some(1),
                bbox: None,
            },
        ];
        let elements = build_element_tree(&fragments);
        let ids: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();

        for element in &elements {
            if let Some(parent) = &element.parent_id {
                assert!(ids.contains(parent.as_str()), "orphan parent {parent}");
            }
            for child in &element.children_ids {
                assert!(ids.contains(child.as_str()), "dangling child {child}");
            }
        }
    }

    #[test]
    fn page_defaults_to_one_when_absent() {
        let elements = build_element_tree(&[text_fragment("floating", None)]);
        assert_eq!(elements[0].id, "page_1");
        assert_eq!(elements[1].grounding.page_number, 1);
    }

    #[test]
    fn defaults_applied_for_missing_boxes_and_confidence() {
        let elements = build_element_tree(&[
            text_fragment("t", Some(1)),
            RawFragment::Table {
                rows: vec![vec!["r".to_string()]],
                table_id: None,
                page: Some(1),
                bbox: None,
            },
        ]);

        let text = elements.iter().find(|e| e.id == "text_1_0").unwrap();
        assert_eq!(text.grounding.bounding_box, DEFAULT_TEXT_BOX);
        assert_eq!(text.confidence, 0.8);

        let table = elements.iter().find(|e| e.id == "table_1_0").unwrap();
        assert_eq!(table.grounding.bounding_box, DEFAULT_TABLE_BOX);
        assert_eq!(table.confidence, 0.9);
        let table_id = table
            .content
            .as_structured()
            .unwrap()
            .get("table_id")
            .unwrap();
        assert_eq!(table_id, "table_1_0");
    }

    #[test]
    fn page_container_spans_the_full_page() {
        let elements = build_element_tree(&[text_fragment("t", Some(4))]);
        let page = &elements[0];
        assert_eq!(page.kind, "page");
        assert_eq!(page.grounding.bounding_box, BoundingBox::full_page());
        assert_eq!(page.confidence, 1.0);
        assert_eq!(page.content.as_text(), Some("Page 4"));
    }

    #[test]
    fn explicit_fragment_confidence_wins_over_default() {
        let elements = build_element_tree(&[RawFragment::Text {
            text: "ocr word".to_string(),
            page: Some(1),
            bbox: Some(BoundingBox::new(0.2, 0.3, 0.1, 0.02)),
            confidence: Some(0.55),
        }]);
        let text = elements.iter().find(|e| e.id == "text_1_0").unwrap();
        assert_eq!(text.confidence, 0.55);
        assert_eq!(text.grounding.bounding_box.x, 0.2);
    }

    #[test]
    fn empty_input_yields_empty_tree() {
        assert!(build_element_tree(&[]).is_empty());
    }
}
