//! Interchangeable output views over a completed job.

use serde::Serialize;
use strum::{Display, EnumString};

use crate::models::result::{Block, JobResult, PageResult};
use crate::services::geometry::{Rect, Viewport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OutputView {
    /// One entry per content block, in reading order.
    #[default]
    Items,
    /// The payload exactly as returned by the service.
    Raw,
    /// Running text.
    Text,
}

/// A text overlay positioned over the rendered page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub id: u32,
    pub label: String,
    pub text: String,
    pub confidence: Option<f32>,
    pub rect: Rect,
}

/// One entry of the itemized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemizedBlock {
    pub id: u32,
    pub label: String,
    pub content: String,
    pub order: Option<u32>,
}

/// Blocks worth showing: visual blocks always, everything else only with text.
fn renderable(block: &Block) -> bool {
    block.has_content() || block.is_visual()
}

/// Overlay rectangles for every renderable item on `page`.
pub fn overlay_boxes(page: &PageResult, viewport: &Viewport) -> Vec<OverlayBox> {
    match page {
        PageResult::Structured { blocks, .. } => blocks
            .iter()
            .filter(|b| renderable(b))
            .filter_map(|b| {
                viewport.map(&b.bbox).map(|rect| OverlayBox {
                    id: b.id,
                    label: b.label.clone(),
                    text: b.content.clone(),
                    confidence: None,
                    rect,
                })
            })
            .collect(),
        PageResult::Flat { lines } => lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.text.trim().is_empty())
            .filter_map(|(i, l)| {
                viewport.map(&l.bbox).map(|rect| OverlayBox {
                    id: i as u32,
                    label: "text".to_string(),
                    text: l.text.clone(),
                    confidence: Some(l.confidence),
                    rect,
                })
            })
            .collect(),
    }
}

/// Blocks sorted by reading order; unordered blocks follow, by id.
pub fn itemized(page: &PageResult) -> Vec<ItemizedBlock> {
    match page {
        PageResult::Structured { blocks, .. } => {
            let mut items: Vec<ItemizedBlock> = blocks
                .iter()
                .filter(|b| renderable(b))
                .map(|b| ItemizedBlock {
                    id: b.id,
                    label: b.label.clone(),
                    content: b.content.clone(),
                    order: b.order,
                })
                .collect();
            items.sort_by_key(|i| (i.order.is_none(), i.order, i.id));
            items
        }
        PageResult::Flat { lines } => lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.text.trim().is_empty())
            .map(|(i, l)| ItemizedBlock {
                id: i as u32,
                label: "text".to_string(),
                content: l.text.clone(),
                order: Some(i as u32),
            })
            .collect(),
    }
}

/// Running text for one page.
pub fn flowing_text(page: &PageResult) -> String {
    match page {
        PageResult::Structured { .. } => itemized(page)
            .into_iter()
            .filter(|i| !i.content.trim().is_empty())
            .map(|i| i.content)
            .collect::<Vec<_>>()
            .join("\n\n"),
        PageResult::Flat { lines } => lines
            .iter()
            .map(|l| l.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Render `view` for a 1-based page of `result`.
///
/// The text view prefers the service-rendered document markdown when present.
/// Results that could not be normalized render as `None` for the items and
/// text views; the raw view is always available.
pub fn render(result: &JobResult, view: OutputView, page_number: usize) -> Option<String> {
    match view {
        OutputView::Raw => serde_json::to_string_pretty(&result.raw).ok(),
        OutputView::Text => {
            let doc = result.document()?;
            match &doc.content {
                Some(markdown) => Some(markdown.clone()),
                None => doc.page(page_number).map(flowing_text),
            }
        }
        OutputView::Items => {
            let page = result.document()?.page(page_number)?;
            let lines: Vec<String> = itemized(page)
                .into_iter()
                .map(|i| format!("[{}] {}: {}", i.id, i.label, i.content.replace('\n', " ")))
                .collect();
            Some(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::result::{BBox, DocumentResult, FlatLine, Rendition};
    use crate::services::normalizer::normalize_page;

    fn identity_viewport() -> Viewport {
        Viewport {
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            natural_width: 100,
            natural_height: 100,
        }
    }

    fn block(id: u32, label: &str, content: &str, order: Option<u32>, bbox: [f64; 4]) -> Block {
        Block {
            id,
            label: label.to_string(),
            content: content.to_string(),
            bbox: BBox::from(bbox),
            order,
            group_id: None,
        }
    }

    #[test]
    fn test_flat_payload_renders_one_overlay() {
        let payload = serde_json::json!({"res": {
            "rec_texts": ["A", "B"],
            "rec_boxes": [[0, 0, 10, 10], [0, 0, 0, 0]]
        }});
        let page = normalize_page(&payload, 1).unwrap();
        let boxes = overlay_boxes(&page, &identity_viewport());
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].text, "A");
    }

    #[test]
    fn test_structured_overlays_keep_visual_and_drop_empty() {
        let page = PageResult::Structured {
            width: Some(100.0),
            height: Some(100.0),
            blocks: vec![
                block(0, "text", "hello", Some(0), [1.0, 1.0, 20.0, 5.0]),
                block(1, "text", "", Some(1), [1.0, 6.0, 20.0, 9.0]),
                block(2, "image", "", None, [1.0, 10.0, 50.0, 50.0]),
                block(3, "text", "no box", Some(2), [0.0, 0.0, 0.0, 0.0]),
            ],
        };
        let ids: Vec<u32> = overlay_boxes(&page, &identity_viewport()).iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_itemized_orders_nulls_last() {
        let page = PageResult::Structured {
            width: None,
            height: None,
            blocks: vec![
                block(5, "figure", "", None, [0.0; 4]),
                block(1, "text", "second", Some(2), [0.0; 4]),
                block(2, "doc_title", "first", Some(1), [0.0; 4]),
            ],
        };
        let ids: Vec<u32> = itemized(&page).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 1, 5]);
        assert_eq!(flowing_text(&page), "first\n\nsecond");
    }

    #[test]
    fn test_render_views() {
        let page = PageResult::Flat {
            lines: vec![
                FlatLine {
                    text: "one".to_string(),
                    bbox: BBox::zero(),
                    confidence: 1.0,
                },
                FlatLine {
                    text: "two".to_string(),
                    bbox: BBox::zero(),
                    confidence: 1.0,
                },
            ],
        };
        let result = JobResult {
            raw: serde_json::json!({"k": 1}),
            rendition: Rendition::Ready(DocumentResult {
                pages: vec![page],
                content: None,
            }),
        };
        assert_eq!(render(&result, OutputView::Text, 1).as_deref(), Some("one\ntwo"));
        assert!(render(&result, OutputView::Items, 1).unwrap().contains("[1] text: two"));
        assert!(render(&result, OutputView::Raw, 1).unwrap().contains("\"k\": 1"));
    }

    #[test]
    fn test_unrenderable_result_only_has_raw_view() {
        let result = JobResult {
            raw: serde_json::json!({"weird": true}),
            rendition: Rendition::Unrenderable {
                reason: "unrecognized".to_string(),
            },
        };
        assert!(render(&result, OutputView::Items, 1).is_none());
        assert!(render(&result, OutputView::Text, 1).is_none());
        assert!(render(&result, OutputView::Raw, 1).is_some());
    }

    #[test]
    fn test_output_view_parse() {
        assert_eq!("text".parse::<OutputView>().unwrap(), OutputView::Text);
        assert!("html".parse::<OutputView>().is_err());
    }
}
