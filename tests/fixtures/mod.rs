//! Representative result payloads for each supported model, in the envelopes
//! the service actually returns them in.
#![allow(dead_code)]

use serde_json::{json, Value};

/// Just enough bytes to be recognized as a PNG.
pub const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// pp-ocrv5: flat lines under `results[0].res`, no page dimensions.
pub fn ocrv5_payload() -> Value {
    json!({
        "success": true,
        "model": "pp-ocrv5",
        "results": [{
            "res": {
                "rec_texts": ["INVOICE", "Total: 42.00", ""],
                "rec_scores": [0.99, 0.95, 0.10],
                "rec_boxes": [[10, 10, 200, 40], [10, 300, 180, 330], [0, 0, 0, 0]]
            }
        }]
    })
}

/// Two flat lines, the second with no detection box.
pub fn flat_with_degenerate_box() -> Value {
    json!({
        "rec_texts": ["A", "B"],
        "rec_boxes": [[0, 0, 10, 10], [0, 0, 0, 0]],
        "rec_scores": [0.9, 0.8]
    })
}

/// pp-structurev3: labeled blocks under `res`, with a multi-line block whose
/// lines belong to two empty siblings of the same group.
pub fn structurev3_payload() -> Value {
    json!({
        "success": true,
        "model": "pp-structurev3",
        "res": {
            "width": 1000,
            "height": 2000,
            "parsing_res_list": [
                {
                    "block_id": 0,
                    "block_label": "doc_title",
                    "block_content": "Quarterly Report",
                    "block_bbox": [100, 50, 900, 120],
                    "block_order": 1
                },
                {
                    "block_id": 1,
                    "block_label": "text",
                    "block_content": "line one\nline two\nline three",
                    "block_bbox": [100, 200, 900, 230],
                    "block_order": 2,
                    "group_id": 7
                },
                {
                    "block_id": 2,
                    "block_label": "text",
                    "block_content": "",
                    "block_bbox": [100, 240, 900, 270],
                    "block_order": 3,
                    "group_id": 7
                },
                {
                    "block_id": 3,
                    "block_label": "text",
                    "block_content": "",
                    "block_bbox": [100, 280, 900, 310],
                    "block_order": 4,
                    "group_id": 7
                },
                {
                    "block_id": 4,
                    "block_label": "table",
                    "block_content": "<table><tr><td>a</td></tr></table>",
                    "block_bbox": [100, 400, 900, 800],
                    "block_order": 5
                },
                {
                    "block_id": 5,
                    "block_label": "image",
                    "block_content": "",
                    "block_bbox": [100, 900, 500, 1300],
                    "block_order": null
                }
            ]
        }
    })
}

/// paddleocr-vl: one `results` entry per page, page-level `content` markdown.
pub fn vl_two_page_payload() -> Value {
    json!({
        "success": true,
        "model": "paddleocr-vl",
        "content": "# Page one\n\nBody text.\n\n# Page two",
        "results": [
            {
                "res": {
                    "width": 800,
                    "height": 1000,
                    "parsing_res_list": [
                        {
                            "block_id": 0,
                            "block_label": "paragraph_title",
                            "block_content": "Page one",
                            "block_bbox": [40, 40, 400, 80],
                            "block_order": 1
                        },
                        {
                            "block_id": 1,
                            "block_label": "text",
                            "block_content": "Body text.",
                            "block_bbox": [40, 100, 760, 140],
                            "block_order": 2
                        }
                    ]
                }
            },
            {
                "width": 800,
                "height": 1000,
                "parsing_res_list": [
                    {
                        "block_id": 0,
                        "block_label": "paragraph_title",
                        "block_content": "Page two",
                        "block_bbox": [40, 40, 400, 80],
                        "block_order": 1
                    }
                ]
            }
        ]
    })
}

/// A completed payload nobody can render.
pub fn unrecognized_payload() -> Value {
    json!({"success": true, "results": [{"unexpected": {"data": [1, 2, 3]}}]})
}
