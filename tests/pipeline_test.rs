//! Payload to overlay: normalization, geometry and the output views together.

mod fixtures;

use serde_json::json;
use tokio_test::assert_ok;

use fixtures::*;
use ocr_overlay::models::result::{PageResult, Rendition};
use ocr_overlay::services::geometry::{GeometryError, LoadedImage, SurfaceState, Viewport};
use ocr_overlay::services::normalizer::{normalize_document, normalize_job_result, normalize_page};
use ocr_overlay::services::views::{itemized, overlay_boxes, render, OutputView};

fn loaded_surface(src: &str, natural: (u32, u32), display: (f64, f64)) -> SurfaceState {
    let mut surface = SurfaceState::new(src, display.0, display.1);
    assert!(surface.on_load(LoadedImage {
        src: src.to_string(),
        natural_width: natural.0,
        natural_height: natural.1,
    }));
    surface
}

#[test]
fn test_degenerate_flat_line_has_no_overlay() {
    let page = normalize_page(&flat_with_degenerate_box(), 1).unwrap();
    let surface = loaded_surface("page-1", (100, 100), (100.0, 100.0));
    let viewport = Viewport::for_page(&surface, &page).unwrap();

    let overlays = overlay_boxes(&page, &viewport);
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].text, "A");
    assert_eq!(overlays[0].rect.width, 10.0);

    // Still listed, just not drawn.
    let items = itemized(&page);
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].content, "B");
}

#[test]
fn test_flat_page_scales_against_natural_size() {
    let page = normalize_page(&ocrv5_payload(), 1).unwrap();
    assert!(matches!(page, PageResult::Flat { .. }));
    assert_eq!(page.flat_lines().len(), 3);

    let surface = loaded_surface("page-1", (1000, 1000), (500.0, 500.0));
    let viewport = Viewport::for_page(&surface, &page).unwrap();
    let overlays = overlay_boxes(&page, &viewport);

    assert_eq!(overlays.len(), 2);
    let first = overlays[0].rect;
    assert_eq!((first.left, first.top, first.width, first.height), (5.0, 5.0, 95.0, 15.0));
    assert_eq!(overlays[1].text, "Total: 42.00");
}

#[test]
fn test_group_lines_spread_over_empty_siblings() {
    let page = assert_ok!(normalize_page(&structurev3_payload(), 1));
    let contents: Vec<&str> = page.blocks().iter().map(|b| b.content.as_str()).collect();
    assert_eq!(contents[1], "line one");
    assert_eq!(contents[2], "line two");
    assert_eq!(contents[3], "line three");
    assert!(contents[4].starts_with("<table>"));
    assert_eq!(contents[5], "");
}

#[test]
fn test_normalized_page_is_a_fixed_point() {
    let page = normalize_page(&structurev3_payload(), 1).unwrap();
    let reserialized = serde_json::to_value(&page).unwrap();
    assert_eq!(normalize_page(&reserialized, 1).unwrap(), page);

    let flat = normalize_page(&ocrv5_payload(), 1).unwrap();
    let as_payload = json!({
        "rec_texts": flat.flat_lines().iter().map(|l| l.text.clone()).collect::<Vec<_>>(),
        "rec_boxes": flat.flat_lines().iter().map(|l| <[f64; 4]>::from(l.bbox)).collect::<Vec<_>>(),
        "rec_scores": flat.flat_lines().iter().map(|l| l.confidence).collect::<Vec<_>>(),
    });
    assert_eq!(normalize_page(&as_payload, 1).unwrap(), flat);
}

#[test]
fn test_structured_overlays_use_reported_dimensions() {
    let page = normalize_page(&structurev3_payload(), 1).unwrap();
    assert_eq!(page.source_size(), Some((1000.0, 2000.0)));

    // Rendered at half the natural size the payload reports.
    let surface = loaded_surface("page-1", (1000, 2000), (500.0, 1000.0));
    let viewport = Viewport::for_page(&surface, &page).unwrap();
    let overlays = overlay_boxes(&page, &viewport);

    assert_eq!(overlays.len(), 6);
    let title = &overlays[0];
    assert_eq!(title.label, "doc_title");
    assert_eq!(
        (title.rect.left, title.rect.top, title.rect.width, title.rect.height),
        (50.0, 25.0, 400.0, 35.0)
    );
    let image = overlays.iter().find(|o| o.label == "image").unwrap();
    assert_eq!((image.rect.left, image.rect.top), (50.0, 450.0));
}

#[test]
fn test_zoom_and_pan_shift_overlays() {
    let page = normalize_page(&flat_with_degenerate_box(), 1).unwrap();
    let mut surface = loaded_surface("page-1", (100, 100), (100.0, 100.0));
    surface.set_zoom(2.0);
    surface.pan_by(-20.0, 5.0);

    let viewport = Viewport::for_page(&surface, &page).unwrap();
    let rect = overlay_boxes(&page, &viewport)[0].rect;
    assert_eq!((rect.left, rect.top, rect.width, rect.height), (-20.0, 5.0, 20.0, 20.0));
}

#[test]
fn test_overlays_wait_for_requested_image() {
    let page = normalize_page(&ocrv5_payload(), 1).unwrap();
    let mut surface = SurfaceState::new("page-2", 500.0, 500.0);

    assert!(matches!(
        Viewport::for_page(&surface, &page),
        Err(GeometryError::ImageNotLoaded { .. })
    ));

    // A late load of the previous page does not count.
    assert!(!surface.on_load(LoadedImage {
        src: "page-1".to_string(),
        natural_width: 1000,
        natural_height: 1000,
    }));
    assert!(Viewport::for_page(&surface, &page).is_err());

    assert!(surface.on_load(LoadedImage {
        src: "page-2".to_string(),
        natural_width: 1000,
        natural_height: 1000,
    }));
    assert!(Viewport::for_page(&surface, &page).is_ok());

    surface.request("page-3");
    assert!(Viewport::for_page(&surface, &page).is_err());
}

#[test]
fn test_multi_page_document_selects_by_page() {
    let doc = assert_ok!(normalize_document(&vl_two_page_payload(), None));
    assert_eq!(doc.pages.len(), 2);
    assert_eq!(doc.page(1).unwrap().blocks()[0].content, "Page one");
    assert_eq!(doc.page(2).unwrap().blocks()[0].content, "Page two");
    // Out of range falls back to the first page.
    assert_eq!(doc.page(7).unwrap().blocks()[0].content, "Page one");

    let past_end = normalize_page(&vl_two_page_payload(), 3).unwrap();
    assert_eq!(past_end.blocks()[0].content, "Page one");
}

#[test]
fn test_page_count_from_artifact_wins() {
    let doc = normalize_document(&ocrv5_payload(), Some(3)).unwrap();
    assert_eq!(doc.pages.len(), 3);
    assert_eq!(doc.pages[2], doc.pages[0]);
}

#[test]
fn test_views_over_completed_job() {
    let vl = normalize_job_result(vl_two_page_payload(), Some(2));
    assert_eq!(
        render(&vl, OutputView::Text, 2).as_deref(),
        Some("# Page one\n\nBody text.\n\n# Page two")
    );

    let structured = normalize_job_result(structurev3_payload(), None);
    let items = render(&structured, OutputView::Items, 1).unwrap();
    let lines: Vec<&str> = items.lines().collect();
    assert_eq!(lines[0], "[0] doc_title: Quarterly Report");
    assert_eq!(lines.last().copied(), Some("[5] image: "));

    let text = render(&structured, OutputView::Text, 1).unwrap();
    assert!(text.starts_with("Quarterly Report\n\nline one\n\nline two"));

    let raw = render(&structured, OutputView::Raw, 1).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&raw).unwrap(), structurev3_payload());
}

#[test]
fn test_unrenderable_results_keep_raw_view() {
    let result = normalize_job_result(unrecognized_payload(), None);
    assert!(matches!(result.rendition, Rendition::Unrenderable { .. }));
    assert!(render(&result, OutputView::Items, 1).is_none());
    assert!(render(&result, OutputView::Text, 1).is_none());
    assert!(render(&result, OutputView::Raw, 1).is_some());

    let unsuccessful = normalize_job_result(json!({"success": false, "error": "model crashed"}), None);
    match unsuccessful.rendition {
        Rendition::Unrenderable { reason } => assert!(reason.contains("model crashed")),
        other => panic!("expected unrenderable, got {other:?}"),
    }
}
