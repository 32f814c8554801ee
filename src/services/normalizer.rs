//! Conversion of model-specific result payloads into [`PageResult`]s.
//!
//! Payloads carry no type tag. [`classify`] decides the shape exactly once per
//! page; everything after it works on the typed result.
//!
//! Envelope lookup is tolerant: for a requested page the candidates are tried
//! in order
//!
//! 1. the payload itself,
//! 2. `payload.res`,
//! 3. `payload.results[i].res`,
//! 4. `payload.results[i]`,
//!
//! where `i` is the page index, or `0` when the index is past the end of
//! `results`. A payload with none of these shapes is an error, never an empty
//! page.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::result::{BBox, Block, DocumentResult, FlatLine, JobResult, PageResult, Rendition};

/// A page-level object after discrimination.
#[derive(Debug, Clone, Copy)]
enum RawPage<'a> {
    Flat(&'a Map<String, Value>),
    Structured(&'a Map<String, Value>),
}

/// Which wrapper the page was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum Envelope {
    Direct,
    Res,
    ResultsRes,
    Results,
}

/// Normalize a completed payload into a [`JobResult`].
///
/// Never fails: payloads without a recognizable shape yield
/// [`Rendition::Unrenderable`] so callers can show "no result" rather than an
/// empty page.
pub fn normalize_job_result(raw: Value, page_count: Option<usize>) -> JobResult {
    let rendition = match normalize_document(&raw, page_count) {
        Ok(doc) => Rendition::Ready(doc),
        Err(e) => {
            warn!(error = %e, "Result payload could not be normalized");
            Rendition::Unrenderable {
                reason: e.to_string(),
            }
        }
    };
    JobResult { raw, rendition }
}

/// Normalize every page of a document.
///
/// `page_count` is the number of pages of the submitted artifact when known;
/// otherwise the length of the payload's `results` array is used.
pub fn normalize_document(
    payload: &Value,
    page_count: Option<usize>,
) -> Result<DocumentResult, NormalizeError> {
    let obj = payload.as_object().ok_or(NormalizeError::NotAnObject)?;

    if obj.get("success").and_then(Value::as_bool) == Some(false) {
        let message = obj
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("service reported an unsuccessful result");
        return Err(NormalizeError::Unsuccessful(message.to_string()));
    }

    let count = page_count
        .or_else(|| results_array(obj).map(Vec::len))
        .unwrap_or(1)
        .max(1);

    let pages = (1..=count)
        .map(|page| normalize_page(payload, page))
        .collect::<Result<Vec<_>, _>>()?;

    let content = obj
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string);

    Ok(DocumentResult { pages, content })
}

/// Normalize one 1-based page of a payload.
pub fn normalize_page(payload: &Value, page_number: usize) -> Result<PageResult, NormalizeError> {
    let (raw, envelope) =
        locate_page(payload, page_number).ok_or(NormalizeError::UnrecognizedShape { page: page_number })?;
    debug!(page = page_number, envelope = %envelope, "Located page result");

    Ok(match raw {
        RawPage::Structured(obj) => parse_structured(obj),
        RawPage::Flat(obj) => parse_flat(obj),
    })
}

fn results_array(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    obj.get("results").and_then(Value::as_array).filter(|r| !r.is_empty())
}

fn locate_page(payload: &Value, page_number: usize) -> Option<(RawPage<'_>, Envelope)> {
    if let Some(raw) = classify(payload) {
        return Some((raw, Envelope::Direct));
    }
    if let Some(raw) = payload.get("res").and_then(classify) {
        return Some((raw, Envelope::Res));
    }

    let results = payload.as_object().and_then(results_array)?;
    let index = match page_number.checked_sub(1) {
        Some(idx) if idx < results.len() => idx,
        _ => {
            if results.len() > 1 || page_number > 1 {
                warn!(
                    page = page_number,
                    available = results.len(),
                    "Page index outside results, using first entry"
                );
            }
            0
        }
    };
    let entry = &results[index];

    if let Some(raw) = entry.get("res").and_then(classify) {
        return Some((raw, Envelope::ResultsRes));
    }
    classify(entry).map(|raw| (raw, Envelope::Results))
}

/// Decide the shape of a page-level object.
///
/// A list of block objects wins over a flat text list; a flat list is only
/// accepted when every entry is a string.
fn classify(value: &Value) -> Option<RawPage<'_>> {
    let obj = value.as_object()?;

    if let Some(list) = obj.get("parsing_res_list").and_then(Value::as_array) {
        let blocks_look_right = list.iter().all(|item| {
            item.as_object()
                .map(|b| b.contains_key("block_bbox") || b.contains_key("block_label"))
                .unwrap_or(false)
        });
        if blocks_look_right {
            return Some(RawPage::Structured(obj));
        }
    }

    if let Some(texts) = obj.get("rec_texts").and_then(Value::as_array) {
        if texts.iter().all(Value::is_string) {
            return Some(RawPage::Flat(obj));
        }
    }

    None
}

fn parse_structured(obj: &Map<String, Value>) -> PageResult {
    let list = obj
        .get("parsing_res_list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut blocks: Vec<Block> = list
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let b = item.as_object()?;
            Some(Block {
                id: b
                    .get("block_id")
                    .and_then(Value::as_u64)
                    .map(|v| v as u32)
                    .unwrap_or(i as u32),
                label: b
                    .get("block_label")
                    .and_then(Value::as_str)
                    .unwrap_or("text")
                    .to_string(),
                content: b
                    .get("block_content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                bbox: b.get("block_bbox").map(parse_bbox).unwrap_or_else(BBox::zero),
                order: b.get("block_order").and_then(Value::as_u64).map(|v| v as u32),
                group_id: b.get("group_id").and_then(Value::as_u64).map(|v| v as u32),
            })
        })
        .collect();

    redistribute_group_lines(&mut blocks);

    PageResult::Structured {
        width: obj.get("width").and_then(Value::as_f64),
        height: obj.get("height").and_then(Value::as_f64),
        blocks,
    }
}

fn parse_flat(obj: &Map<String, Value>) -> PageResult {
    let empty = Vec::new();
    let texts = obj.get("rec_texts").and_then(Value::as_array).unwrap_or(&empty);
    let boxes = obj
        .get("rec_boxes")
        .and_then(Value::as_array)
        .or_else(|| obj.get("rec_polys").and_then(Value::as_array))
        .unwrap_or(&empty);
    let scores = obj.get("rec_scores").and_then(Value::as_array).unwrap_or(&empty);

    let lines = texts
        .iter()
        .enumerate()
        .map(|(i, text)| FlatLine {
            text: text.as_str().unwrap_or_default().to_string(),
            bbox: boxes.get(i).map(parse_bbox).unwrap_or_else(BBox::zero),
            confidence: scores.get(i).and_then(Value::as_f64).unwrap_or(0.0) as f32,
        })
        .collect();

    PageResult::Flat { lines }
}

/// Accepts `[x1, y1, x2, y2]` or a polygon `[[x, y], ...]`; anything else is
/// treated as "no detection".
fn parse_bbox(value: &Value) -> BBox {
    let Some(items) = value.as_array() else {
        return BBox::zero();
    };

    let numbers: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
    if let Some(n) = numbers {
        if n.len() == 4 {
            return BBox::from_corners(n[0], n[1], n[2], n[3]);
        }
        return BBox::zero();
    }

    let points: Option<Vec<(f64, f64)>> = items
        .iter()
        .map(|p| {
            let p = p.as_array()?;
            Some((p.first()?.as_f64()?, p.get(1)?.as_f64()?))
        })
        .collect();
    match points {
        Some(pts) if !pts.is_empty() => {
            let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
            let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for (x, y) in pts {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
            BBox::from_corners(min_x, min_y, max_x, max_y)
        }
        _ => BBox::zero(),
    }
}

/// Split multi-line blocks across the empty blocks of the same group.
///
/// Blocks are visited in document order. Only the first populated non-table
/// block of each group is a source: if it holds several lines, the first line
/// stays on the block and each following line moves to the next empty sibling
/// that comes after it. Lines beyond the last empty sibling stay together on
/// that sibling. Later populated blocks of the group are left untouched, as is
/// a source with no empty siblings after it.
fn redistribute_group_lines(blocks: &mut [Block]) {
    let mut seen: HashSet<u32> = HashSet::new();
    for idx in 0..blocks.len() {
        let Some(group) = blocks[idx].group_id else {
            continue;
        };
        if blocks[idx].is_table() || blocks[idx].is_visual() || !blocks[idx].has_content() {
            continue;
        }
        if !seen.insert(group) {
            continue;
        }

        let lines: Vec<String> = blocks[idx]
            .content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if lines.len() < 2 {
            continue;
        }

        let receivers: Vec<usize> = (idx + 1..blocks.len())
            .filter(|&j| {
                blocks[j].group_id == Some(group) && !blocks[j].has_content() && !blocks[j].is_visual()
            })
            .collect();
        if receivers.is_empty() {
            continue;
        }

        let mut rest = lines.into_iter();
        if let Some(first) = rest.next() {
            blocks[idx].content = first;
        }
        let rest: Vec<String> = rest.collect();
        let last = receivers.len() - 1;
        for (n, &target) in receivers.iter().enumerate() {
            if n >= rest.len() {
                break;
            }
            blocks[target].content = if n == last {
                rest[n..].join("\n")
            } else {
                rest[n].clone()
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Result payload is not a JSON object")]
    NotAnObject,

    #[error("No recognizable page result for page {page}")]
    UnrecognizedShape { page: usize },

    #[error("Service reported failure in result payload: {0}")]
    Unsuccessful(String),
}
