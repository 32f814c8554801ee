use serde::{Deserialize, Serialize};

/// Labels whose blocks are kept even when they carry no text.
const VISUAL_LABELS: &[&str] = &["image", "figure", "chart", "seal", "stamp"];

/// Axis-aligned bounding box `(x1, y1, x2, y2)` in source-pixel space.
///
/// Serialized as a four-element array, matching the payloads the models emit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    /// Build a box from two corners in any order. The result always satisfies
    /// `x1 <= x2` and `y1 <= y2`.
    pub fn from_corners(ax: f64, ay: f64, bx: f64, by: f64) -> Self {
        Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }

    pub const fn zero() -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            x2: 0.0,
            y2: 0.0,
        }
    }

    /// All four coordinates are zero: the model had no detection for the item.
    pub fn is_degenerate(&self) -> bool {
        self.x1 == 0.0 && self.y1 == 0.0 && self.x2 == 0.0 && self.y2 == 0.0
    }

    /// Finite and correctly ordered.
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 <= self.x2
            && self.y1 <= self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self {
            x1: v[0],
            y1: v[1],
            x2: v[2],
            y2: v[3],
        }
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One normalized content unit of a structured page.
///
/// Field names follow the structured payload so a serialized page can be fed
/// back through the normalizer unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "block_id")]
    pub id: u32,
    #[serde(rename = "block_label")]
    pub label: String,
    #[serde(rename = "block_content")]
    pub content: String,
    #[serde(rename = "block_bbox")]
    pub bbox: BBox,
    #[serde(rename = "block_order")]
    pub order: Option<u32>,
    pub group_id: Option<u32>,
}

impl Block {
    /// Image-like blocks are rendered even without text.
    pub fn is_visual(&self) -> bool {
        let label = self.label.to_ascii_lowercase();
        VISUAL_LABELS.iter().any(|v| label.contains(v))
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Tabular blocks carry embedded markup rather than plain text.
    pub fn is_table(&self) -> bool {
        self.label.eq_ignore_ascii_case("table")
    }
}

/// One recognized text line from the flat-recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatLine {
    pub text: String,
    pub bbox: BBox,
    pub confidence: f32,
}

/// One page of a normalized result.
///
/// The two shapes are disjoint; which one a payload has is decided once by the
/// normalizer and never re-inspected downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageResult {
    Structured {
        width: Option<f64>,
        height: Option<f64>,
        #[serde(rename = "parsing_res_list")]
        blocks: Vec<Block>,
    },
    Flat { lines: Vec<FlatLine> },
}

impl PageResult {
    pub fn blocks(&self) -> &[Block] {
        match self {
            PageResult::Structured { blocks, .. } => blocks,
            PageResult::Flat { .. } => &[],
        }
    }

    pub fn flat_lines(&self) -> &[FlatLine] {
        match self {
            PageResult::Structured { .. } => &[],
            PageResult::Flat { lines } => lines,
        }
    }

    /// Source dimensions reported by the payload. Flat pages never carry them.
    pub fn source_size(&self) -> Option<(f64, f64)> {
        match self {
            PageResult::Structured {
                width: Some(w),
                height: Some(h),
                ..
            } if *w > 0.0 && *h > 0.0 => Some((*w, *h)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PageResult::Structured { blocks, .. } => blocks.is_empty(),
            PageResult::Flat { lines } => lines.is_empty(),
        }
    }
}

/// Every page of a completed job, plus the document-level markdown the
/// service may have rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub pages: Vec<PageResult>,
    pub content: Option<String>,
}

impl DocumentResult {
    /// Page for a 1-based page number, falling back to the first page when the
    /// number is out of range.
    pub fn page(&self, page_number: usize) -> Option<&PageResult> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .or_else(|| self.pages.first())
    }
}

/// Whether a completed payload could be turned into something renderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Rendition {
    Ready(DocumentResult),
    Unrenderable { reason: String },
}

/// Result attached to a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// The payload exactly as the service returned it.
    pub raw: serde_json::Value,
    pub rendition: Rendition,
}

impl JobResult {
    pub fn document(&self) -> Option<&DocumentResult> {
        match &self.rendition {
            Rendition::Ready(doc) => Some(doc),
            Rendition::Unrenderable { .. } => None,
        }
    }
}
