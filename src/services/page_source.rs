//! Resolution of submitted artifacts into uploadable bytes and display pages.
//!
//! Three inputs are accepted: a raster image, a PDF, or the stored artifact of
//! a job being revisited (fetched through a signed URL). PDF pages are
//! rasterised one at a time, on demand, inside `spawn_blocking` because pdfium
//! is synchronous and CPU-bound.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::api_client::{ApiError, OcrApi};

/// Largest artifact accepted for upload or rendering.
pub const MAX_ARTIFACT_BYTES: u64 = 100 * 1024 * 1024;

/// Oversampling applied when rasterising PDF pages.
pub const DEFAULT_PDF_RENDER_SCALE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image(ImageFormat),
    Pdf,
}

/// A submitted file held in memory.
#[derive(Debug, Clone)]
pub struct Artifact {
    filename: String,
    bytes: Arc<Vec<u8>>,
    kind: ArtifactKind,
}

impl Artifact {
    /// Wrap raw bytes, rejecting oversized or unrecognized content.
    pub fn from_bytes(filename: &str, bytes: Vec<u8>, max_bytes: u64) -> Result<Self, PageSourceError> {
        if bytes.len() as u64 > max_bytes {
            return Err(PageSourceError::TooLarge {
                size: bytes.len() as u64,
                max: max_bytes,
            });
        }

        let kind = if bytes.starts_with(b"%PDF") {
            ArtifactKind::Pdf
        } else {
            let format = image::guess_format(&bytes).map_err(|_| PageSourceError::UnsupportedFormat {
                filename: filename.to_string(),
            })?;
            ArtifactKind::Image(format)
        };

        Ok(Self {
            filename: filename.to_string(),
            bytes: Arc::new(bytes),
            kind,
        })
    }

    /// Read a local file. The size limit is checked before the file is read.
    pub async fn from_path(path: &Path, max_bytes: u64) -> Result<Self, PageSourceError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|source| PageSourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if meta.len() > max_bytes {
            return Err(PageSourceError::TooLarge {
                size: meta.len(),
                max: max_bytes,
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| PageSourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        Self::from_bytes(filename, bytes, max_bytes)
    }

    /// Fetch the stored artifact of a previously submitted job.
    pub async fn from_stored(
        api: &dyn OcrApi,
        artifact_key: &str,
        max_bytes: u64,
    ) -> Result<Self, PageSourceError> {
        let url = api.image_url(artifact_key).await?;
        let bytes = api.download(&url).await?;
        let filename = artifact_key.rsplit('/').next().unwrap_or(artifact_key);
        debug!(artifact_key, bytes = bytes.len(), "Fetched stored artifact");
        Self::from_bytes(filename, bytes, max_bytes)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &'static str {
        match self.kind {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Image(format) => format.to_mime_type(),
        }
    }

    /// Base64 encoding of the raw artifact, for inline submission.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes.as_slice())
    }
}

/// One page rendered for display.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-based.
    pub page_index: usize,
    pub total_pages: usize,
    pub image: DynamicImage,
    source_id: String,
}

impl RasterPage {
    /// Identifies this exact raster; used to gate geometry on its load.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn natural_size(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// PNG-encode the page, e.g. to resubmit just the displayed page.
    pub fn to_png_base64(&self) -> Result<String, PageSourceError> {
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| PageSourceError::Encode(e.to_string()))?;
        Ok(STANDARD.encode(&buf))
    }
}

/// Rendering knobs.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub pdf_scale: f32,
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            pdf_scale: DEFAULT_PDF_RENDER_SCALE,
            pdfium_lib_path: None,
        }
    }
}

/// An artifact opened for page-by-page display.
#[derive(Debug, Clone)]
pub struct PageSource {
    artifact: Artifact,
    total_pages: usize,
    options: RenderOptions,
}

impl PageSource {
    /// Open an artifact. PDFs are opened once to count pages; no page is
    /// rendered until asked for.
    pub async fn open(artifact: Artifact, options: RenderOptions) -> Result<Self, PageSourceError> {
        let total_pages = match artifact.kind {
            ArtifactKind::Image(_) => 1,
            ArtifactKind::Pdf => {
                let bytes = Arc::clone(&artifact.bytes);
                let lib_path = options.pdfium_lib_path.clone();
                tokio::task::spawn_blocking(move || count_pdf_pages(&bytes, lib_path.as_deref()))
                    .await
                    .map_err(|e| PageSourceError::Internal(format!("Page count task panicked: {e}")))??
            }
        };
        info!(filename = %artifact.filename, total_pages, "Opened page source");

        Ok(Self {
            artifact,
            total_pages,
            options,
        })
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Render one 1-based page.
    ///
    /// `Ok(None)` means the page exists but could not be rasterised; callers
    /// show that as a visible "not renderable" state.
    pub async fn render_page(&self, page_index: usize) -> Result<Option<RasterPage>, PageSourceError> {
        if page_index == 0 || page_index > self.total_pages {
            return Err(PageSourceError::PageOutOfRange {
                page: page_index,
                total: self.total_pages,
            });
        }

        let bytes = Arc::clone(&self.artifact.bytes);
        let kind = self.artifact.kind;
        let scale = self.options.pdf_scale;
        let lib_path = self.options.pdfium_lib_path.clone();

        let rendered = tokio::task::spawn_blocking(move || match kind {
            ArtifactKind::Image(format) => {
                image::load_from_memory_with_format(&bytes, format).map_err(|e| e.to_string())
            }
            ArtifactKind::Pdf => render_pdf_page(&bytes, page_index, scale, lib_path.as_deref()),
        })
        .await
        .map_err(|e| PageSourceError::Internal(format!("Render task panicked: {e}")))?;

        match rendered {
            Ok(image) => {
                debug!(
                    page = page_index,
                    width = image.width(),
                    height = image.height(),
                    "Rendered page"
                );
                Ok(Some(RasterPage {
                    page_index,
                    total_pages: self.total_pages,
                    image,
                    source_id: format!("{}#page={}", self.artifact.filename, page_index),
                }))
            }
            Err(detail) => {
                warn!(page = page_index, error = %detail, "Page could not be rasterised");
                Ok(None)
            }
        }
    }
}

fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, PageSourceError> {
    let bindings = match lib_path {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PageSourceError::PdfiumBinding(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn count_pdf_pages(bytes: &[u8], lib_path: Option<&Path>) -> Result<usize, PageSourceError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PageSourceError::CorruptPdf(format!("{e:?}")))?;
    let total = document.pages().len() as usize;
    if total == 0 {
        return Err(PageSourceError::CorruptPdf("document has no pages".to_string()));
    }
    Ok(total)
}

fn render_pdf_page(
    bytes: &[u8],
    page_index: usize,
    scale: f32,
    lib_path: Option<&Path>,
) -> Result<DynamicImage, String> {
    let pdfium = bind_pdfium(lib_path).map_err(|e| e.to_string())?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| format!("{e:?}"))?;
    let page = document
        .pages()
        .get((page_index - 1) as u16)
        .map_err(|e| format!("{e:?}"))?;
    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page.render_with_config(&config).map_err(|e| format!("{e:?}"))?;
    Ok(bitmap.as_image())
}

#[derive(Debug, thiserror::Error)]
pub enum PageSourceError {
    #[error("File is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    #[error("'{filename}' is neither a supported image nor a PDF")]
    UnsupportedFormat { filename: String },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch stored artifact: {0}")]
    Fetch(#[from] ApiError),

    #[error("PDF could not be opened: {0}")]
    CorruptPdf(String),

    #[error("Failed to bind to pdfium library: {0}")]
    PdfiumBinding(String),

    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("Failed to encode page image: {0}")]
    Encode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
