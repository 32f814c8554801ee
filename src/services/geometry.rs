//! Projection of source-pixel boxes onto a rendered, possibly zoomed or
//! panned, image.
//!
//! A [`Viewport`] is computed once per render from the [`SurfaceState`] and
//! passed to [`Viewport::map`] as plain data. It can only be built once the
//! exact image the surface asked for has finished loading.

use serde::Serialize;

use crate::models::result::{BBox, PageResult};

/// An image the rendering surface finished loading.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub src: String,
    pub natural_width: u32,
    pub natural_height: u32,
}

/// What the rendering surface currently shows.
#[derive(Debug, Clone)]
pub struct SurfaceState {
    requested_src: String,
    loaded: Option<LoadedImage>,
    display_width: f64,
    display_height: f64,
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
}

impl SurfaceState {
    pub fn new(src: &str, display_width: f64, display_height: f64) -> Self {
        Self {
            requested_src: src.to_string(),
            loaded: None,
            display_width,
            display_height,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }

    /// Switch to a new image source. Any previous load no longer counts.
    pub fn request(&mut self, src: &str) {
        if self.requested_src != src {
            self.requested_src = src.to_string();
            self.loaded = None;
        }
    }

    /// Record a finished load. Loads for a source other than the one last
    /// requested are stale and ignored. Returns whether the load was accepted.
    pub fn on_load(&mut self, image: LoadedImage) -> bool {
        if image.src != self.requested_src {
            tracing::debug!(
                loaded = %image.src,
                requested = %self.requested_src,
                "Ignoring stale image load"
            );
            return false;
        }
        self.loaded = Some(image);
        true
    }

    pub fn resize(&mut self, display_width: f64, display_height: f64) {
        self.display_width = display_width;
        self.display_height = display_height;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// True only when the requested source itself is loaded with non-zero size.
    pub fn is_ready(&self) -> bool {
        matches!(
            &self.loaded,
            Some(img) if img.src == self.requested_src && img.natural_width > 0 && img.natural_height > 0
        )
    }

    pub fn loaded(&self) -> Option<&LoadedImage> {
        self.loaded.as_ref().filter(|_| self.is_ready())
    }
}

/// Scale and offset from source-pixel space to display space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub natural_width: u32,
    pub natural_height: u32,
}

/// A positioned overlay rectangle in display space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Viewport for `page` on `surface`.
    ///
    /// Structured pages scale against the dimensions they report; flat pages
    /// (and structured pages without dimensions) scale against the loaded
    /// image's natural size.
    pub fn for_page(surface: &SurfaceState, page: &PageResult) -> Result<Self, GeometryError> {
        let image = surface.loaded().ok_or_else(|| GeometryError::ImageNotLoaded {
            src: surface.requested_src.clone(),
        })?;

        let (source_w, source_h) = page
            .source_size()
            .unwrap_or((image.natural_width as f64, image.natural_height as f64));

        let display_w = surface.display_width * surface.zoom;
        let display_h = surface.display_height * surface.zoom;
        if !(display_w.is_finite() && display_h.is_finite()) || display_w <= 0.0 || display_h <= 0.0 {
            return Err(GeometryError::InvalidDimensions {
                width: display_w,
                height: display_h,
            });
        }

        Ok(Self {
            scale_x: display_w / source_w,
            scale_y: display_h / source_h,
            offset_x: surface.pan_x,
            offset_y: surface.pan_y,
            natural_width: image.natural_width,
            natural_height: image.natural_height,
        })
    }

    /// Map a box into display space.
    ///
    /// Degenerate (all-zero) and malformed boxes yield `None`; they are never
    /// drawn as zero-sized rectangles.
    pub fn map(&self, bbox: &BBox) -> Option<Rect> {
        if bbox.is_degenerate() || !bbox.is_well_formed() {
            return None;
        }
        Some(Rect {
            left: bbox.x1 * self.scale_x + self.offset_x,
            top: bbox.y1 * self.scale_y + self.offset_y,
            width: bbox.width() * self.scale_x,
            height: bbox.height() * self.scale_y,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Image '{src}' has not finished loading")]
    ImageNotLoaded { src: String },

    #[error("Invalid display dimensions {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },
}
