//! PDF loading and page rasterization.

mod rasterizer;

pub use rasterizer::{PdfLoader, PdfRasterizer, MAX_RENDER_DIMENSION};

#[cfg(test)]
pub(crate) use rasterizer::tests as fixtures;

use std::path::Path;

use image::RgbImage;

use crate::error::{PageRenderError, PdfError};

/// PDF native resolution: user-space points per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// An open document whose pages can be rendered to bitmaps.
///
/// Dropping the value releases the document.
pub trait PageRasterizer {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Render a page (0-indexed) as an RGB bitmap at the specified DPI.
    fn render(&self, page_index: u32, dpi: u32) -> Result<RgbImage, PageRenderError>;
}

/// Opens documents for rasterization.
pub trait DocumentSource: Send + Sync {
    /// Open the document at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn PageRasterizer>, PdfError>;
}

/// Pixel dimensions of a `width_pt`×`height_pt` page rendered at `dpi`.
///
/// Each side is scaled by `dpi / 72` and never drops below one pixel.
pub fn scaled_dimensions(width_pt: f32, height_pt: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let side = |points: f32| (points.abs() * scale).round().max(1.0) as u32;
    (side(width_pt), side(height_pt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(scaled_dimensions(612.0, 792.0, 72), (612, 792));
        assert_eq!(scaled_dimensions(612.0, 792.0, 300), (2550, 3300));
        assert_eq!(scaled_dimensions(72.0, 144.0, 144), (144, 288));
    }

    #[test]
    fn test_scaled_dimensions_never_zero() {
        assert_eq!(scaled_dimensions(0.1, 0.0, 1), (1, 1));
    }
}
