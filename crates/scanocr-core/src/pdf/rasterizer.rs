//! Page rasterization for PDFs.
//!
//! Pages are rendered by poppler's `pdftoppm`, which draws the full content
//! stream (placed images, forms, vector art, text) at the requested
//! resolution. `lopdf` is used up front to validate the document, count its
//! pages and size-check a page before the renderer runs.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::RgbImage;
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, trace};

use super::{scaled_dimensions, DocumentSource, PageRasterizer};
use crate::error::{PageRenderError, PdfError};
use crate::models::config::DEFAULT_RENDERER;

/// Largest bitmap side (in pixels) the rasterizer will produce.
pub const MAX_RENDER_DIMENSION: u32 = 20_000;

/// US Letter, used when a page has no MediaBox anywhere in its tree.
const DEFAULT_MEDIA_BOX: (f32, f32) = (612.0, 792.0);

/// Guards against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Opens PDFs from the filesystem.
#[derive(Debug, Clone)]
pub struct PdfLoader {
    renderer: String,
}

impl PdfLoader {
    /// Create a loader rendering pages with the given `pdftoppm` executable.
    pub fn new(renderer: impl Into<String>) -> Self {
        Self {
            renderer: renderer.into(),
        }
    }

    /// Whether the renderer executable can be run.
    pub fn is_available(&self) -> bool {
        Command::new(&self.renderer)
            .arg("-v")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new(DEFAULT_RENDERER)
    }
}

impl DocumentSource for PdfLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn PageRasterizer>, PdfError> {
        Ok(Box::new(PdfRasterizer::open(path)?.with_renderer(self.renderer.clone())))
    }
}

/// An opened PDF document ready for rasterization.
pub struct PdfRasterizer {
    path: PathBuf,
    document: Document,
    page_ids: Vec<ObjectId>,
    renderer: String,
}

impl PdfRasterizer {
    /// Open a PDF file.
    pub fn open(path: &Path) -> Result<Self, PdfError> {
        let mut document =
            Document::load(path).map_err(|e| PdfError::Open(format!("{}: {}", path.display(), e)))?;

        // Handle PDFs with empty password encryption
        if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded {} with {} pages", path.display(), page_ids.len());
        Ok(Self {
            path: path.to_path_buf(),
            document,
            page_ids,
            renderer: DEFAULT_RENDERER.to_string(),
        })
    }

    /// Use a different `pdftoppm` executable.
    pub fn with_renderer(mut self, renderer: impl Into<String>) -> Self {
        self.renderer = renderer.into();
        self
    }

    /// Look up a page attribute, following `Parent` links for inheritable keys.
    fn inherited(&self, node_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = Some(node_id);
        let mut depth = 0;

        while let Some(id) = current {
            if depth > MAX_TREE_DEPTH {
                return None;
            }
            let dict = self.document.get_dictionary(id).ok()?;
            if let Ok(value) = dict.get(key) {
                return self.document.dereference(value).ok().map(|(_, obj)| obj);
            }
            current = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
            depth += 1;
        }
        None
    }

    /// Page size in points as (width, height), before rotation.
    fn media_box(&self, page_id: ObjectId) -> (f32, f32) {
        let bounds: Option<Vec<f32>> = self
            .inherited(page_id, b"MediaBox")
            .and_then(|obj| obj.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .filter_map(|o| self.document.dereference(o).ok())
                    .filter_map(|(_, o)| as_number(o))
                    .collect()
            });

        match bounds.as_deref() {
            Some([x1, y1, x2, y2]) if (x2 - x1).abs() > 0.0 && (y2 - y1).abs() > 0.0 => {
                ((x2 - x1).abs(), (y2 - y1).abs())
            }
            _ => {
                trace!("No usable MediaBox, defaulting to US Letter");
                DEFAULT_MEDIA_BOX
            }
        }
    }

    /// Page rotation in degrees, normalized to 0/90/180/270.
    fn rotation(&self, page_id: ObjectId) -> i64 {
        self.inherited(page_id, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .map(|r| ((r % 360) + 360) % 360)
            .filter(|r| r % 90 == 0)
            .unwrap_or(0)
    }

    /// Expected bitmap size of a page, rotation applied.
    fn output_dimensions(&self, page_id: ObjectId, dpi: u32) -> (u32, u32) {
        let (width_pt, height_pt) = self.media_box(page_id);
        let (width, height) = scaled_dimensions(width_pt, height_pt, dpi);
        match self.rotation(page_id) {
            90 | 270 => (height, width),
            _ => (width, height),
        }
    }

    /// Run `pdftoppm` for one page and load the PNG it writes.
    fn run_renderer(&self, page_number: u32, dpi: u32) -> Result<RgbImage, PageRenderError> {
        let temp_dir = tempfile::tempdir().map_err(|e| PageRenderError::Renderer(e.to_string()))?;
        let prefix = temp_dir.path().join("page");

        let output = Command::new(&self.renderer)
            .args(renderer_args(page_number, dpi))
            .arg(&self.path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PageRenderError::Renderer(format!("{} not found (install poppler-utils)", self.renderer))
                } else {
                    PageRenderError::Renderer(e.to_string())
                }
            })?;

        if !output.status.success() {
            return Err(PageRenderError::Renderer(format!(
                "{} exited with {}: {}",
                self.renderer,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let png = prefix.with_extension("png");
        let image = image::open(&png).map_err(|e| PageRenderError::Decode(format!("{}: {}", png.display(), e)))?;
        Ok(image.to_rgb8())
    }
}

impl PageRasterizer for PdfRasterizer {
    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn render(&self, page_index: u32, dpi: u32) -> Result<RgbImage, PageRenderError> {
        if dpi == 0 {
            return Err(PageRenderError::InvalidDpi);
        }
        let page_id = *self
            .page_ids
            .get(page_index as usize)
            .ok_or(PageRenderError::OutOfRange {
                index: page_index,
                count: self.page_count(),
            })?;

        let (width, height) = self.output_dimensions(page_id, dpi);
        if width > MAX_RENDER_DIMENSION || height > MAX_RENDER_DIMENSION {
            return Err(PageRenderError::TooLarge { width, height });
        }

        let rendered = self.run_renderer(page_index + 1, dpi)?;
        debug!(
            "Rendered page {} at {} dpi: {}x{}",
            page_index,
            dpi,
            rendered.width(),
            rendered.height()
        );
        Ok(rendered)
    }
}

/// `pdftoppm` arguments rendering a single 1-based page as `<prefix>.png`.
fn renderer_args(page_number: u32, dpi: u32) -> Vec<String> {
    let page = page_number.to_string();
    vec![
        "-f".to_string(),
        page.clone(),
        "-l".to_string(),
        page,
        "-r".to_string(),
        dpi.to_string(),
        "-singlefile".to_string(),
        "-png".to_string(),
    ]
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}
