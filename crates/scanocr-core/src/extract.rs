//! Document-level orchestration: rasterize every page, OCR it, and assemble
//! the results.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::config::{OutputLabels, DEFAULT_RENDER_DPI};
use crate::models::page::{layout_blocks, PageBlocks, PageResult, TextElement};
use crate::ocr::OcrBackend;
use crate::pdf::{DocumentSource, PageRasterizer, PdfLoader, POINTS_PER_INCH};

/// Separator between formatted page entries.
const PAGE_SEPARATOR: &str = "\n\n";

/// Runs a PDF through rasterization and OCR, one page at a time.
pub struct PageTextExtractor {
    backend: Box<dyn OcrBackend>,
    source: Box<dyn DocumentSource>,
    dpi: u32,
    labels: OutputLabels,
}

impl PageTextExtractor {
    /// Create an extractor reading PDFs from disk at the default DPI.
    pub fn new(backend: Box<dyn OcrBackend>) -> Self {
        Self {
            backend,
            source: Box::new(PdfLoader::default()),
            dpi: DEFAULT_RENDER_DPI,
            labels: OutputLabels::default(),
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_labels(mut self, labels: OutputLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Replace the document loader.
    pub fn with_source(mut self, source: Box<dyn DocumentSource>) -> Self {
        self.source = source;
        self
    }

    pub fn backend(&self) -> &dyn OcrBackend {
        self.backend.as_ref()
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Extract the text of every page and join it into one document.
    ///
    /// Each page appears as its header line followed by the page text, or
    /// by the empty-page marker when nothing was recognized.
    pub fn process(&self, path: &Path, language: &str) -> Result<String> {
        let pages = self.process_pages(path, language)?;
        let output = pages
            .iter()
            .map(|page| self.format_page(page))
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR);

        info!("Extracted {} characters from {} pages", output.chars().count(), pages.len());
        Ok(output)
    }

    /// Extract the text of every page.
    ///
    /// Fails only when the document cannot be opened. Pages that fail to
    /// render are logged and reported as empty.
    pub fn process_pages(&self, path: &Path, language: &str) -> Result<Vec<PageResult>> {
        let start = Instant::now();
        let document = self.source.open(path)?;
        let page_count = document.page_count();
        info!("Processing {} ({} pages, backend: {})", path.display(), page_count, self.backend.kind());

        let pages: Vec<PageResult> = (0..page_count)
            .map(|page_index| {
                info!("Page {}/{}", page_index + 1, page_count);
                PageResult {
                    page_index,
                    text: self.page_text(document.as_ref(), page_index, language),
                }
            })
            .collect();

        debug!("Processed {} pages in {}ms", page_count, start.elapsed().as_millis());
        Ok(pages)
    }

    /// Extract the text of a single page (0-indexed).
    ///
    /// Never fails: an unreadable document or out-of-range index yields an
    /// empty string.
    pub fn process_single_page(&self, path: &Path, page_index: u32, language: &str) -> String {
        match self.source.open(path) {
            Ok(document) => self.page_text(document.as_ref(), page_index, language),
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                String::new()
            }
        }
    }

    /// Extract paragraph-like blocks for every page.
    pub fn process_blocks(&self, path: &Path, language: &str) -> Result<Vec<PageBlocks>> {
        let document = self.source.open(path)?;
        let page_count = document.page_count();

        Ok((0..page_count)
            .map(|page_index| {
                info!("Page {}/{}", page_index + 1, page_count);
                PageBlocks {
                    page_index,
                    blocks: self.blocks_for(document.as_ref(), page_index, language),
                }
            })
            .collect())
    }

    /// Extract paragraph-like blocks for a single page (0-indexed).
    ///
    /// Never fails; problems yield an empty list.
    pub fn page_blocks(&self, path: &Path, page_index: u32, language: &str) -> Vec<String> {
        match self.source.open(path) {
            Ok(document) => self.blocks_for(document.as_ref(), page_index, language),
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Recognized blocks of every page as positioned elements.
    pub fn process_elements(&self, path: &Path, language: &str) -> Result<Vec<TextElement>> {
        let document = self.source.open(path)?;
        let page_count = document.page_count();

        let mut elements = Vec::new();
        for page_index in 0..page_count {
            info!("Page {}/{}", page_index + 1, page_count);
            elements.extend(self.elements_for(document.as_ref(), page_index, language));
        }
        Ok(elements)
    }

    /// Positioned elements for a single page (0-indexed).
    ///
    /// Never fails; problems yield an empty list.
    pub fn page_elements(&self, path: &Path, page_index: u32, language: &str) -> Vec<TextElement> {
        match self.source.open(path) {
            Ok(document) => self.elements_for(document.as_ref(), page_index, language),
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Format one page entry: header line, then text or the empty marker.
    pub fn format_page(&self, page: &PageResult) -> String {
        let body = if page.is_empty() {
            self.labels.empty_page.as_str()
        } else {
            page.text.trim()
        };
        format!("{}\n{}", self.labels.header(page.page_index), body)
    }

    /// Recognized text of one page, trimmed.
    fn page_text(&self, document: &dyn PageRasterizer, page_index: u32, language: &str) -> String {
        match document.render(page_index, self.dpi) {
            Ok(image) => {
                debug!("Rendered page {} at {}x{}", page_index + 1, image.width(), image.height());
                self.backend.extract(&image, language).trim().to_string()
            }
            Err(e) => {
                warn!("Failed to render page {}: {}", page_index + 1, e);
                String::new()
            }
        }
    }

    fn blocks_for(&self, document: &dyn PageRasterizer, page_index: u32, language: &str) -> Vec<String> {
        match document.render(page_index, self.dpi) {
            Ok(image) => self.backend.extract_blocks(&image, language),
            Err(e) => {
                warn!("Failed to render page {}: {}", page_index + 1, e);
                Vec::new()
            }
        }
    }

    fn elements_for(&self, document: &dyn PageRasterizer, page_index: u32, language: &str) -> Vec<TextElement> {
        match document.render(page_index, self.dpi) {
            Ok(image) => {
                let points_per_pixel = POINTS_PER_INCH / self.dpi as f32;
                let blocks = self.backend.extract_blocks(&image, language);
                layout_blocks(
                    page_index,
                    &blocks,
                    image.width() as f32 * points_per_pixel,
                    image.height() as f32 * points_per_pixel,
                )
            }
            Err(e) => {
                warn!("Failed to render page {}: {}", page_index + 1, e);
                Vec::new()
            }
        }
    }
}
