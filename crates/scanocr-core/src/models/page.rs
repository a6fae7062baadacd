//! Per-page extraction results.

use serde::{Deserialize, Serialize};

/// Recognized text for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// Page index (0-based).
    pub page_index: u32,
    /// Recognized text; empty when nothing legible was found.
    pub text: String,
}

impl PageResult {
    /// Whether the page produced no usable text.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Paragraph-like blocks recognized on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlocks {
    /// Page index (0-based).
    pub page_index: u32,
    /// Blocks in reading order.
    pub blocks: Vec<String>,
}

/// Rectangle in PDF user space (points, origin at the bottom-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// A recognized block placed on its page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    /// Page index (0-based).
    pub page_index: u32,
    pub bbox: BoundingBox,
    pub text: String,
}

/// Place blocks top to bottom in equal full-width bands.
///
/// OCR blocks carry no geometry, so band `i` of `n` spans the page width and
/// the `i`-th slice of its height. Empty blocks keep their band but produce no
/// element.
pub fn layout_blocks(page_index: u32, blocks: &[String], page_width: f32, page_height: f32) -> Vec<TextElement> {
    let band = page_height / blocks.len().max(1) as f32;

    blocks
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.is_empty())
        .map(|(i, text)| {
            let y1 = (page_height - i as f32 * band).min(page_height);
            let y0 = (y1 - band).max(0.0);
            TextElement {
                page_index,
                bbox: BoundingBox { x0: 0.0, y0, x1: page_width, y1 },
                text: text.clone(),
            }
        })
        .collect()
}
