//! OCR backends turning page bitmaps into text.
//!
//! Two interchangeable backends implement [`OcrBackend`]:
//! - [`TesseractBackend`]: local Tesseract with per-word confidence filtering
//! - [`VisionModelBackend`]: prompt-driven multimodal model over HTTP
//!
//! Backends never fail a page: any error is logged and yields empty text.

mod response;
mod tesseract;
mod vision;

pub use response::{normalize_response, ContentPart, MessageContent};
pub use tesseract::{
    group_words, parse_tsv, RecognitionEngine, TesseractBackend, TesseractCli, WordRecord,
    DEFAULT_LANGUAGE,
};
pub use vision::{
    encode_image, encode_image_base64, render_prompt, ChatContent, ChatMessage, ChatPart,
    CompletionRequest, CompletionTransport, HttpTransport, ImageUrl, VisionModelBackend,
};

use image::RgbImage;

use crate::models::config::BackendKind;

/// Capability shared by every OCR strategy.
pub trait OcrBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Recognize the text in `image`.
    ///
    /// Returns an empty string when nothing legible was found or recognition failed.
    fn extract(&self, image: &RgbImage, language: &str) -> String;

    /// Recognize text and split it into paragraph-like blocks.
    fn extract_blocks(&self, image: &RgbImage, language: &str) -> Vec<String> {
        split_blocks(&self.extract(image, language))
    }
}

/// Split text into blocks on blank lines, or on single newlines when the
/// text has no blank lines. Blocks are trimmed; empty ones are dropped.
pub fn split_blocks(text: &str) -> Vec<String> {
    let separator = if text.contains("\n\n") { "\n\n" } else { "\n" };
    text.split(separator)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect()
}
