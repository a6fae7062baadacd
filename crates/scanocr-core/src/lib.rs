//! Core library for scanned-PDF text extraction.
//!
//! This crate provides:
//! - PDF page rasterization at a configurable DPI
//! - OCR through local Tesseract with per-word confidence filtering
//! - OCR through a prompt-driven vision model (OpenAI-compatible API)
//! - A page-by-page orchestrator assembling labelled document text
//! - Markdown rendering of the recognized text, locally or through a chat model

pub mod error;
pub mod extract;
pub mod markdown;
pub mod models;
pub mod ocr;
pub mod pdf;

pub use error::{ConfigError, OcrError, PdfError, Result, ScanError};
pub use extract::PageTextExtractor;
pub use markdown::{save_markdown, simple_markdown, MarkdownGenerator};
pub use models::config::{BackendKind, OutputLabels, ScanConfig, VisionModelConfig};
pub use models::page::{BoundingBox, PageBlocks, PageResult, TextElement};
pub use ocr::{OcrBackend, TesseractBackend, VisionModelBackend};
pub use pdf::{DocumentSource, PageRasterizer, PdfLoader, PdfRasterizer};
