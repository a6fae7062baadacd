//! Error types for the scanocr-core library.

use thiserror::Error;

/// Main error type for the scanocr library.
#[derive(Error, Debug)]
pub enum ScanError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PageRenderError> for ScanError {
    fn from(err: PageRenderError) -> Self {
        ScanError::Pdf(PdfError::Render(err))
    }
}

/// Errors related to opening a PDF document.
///
/// Any of these while opening a document aborts the whole extraction.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to open PDF: {0}")]
    Open(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// A page could not be rasterized.
    #[error(transparent)]
    Render(#[from] PageRenderError),
}

/// Errors raised while rasterizing a single page.
#[derive(Error, Debug)]
pub enum PageRenderError {
    /// Page index outside `0..count`.
    #[error("page index {index} out of range (document has {count} pages)")]
    OutOfRange { index: u32, count: u32 },

    /// DPI must be positive.
    #[error("DPI must be greater than zero")]
    InvalidDpi,

    /// Target bitmap exceeds the supported size.
    #[error("rendered page too large: {width}x{height}")]
    TooLarge { width: u32, height: u32 },

    /// The external page renderer is missing or failed.
    #[error("page renderer failed: {0}")]
    Renderer(String),

    /// Renderer output could not be decoded into a bitmap.
    #[error("failed to decode page: {0}")]
    Decode(String),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The recognition engine is not installed or cannot be started.
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    /// The recognition engine ran but reported a failure.
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    /// Failed to encode the page bitmap for transport.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body could not be interpreted.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No credential was found in any of the configured sources.
    #[error("no API credential found (checked: {})", .sources.join(", "))]
    MissingCredential { sources: Vec<String> },

    /// A configuration value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Failed to read or write a configuration file.
    #[error("config file error: {0}")]
    File(String),
}

/// Result type for the scanocr library.
pub type Result<T> = std::result::Result<T, ScanError>;
