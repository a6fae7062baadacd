//! Subcommands and the pipeline setup they share.

pub mod batch;
pub mod config;
pub mod languages;
pub mod process;

use std::path::Path;

use clap::{Args, ValueEnum};
use tracing::debug;

use scanocr_core::markdown::document_text;
use scanocr_core::models::config::{BackendKind, ScanConfig};
use scanocr_core::{
    MarkdownGenerator, OcrBackend, PageTextExtractor, PdfLoader, TesseractBackend, VisionModelBackend,
    VisionModelConfig,
};

/// Backend selection on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BackendArg {
    /// Local Tesseract engine
    Tesseract,
    /// Vision model over an OpenAI-compatible API
    Vision,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Tesseract => BackendKind::Tesseract,
            BackendArg::Vision => BackendKind::Vision,
        }
    }
}

/// Document output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Labelled plain text, one section per page
    #[default]
    Text,
    /// Per-page results as JSON
    Json,
    /// Structured Markdown
    Markdown,
}

impl OutputFormat {
    /// File extension for outputs in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }
}

/// Options selecting and tuning the OCR pipeline.
#[derive(Args, Clone, Debug, Default)]
pub struct EngineArgs {
    /// OCR backend (default: from config, else tesseract)
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Language hint, e.g. "eng", "eng+chi_sim", or "auto" for the vision backend
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Rasterization resolution
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Vision model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Vision API base URL
    #[arg(long)]
    pub base_url: Option<String>,
}

impl EngineArgs {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut ScanConfig) {
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(dpi) = self.dpi {
            config.pdf.render_dpi = dpi;
        }
        if let Some(model) = &self.model {
            config.vision.model = Some(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.vision.base_url = Some(base_url.clone());
        }
    }

    /// Language hint for the selected backend.
    pub fn language(&self, config: &ScanConfig) -> String {
        self.lang.clone().unwrap_or_else(|| match config.backend {
            BackendKind::Tesseract => config.tesseract.language.clone(),
            BackendKind::Vision => config.vision.language.clone(),
        })
    }
}

/// Default config file location.
pub fn default_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("scanocr")
        .join("config.json")
}

/// Load the explicit config file, else the default one if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ScanConfig> {
    let config = match config_path {
        Some(path) => ScanConfig::from_file(Path::new(path))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                debug!("Using config file {}", default_path.display());
                ScanConfig::from_file(&default_path)?
            } else {
                ScanConfig::default()
            }
        }
    };
    Ok(config)
}

/// Build the configured OCR backend.
///
/// Creates blocking HTTP clients, so call it off the async runtime.
pub fn build_backend(config: &ScanConfig) -> anyhow::Result<Box<dyn OcrBackend>> {
    let backend: Box<dyn OcrBackend> = match config.backend {
        BackendKind::Tesseract => Box::new(TesseractBackend::new(
            config.tesseract.clone(),
            Some(config.pdf.render_dpi),
        )),
        BackendKind::Vision => Box::new(VisionModelBackend::from_env(&config.vision)?),
    };
    Ok(backend)
}

/// Build the page extractor for a validated configuration.
pub fn build_extractor(config: &ScanConfig) -> anyhow::Result<PageTextExtractor> {
    config.validate()?;
    Ok(PageTextExtractor::new(build_backend(config)?)
        .with_source(Box::new(PdfLoader::new(config.pdf.renderer.clone())))
        .with_dpi(config.pdf.render_dpi)
        .with_labels(config.output.clone()))
}

/// Build the Markdown generator, optionally backed by the configured chat model.
///
/// Creates blocking HTTP clients, so call it off the async runtime.
pub fn build_markdown(config: &ScanConfig, use_model: bool) -> anyhow::Result<MarkdownGenerator> {
    if !use_model {
        return Ok(MarkdownGenerator::new());
    }
    let vision = VisionModelConfig::resolve(&config.vision, |key| std::env::var(key).ok())?;
    Ok(MarkdownGenerator::from_config(&vision)?)
}

/// Extract a whole document and render it in `format`.
pub fn render_document(
    extractor: &PageTextExtractor,
    markdown: &MarkdownGenerator,
    input: &Path,
    language: &str,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let rendered = match format {
        OutputFormat::Text => extractor.process(input, language)?,
        OutputFormat::Json => serde_json::to_string_pretty(&extractor.process_pages(input, language)?)?,
        OutputFormat::Markdown => {
            let pages = extractor.process_pages(input, language)?;
            markdown.generate(&document_text(&pages))
        }
    };
    Ok(rendered)
}
