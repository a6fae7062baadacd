//! Configuration structures for the OCR pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variables checked for the vision API credential, in priority order.
pub const CREDENTIAL_ENV_VARS: [&str; 3] = ["SCANOCR_API_KEY", "DASHSCOPE_API_KEY", "OPENAI_API_KEY"];

/// Environment variable overriding the vision model identifier.
pub const MODEL_ENV_VAR: &str = "SCANOCR_MODEL";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV_VAR: &str = "SCANOCR_BASE_URL";

/// Environment variable overriding the prompt template.
pub const PROMPT_ENV_VAR: &str = "SCANOCR_PROMPT";

/// Environment variable overriding the system instruction.
pub const SYSTEM_PROMPT_ENV_VAR: &str = "SCANOCR_SYSTEM_PROMPT";

/// Environment variable overriding the output-token ceiling.
pub const MAX_OUTPUT_TOKENS_ENV_VAR: &str = "SCANOCR_MAX_OUTPUT_TOKENS";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "qwen-vl-max";

/// Default OpenAI-compatible endpoint (DashScope compatible mode).
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default prompt sent alongside each page image. `{lang}` is replaced by the language hint.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Extract all text from this scanned page. \
The expected language is: {lang}. Return only the extracted text in reading order, \
separating paragraphs with a blank line. Do not translate, summarize, or add commentary.";

/// Default system instruction.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a precise OCR engine. You transcribe the text \
visible in document images exactly as written and never invent content.";

/// Default output-token ceiling.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Wire name of the token ceiling; `/chat/completions` endpoints read `max_tokens`.
pub const DEFAULT_MAX_TOKENS_FIELD: &str = "max_tokens";

/// Default rasterization resolution.
pub const DEFAULT_RENDER_DPI: u32 = 300;

/// Default page renderer executable.
pub const DEFAULT_RENDERER: &str = "pdftoppm";

/// Main configuration for the scanocr pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Which OCR backend to use.
    pub backend: BackendKind,

    /// PDF rasterization configuration.
    pub pdf: PdfConfig,

    /// Local Tesseract configuration.
    pub tesseract: TesseractConfig,

    /// Vision model configuration (unresolved; see [`VisionModelConfig::resolve`]).
    pub vision: VisionConfig,

    /// Literal page header and empty-page marker.
    pub output: OutputLabels,
}

/// Available OCR backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Tesseract engine with structured word output.
    #[default]
    Tesseract,
    /// Prompt-driven multimodal model over HTTP.
    Vision,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Tesseract => "tesseract",
            BackendKind::Vision => "vision",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PDF rasterization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rendering PDF pages to images.
    pub render_dpi: u32,

    /// Poppler `pdftoppm` executable name or path.
    pub renderer: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: DEFAULT_RENDER_DPI,
            renderer: DEFAULT_RENDERER.to_string(),
        }
    }
}

/// Tesseract engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Executable name or path.
    pub binary: String,

    /// Default language code(s), e.g. `eng` or `eng+chi_sim`.
    pub language: String,

    /// Words must score strictly above this confidence to be kept.
    pub min_confidence: f32,

    /// Optional `--psm` page segmentation mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_segmentation_mode: Option<u8>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            min_confidence: 60.0,
            page_segmentation_mode: None,
        }
    }
}

/// Encoding used when sending page bitmaps to the vision endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    #[default]
    Png,
    Jpeg,
}

impl ImageEncoding {
    /// MIME type for data URIs.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg => "image/jpeg",
        }
    }

    pub fn format(&self) -> image::ImageFormat {
        match self {
            ImageEncoding::Png => image::ImageFormat::Png,
            ImageEncoding::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Vision backend settings as written in the config file.
///
/// Unset fields fall through to the environment and then to built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Default language hint; `auto` lets the model decide.
    pub language: String,

    /// Image encoding for the request payload.
    pub image_format: ImageEncoding,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Request field carrying the token ceiling. Defaults to `max_tokens`;
    /// set `max_output_tokens` or `max_completion_tokens` for endpoints
    /// that expect those names.
    pub max_tokens_field: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            prompt_template: None,
            system_prompt: None,
            max_output_tokens: None,
            language: "auto".to_string(),
            image_format: ImageEncoding::Png,
            timeout_secs: 120,
            max_tokens_field: DEFAULT_MAX_TOKENS_FIELD.to_string(),
        }
    }
}

/// Fully resolved vision backend configuration. Immutable once built.
#[derive(Clone)]
pub struct VisionModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub prompt_template: String,
    pub system_prompt: String,
    pub max_output_tokens: u32,
    pub image_format: ImageEncoding,
    pub timeout: Duration,
    pub max_tokens_field: String,
}

impl VisionModelConfig {
    /// Resolve every setting as explicit value > `lookup(env var)` > default.
    ///
    /// Fails only when no credential can be found.
    pub fn resolve<F>(explicit: &VisionConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let setting = |value: &Option<String>, key: &str| -> Option<String> {
            non_empty(value.clone()).or_else(|| non_empty(lookup(key)))
        };

        let api_key = non_empty(explicit.api_key.clone())
            .or_else(|| {
                CREDENTIAL_ENV_VARS
                    .iter()
                    .find_map(|key| non_empty(lookup(key)))
            })
            .ok_or_else(|| ConfigError::MissingCredential {
                sources: std::iter::once("vision.api_key".to_string())
                    .chain(CREDENTIAL_ENV_VARS.iter().map(|k| k.to_string()))
                    .collect(),
            })?;

        let max_output_tokens = explicit
            .max_output_tokens
            .or_else(|| {
                lookup(MAX_OUTPUT_TOKENS_ENV_VAR).and_then(|v| v.trim().parse::<u32>().ok())
            })
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        Ok(Self {
            api_key,
            base_url: setting(&explicit.base_url, BASE_URL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: setting(&explicit.model, MODEL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompt_template: setting(&explicit.prompt_template, PROMPT_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string()),
            system_prompt: setting(&explicit.system_prompt, SYSTEM_PROMPT_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_output_tokens,
            image_format: explicit.image_format,
            timeout: Duration::from_secs(explicit.timeout_secs.max(1)),
            max_tokens_field: explicit.max_tokens_field.clone(),
        })
    }

    /// Resolve against the process environment.
    pub fn from_env(explicit: &VisionConfig) -> Result<Self, ConfigError> {
        Self::resolve(explicit, |key| std::env::var(key).ok())
    }
}

impl fmt::Debug for VisionModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionModelConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("image_format", &self.image_format)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Literal strings used when assembling paginated output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLabels {
    /// Header placed above each page; `{page}` is the 1-based page number.
    pub page_header: String,

    /// Body used for pages where nothing was recognized.
    pub empty_page: String,
}

impl Default for OutputLabels {
    fn default() -> Self {
        Self {
            page_header: "=== Page {page} ===".to_string(),
            empty_page: "[No text content]".to_string(),
        }
    }
}

impl OutputLabels {
    /// Header for the given 0-based page index.
    pub fn header(&self, page_index: u32) -> String {
        self.page_header
            .replace("{page}", &(page_index as u64 + 1).to_string())
    }
}

impl ScanConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::File(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pdf.render_dpi == 0 {
            return Err(ConfigError::Invalid("pdf.render_dpi must be greater than zero".to_string()));
        }
        if self.pdf.renderer.trim().is_empty() {
            return Err(ConfigError::Invalid("pdf.renderer must not be empty".to_string()));
        }
        if self.tesseract.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("tesseract.binary must not be empty".to_string()));
        }
        if self.vision.max_tokens_field.trim().is_empty() {
            return Err(ConfigError::Invalid("vision.max_tokens_field must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let err = VisionModelConfig::resolve(&VisionConfig::default(), lookup(&[])).unwrap_err();
        match err {
            ConfigError::MissingCredential { sources } => {
                assert_eq!(sources[0], "vision.api_key");
                assert_eq!(&sources[1..], &CREDENTIAL_ENV_VARS.map(String::from)[..]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let explicit = VisionConfig {
            api_key: Some("   ".to_string()),
            ..VisionConfig::default()
        };
        assert!(VisionModelConfig::resolve(&explicit, lookup(&[("OPENAI_API_KEY", "")])).is_err());
    }

    #[test]
    fn test_credential_source_priority() {
        let env = lookup(&[("DASHSCOPE_API_KEY", "dash"), ("OPENAI_API_KEY", "openai")]);
        let config = VisionModelConfig::resolve(&VisionConfig::default(), &env).unwrap();
        assert_eq!(config.api_key, "dash");

        let explicit = VisionConfig {
            api_key: Some("explicit".to_string()),
            ..VisionConfig::default()
        };
        let config = VisionModelConfig::resolve(&explicit, &env).unwrap();
        assert_eq!(config.api_key, "explicit");
    }

    #[test]
    fn test_setting_precedence() {
        let env = lookup(&[
            ("SCANOCR_API_KEY", "key"),
            ("SCANOCR_MODEL", "env-model"),
            ("SCANOCR_MAX_OUTPUT_TOKENS", "512"),
        ]);

        let defaults = VisionModelConfig::resolve(&VisionConfig::default(), lookup(&[("SCANOCR_API_KEY", "key")])).unwrap();
        assert_eq!(defaults.model, DEFAULT_MODEL);
        assert_eq!(defaults.base_url, DEFAULT_BASE_URL);
        assert_eq!(defaults.prompt_template, DEFAULT_PROMPT_TEMPLATE);
        assert_eq!(defaults.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);

        let from_env = VisionModelConfig::resolve(&VisionConfig::default(), &env).unwrap();
        assert_eq!(from_env.model, "env-model");
        assert_eq!(from_env.max_output_tokens, 512);

        let explicit = VisionConfig {
            model: Some("explicit-model".to_string()),
            max_output_tokens: Some(64),
            ..VisionConfig::default()
        };
        let resolved = VisionModelConfig::resolve(&explicit, &env).unwrap();
        assert_eq!(resolved.model, "explicit-model");
        assert_eq!(resolved.max_output_tokens, 64);
    }

    #[test]
    fn test_unparsable_token_ceiling_falls_back() {
        let env = lookup(&[("SCANOCR_API_KEY", "key"), ("SCANOCR_MAX_OUTPUT_TOKENS", "lots")]);
        let config = VisionModelConfig::resolve(&VisionConfig::default(), env).unwrap();
        assert_eq!(config.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = VisionModelConfig::resolve(&VisionConfig::default(), lookup(&[("SCANOCR_API_KEY", "sk-secret")])).unwrap();
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }

    #[test]
    fn test_header_is_one_based() {
        let labels = OutputLabels::default();
        assert_eq!(labels.header(0), "=== Page 1 ===");
        assert_eq!(labels.header(9), "=== Page 10 ===");
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ScanConfig::default();
        config.backend = BackendKind::Vision;
        config.pdf.render_dpi = 150;
        config.output.empty_page = "[empty]".to_string();
        config.save(&path).unwrap();

        let loaded = ScanConfig::from_file(&path).unwrap();
        assert_eq!(loaded.backend, BackendKind::Vision);
        assert_eq!(loaded.pdf.render_dpi, 150);
        assert_eq!(loaded.output.empty_page, "[empty]");
        assert_eq!(loaded.tesseract.min_confidence, 60.0);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ScanConfig = serde_json::from_str(r#"{"tesseract": {"language": "chi_sim"}}"#).unwrap();
        assert_eq!(config.tesseract.language, "chi_sim");
        assert_eq!(config.tesseract.binary, "tesseract");
        assert_eq!(config.pdf.render_dpi, 300);
        assert_eq!(config.vision.language, "auto");
        assert_eq!(config.pdf.renderer, "pdftoppm");
    }

    #[test]
    fn test_default_token_field_is_max_tokens() {
        let config = VisionModelConfig::resolve(
            &VisionConfig::default(),
            lookup(&[("DASHSCOPE_API_KEY", "sk-test")]),
        )
        .unwrap();
        assert_eq!(config.max_tokens_field, "max_tokens");
    }

    #[test]
    fn test_blank_renderer_rejected() {
        let mut config = ScanConfig::default();
        config.pdf.renderer = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_dpi_rejected() {
        let mut config = ScanConfig::default();
        config.pdf.render_dpi = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
