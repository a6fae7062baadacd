//! Vision model OCR backend using an OpenAI-compatible chat completions API.
//!
//! Each page is encoded as a base64 data URI and sent with a prompt to a
//! multimodal model. One blocking request per page, no retries; the request
//! timeout is enforced by the HTTP client.

use std::io::Cursor;
use std::time::Instant;

use base64::Engine;
use image::RgbImage;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::response::normalize_response;
use super::OcrBackend;
use crate::error::{OcrError, ScanError};
use crate::models::config::{BackendKind, ImageEncoding, VisionConfig, VisionModelConfig};

/// Placeholder in prompt templates replaced by the language hint.
const LANGUAGE_PLACEHOLDER: &str = "{lang}";

/// Language hint used when the caller passes none.
const AUTO_LANGUAGE: &str = "auto";

/// Longest error body kept in log messages.
const MAX_ERROR_BODY: usize = 500;

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn user(parts: Vec<ChatPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: ChatContent::Parts(parts),
        }
    }
}

/// Sends completion requests and returns the raw JSON response.
pub trait CompletionTransport: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<Value, OcrError>;
}

/// Blocking HTTP transport posting to `{base_url}/chat/completions`.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    max_tokens_field: String,
}

impl HttpTransport {
    pub fn new(config: &VisionModelConfig) -> Result<Self, OcrError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OcrError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            max_tokens_field: config.max_tokens_field.clone(),
        })
    }
}

impl CompletionTransport for HttpTransport {
    fn complete(&self, request: &CompletionRequest) -> Result<Value, OcrError> {
        let body = request_body(request, &self.max_tokens_field)?;
        debug!("POST {} (model: {})", self.endpoint, request.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
                body.truncate(cut);
            }
            return Err(OcrError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .map_err(|e| OcrError::Parse(e.to_string()))
    }
}

/// Serialize a request, naming the token ceiling field as the endpoint expects.
fn request_body(request: &CompletionRequest, max_tokens_field: &str) -> Result<Value, OcrError> {
    let mut body = serde_json::to_value(request).map_err(|e| OcrError::Encode(e.to_string()))?;
    if max_tokens_field != "max_output_tokens" {
        if let Some(obj) = body.as_object_mut() {
            if let Some(limit) = obj.remove("max_output_tokens") {
                obj.insert(max_tokens_field.to_string(), limit);
            }
        }
    }
    Ok(body)
}

/// Encode a bitmap in the given format.
pub fn encode_image(image: &RgbImage, encoding: ImageEncoding) -> Result<Vec<u8>, OcrError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), encoding.format())
        .map_err(|e| OcrError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Encode a bitmap and return it as base64 text.
pub fn encode_image_base64(image: &RgbImage, encoding: ImageEncoding) -> Result<String, OcrError> {
    let bytes = encode_image(image, encoding)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
}

/// Substitute the language hint into a prompt template.
///
/// Templates without a `{lang}` placeholder are returned unchanged.
pub fn render_prompt(template: &str, language: &str) -> String {
    if template.contains(LANGUAGE_PLACEHOLDER) {
        template.replace(LANGUAGE_PLACEHOLDER, language)
    } else {
        template.to_string()
    }
}

/// OCR backend prompting a multimodal model.
pub struct VisionModelBackend {
    config: VisionModelConfig,
    transport: Box<dyn CompletionTransport>,
}

impl VisionModelBackend {
    /// Create a backend talking to the configured endpoint over HTTP.
    pub fn new(config: VisionModelConfig) -> Result<Self, OcrError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    /// Resolve settings (explicit > `lookup` > defaults) and build the backend.
    ///
    /// Fails before any network activity when no credential is available.
    pub fn resolve<F>(explicit: &VisionConfig, lookup: F) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = VisionModelConfig::resolve(explicit, lookup)?;
        Ok(Self::new(config)?)
    }

    /// Resolve settings against the process environment and build the backend.
    pub fn from_env(explicit: &VisionConfig) -> Result<Self, ScanError> {
        Self::resolve(explicit, |key| std::env::var(key).ok())
    }

    /// Create a backend with a custom transport.
    pub fn with_transport(config: VisionModelConfig, transport: Box<dyn CompletionTransport>) -> Self {
        info!("Vision OCR backend ready (model: {}, endpoint: {})", config.model, config.base_url);
        Self { config, transport }
    }

    /// Resolved configuration.
    pub fn config(&self) -> &VisionModelConfig {
        &self.config
    }

    /// Build the request sent for one page.
    pub fn build_request(&self, image: &RgbImage, language: &str) -> Result<CompletionRequest, OcrError> {
        let encoded = encode_image_base64(image, self.config.image_format)?;
        let data_url = format!("data:{};base64,{}", self.config.image_format.mime_type(), encoded);

        let language = if language.trim().is_empty() { AUTO_LANGUAGE } else { language };
        let prompt = render_prompt(&self.config.prompt_template, language);

        Ok(CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(self.config.system_prompt.clone()),
                ChatMessage::user(vec![
                    ChatPart::Text { text: prompt },
                    ChatPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            ],
            max_output_tokens: self.config.max_output_tokens,
        })
    }

    fn try_extract(&self, image: &RgbImage, language: &str) -> Result<String, OcrError> {
        let request = self.build_request(image, language)?;
        let response = self.transport.complete(&request)?;
        Ok(normalize_response(&response))
    }
}

impl OcrBackend for VisionModelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vision
    }

    fn extract(&self, image: &RgbImage, language: &str) -> String {
        let start = Instant::now();

        match self.try_extract(image, language) {
            Ok(text) => {
                info!(
                    "Vision OCR complete: {} chars in {}ms",
                    text.len(),
                    start.elapsed().as_millis()
                );
                text
            }
            Err(e) => {
                warn!("Vision OCR failed (model: {}): {}", self.config.model, e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::DEFAULT_SYSTEM_PROMPT;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct FakeTransport {
        response: Result<Value, u16>,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl CompletionTransport for FakeTransport {
        fn complete(&self, request: &CompletionRequest) -> Result<Value, OcrError> {
            self.requests.lock().unwrap().push(request.clone());
            self.response.clone().map_err(|status| OcrError::Api {
                status,
                body: "upstream error".to_string(),
            })
        }
    }

    fn config() -> VisionModelConfig {
        VisionModelConfig::resolve(&VisionConfig::default(), |key| {
            (key == "SCANOCR_API_KEY").then(|| "sk-test".to_string())
        })
        .unwrap()
    }

    fn backend(response: Result<Value, u16>) -> (VisionModelBackend, Arc<Mutex<Vec<CompletionRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let transport = FakeTransport {
            response,
            requests: Arc::clone(&requests),
        };
        (VisionModelBackend::with_transport(config(), Box::new(transport)), requests)
    }

    fn reply(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(8, 6, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, 200]))
    }

    #[test]
    fn test_render_prompt_substitutes_language() {
        assert_eq!(render_prompt("Read this {lang} page", "zh-CN"), "Read this zh-CN page");
        assert_eq!(render_prompt("{lang}/{lang}", "en"), "en/en");
    }

    #[test]
    fn test_render_prompt_without_placeholder_is_verbatim() {
        let template = "Transcribe the page. Keep {braces} and {0} as-is.";
        assert_eq!(render_prompt(template, "en"), template);
    }

    #[test]
    fn test_base64_round_trip_preserves_image_bytes() {
        let image = sample_image();
        let png = encode_image(&image, ImageEncoding::Png).unwrap();
        let encoded = encode_image_base64(&image, ImageEncoding::Png).unwrap();

        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, png);

        let reloaded = image::load_from_memory(&decoded).unwrap().to_rgb8();
        assert_eq!(reloaded, image);
    }

    #[test]
    fn test_jpeg_encoding() {
        let jpeg = encode_image(&sample_image(), ImageEncoding::Jpeg).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_request_shape() {
        let (backend, _) = backend(Ok(reply("")));
        let request = backend.build_request(&sample_image(), "fr").unwrap();
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "qwen-vl-max");
        assert_eq!(body["max_output_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");

        let parts = &body["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[0]["text"].as_str().unwrap().contains("The expected language is: fr."));
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_blank_language_means_auto() {
        let (backend, _) = backend(Ok(reply("")));
        let request = backend.build_request(&sample_image(), "").unwrap();
        let ChatContent::Parts(parts) = &request.messages[1].content else {
            panic!("user message should carry parts");
        };
        let ChatPart::Text { text } = &parts[0] else {
            panic!("first part should be the prompt");
        };
        assert!(text.contains("The expected language is: auto."));
    }

    #[test]
    fn test_request_body_renames_token_field() {
        let (backend, _) = backend(Ok(reply("")));
        let request = backend.build_request(&sample_image(), "en").unwrap();

        let body = request_body(&request, "max_tokens").unwrap();
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("max_output_tokens").is_none());

        let body = request_body(&request, "max_output_tokens").unwrap();
        assert_eq!(body["max_output_tokens"], 4096);
    }

    #[test]
    fn test_default_wire_body_uses_max_tokens() {
        let (backend, _) = backend(Ok(reply("")));
        assert_eq!(backend.config().max_tokens_field, "max_tokens");

        let request = backend.build_request(&sample_image(), "en").unwrap();
        let body = request_body(&request, &backend.config().max_tokens_field).unwrap();
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("max_output_tokens").is_none());
    }

    #[test]
    fn test_extract_returns_trimmed_text() {
        let (backend, requests) = backend(Ok(reply("\n  Invoice No. 123\nTotal: $50  \n")));
        let text = backend.extract(&sample_image(), "en");

        assert_eq!(text, "Invoice No. 123\nTotal: $50");
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_api_error_yields_empty() {
        let (backend, requests) = backend(Err(500));
        assert_eq!(backend.extract(&sample_image(), "en"), "");
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_blocks() {
        let (backend, _) = backend(Ok(reply("Heading\n\nBody line one\nline two\n\n\n")));
        assert_eq!(
            backend.extract_blocks(&sample_image(), "en"),
            vec!["Heading", "Body line one\nline two"]
        );
    }

    #[test]
    fn test_missing_credential_fails_construction() {
        let result = VisionModelBackend::resolve(&VisionConfig::default(), |_| None);
        assert!(matches!(
            result,
            Err(ScanError::Config(crate::error::ConfigError::MissingCredential { .. }))
        ));
    }
}
