//! Markdown rendering of recognized document text.
//!
//! A local heuristic formatter is always available. When a completion
//! transport is configured the text is first handed to a chat model for
//! restructuring, and any failure falls back to the local formatter.

use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::{OcrError, Result};
use crate::models::config::VisionModelConfig;
use crate::models::page::PageResult;
use crate::ocr::{normalize_response, ChatMessage, ChatPart, CompletionRequest, CompletionTransport, HttpTransport};

/// Output for a document without any recognized text.
pub const EMPTY_DOCUMENT: &str = "# Document\n\n[No content]";

/// Top-level heading of locally formatted documents.
pub const DOCUMENT_HEADING: &str = "# Document Content";

/// Words that mark a line as a section heading, matched case-insensitively.
const TITLE_KEYWORDS: [&str; 14] = [
    "摘要",
    "引言",
    "方法",
    "结果",
    "讨论",
    "结论",
    "参考文献",
    "Abstract",
    "Introduction",
    "Method",
    "Result",
    "Discussion",
    "Conclusion",
    "Reference",
];

const MIN_TITLE_CHARS: usize = 3;
const MAX_TITLE_CHARS: usize = 100;
const MAX_UPPERCASE_TITLE_CHARS: usize = 50;

const FORMATTING_SYSTEM_PROMPT: &str = "You are a professional document editing and formatting assistant.";

const FORMATTING_INSTRUCTIONS: &str = "Convert the plain text document below into a well-structured Markdown document.

Follow these rules:
1. Organize the document with Markdown headings (#, ##, ###).
2. Format lists, key points and steps as unordered (-) or ordered (1., 2.) lists.
3. Use bold (**text**) or italics (*text*) for key terms where appropriate.
4. Keep a blank line between paragraphs.
5. Render tabular data as Markdown tables where possible.
6. Do not add information that is not in the original text. Only format and structure it.

Document:
---
";

/// Heuristic check for a section heading line.
///
/// A line of 3 to 100 characters is a heading when it contains a digit and a
/// period ("1. Scope"), is entirely uppercase and shorter than 50 characters,
/// or mentions one of the usual section keywords.
pub fn is_likely_title(line: &str) -> bool {
    let len = line.chars().count();
    if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) {
        return false;
    }

    if line.chars().any(char::is_numeric) && line.contains('.') {
        return true;
    }

    let has_upper = line.chars().any(char::is_uppercase);
    let has_lower = line.chars().any(char::is_lowercase);
    if has_upper && !has_lower && len < MAX_UPPERCASE_TITLE_CHARS {
        return true;
    }

    let lower = line.to_lowercase();
    TITLE_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(&keyword.to_lowercase()))
}

/// Format text as Markdown without a model.
///
/// Heading-like lines become `##` headings. Other consecutive lines are joined
/// into one paragraph, and blank lines end a paragraph.
pub fn simple_markdown(text: &str) -> String {
    if text.trim().is_empty() {
        return EMPTY_DOCUMENT.to_string();
    }

    let mut out: Vec<String> = vec![DOCUMENT_HEADING.to_string(), String::new()];
    let mut paragraph = String::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            continue;
        }

        if is_likely_title(line) {
            flush_paragraph(&mut out, &mut paragraph);
            out.push(format!("## {}", line));
            out.push(String::new());
        } else {
            if !paragraph.is_empty() {
                paragraph.push(' ');
            }
            paragraph.push_str(line);
        }
    }
    flush_paragraph(&mut out, &mut paragraph);

    out.join("\n").trim_end().to_string()
}

fn flush_paragraph(out: &mut Vec<String>, paragraph: &mut String) {
    if !paragraph.is_empty() {
        out.push(std::mem::take(paragraph));
        out.push(String::new());
    }
}

/// Recognized text of every page with content, pages separated by a blank line.
pub fn document_text(pages: &[PageResult]) -> String {
    pages
        .iter()
        .filter(|page| !page.is_empty())
        .map(|page| page.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Write Markdown to a file.
pub fn save_markdown(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)?;
    info!("Markdown saved to {}", path.display());
    Ok(())
}

/// Turns recognized text into Markdown, optionally with a chat model.
pub struct MarkdownGenerator {
    model: String,
    max_output_tokens: u32,
    transport: Option<Box<dyn CompletionTransport>>,
}

impl Default for MarkdownGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownGenerator {
    /// Local formatting only.
    pub fn new() -> Self {
        Self {
            model: String::new(),
            max_output_tokens: 0,
            transport: None,
        }
    }

    /// Restructure with the chat model of a resolved vision configuration.
    pub fn from_config(config: &VisionModelConfig) -> std::result::Result<Self, OcrError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(
            config.model.clone(),
            config.max_output_tokens,
            Box::new(transport),
        ))
    }

    /// Restructure with a custom transport.
    pub fn with_transport(
        model: impl Into<String>,
        max_output_tokens: u32,
        transport: Box<dyn CompletionTransport>,
    ) -> Self {
        Self {
            model: model.into(),
            max_output_tokens,
            transport: Some(transport),
        }
    }

    /// Whether a chat model is configured.
    pub fn uses_model(&self) -> bool {
        self.transport.is_some()
    }

    /// Request sent to the chat model for `text`.
    pub fn build_request(&self, text: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(FORMATTING_SYSTEM_PROMPT),
                ChatMessage::user(vec![ChatPart::Text {
                    text: format!("{}{}\n---", FORMATTING_INSTRUCTIONS, text),
                }]),
            ],
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Render `text` as Markdown. Never fails.
    pub fn generate(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return EMPTY_DOCUMENT.to_string();
        }

        let Some(transport) = &self.transport else {
            return simple_markdown(text);
        };

        let start = Instant::now();
        match transport.complete(&self.build_request(text)) {
            Ok(response) => {
                let markdown = normalize_response(&response);
                if markdown.is_empty() {
                    warn!("Model returned no Markdown, using local formatting");
                    return simple_markdown(text);
                }
                info!(
                    "Markdown generated by {} in {}ms",
                    self.model,
                    start.elapsed().as_millis()
                );
                markdown
            }
            Err(e) => {
                warn!("Markdown generation failed ({}), using local formatting", e);
                simple_markdown(text)
            }
        }
    }
}
