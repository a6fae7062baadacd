//! Recovering generated text from chat-completion responses.
//!
//! OpenAI-compatible endpoints disagree on how `message.content` is shaped:
//! a plain string, a list of typed parts, or something else entirely. The
//! response is tried against an ordered list of strategies; the first one
//! that yields non-empty text wins.

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// JSON pointer to the first choice's message content.
const CONTENT_POINTER: &str = "/choices/0/message/content";

/// Known encodings of `message.content`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// `"content": "text"`
    Text(String),
    /// `"content": [ ...parts ]`
    Parts(Vec<ContentPart>),
}

/// One element of a list-valued content field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    /// A bare string element.
    Bare(String),
    /// `{"type": "text", "text": "..."}`
    Text { text: String },
    /// `{"text": {"value": "..."}}`
    NestedText { text: TextValue },
    /// `{"value": "..."}`
    Value { value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextValue {
    pub value: String,
}

impl ContentPart {
    pub fn as_str(&self) -> &str {
        match self {
            ContentPart::Bare(text) | ContentPart::Text { text } | ContentPart::Value { value: text } => text,
            ContentPart::NestedText { text } => &text.value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<MessageContent>,
}

type Strategy = fn(&Value) -> Option<String>;

/// Extraction attempts in priority order.
const STRATEGIES: [(&str, Strategy); 3] = [
    ("direct text", direct_text),
    ("content parts", content_parts),
    ("structural walk", structural_walk),
];

/// Recover the generated text from a completion response body.
///
/// Returns the trimmed text, or an empty string when no strategy succeeds.
pub fn normalize_response(response: &Value) -> String {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| {
            let text = strategy(response).filter(|t| !t.trim().is_empty());
            trace!("Response strategy {}: {}", name, if text.is_some() { "matched" } else { "no match" });
            text
        })
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn typed_content(response: &Value) -> Option<MessageContent> {
    let parsed = CompletionResponse::deserialize(response).ok()?;
    parsed.choices.into_iter().next()?.message.content
}

fn direct_text(response: &Value) -> Option<String> {
    match typed_content(response)? {
        MessageContent::Text(text) => Some(text),
        MessageContent::Parts(_) => None,
    }
}

fn content_parts(response: &Value) -> Option<String> {
    match typed_content(response)? {
        MessageContent::Parts(parts) => Some(join_fragments(parts.iter().map(ContentPart::as_str))),
        MessageContent::Text(_) => None,
    }
}

/// Walk the raw JSON at `choices[0].message.content`, tolerating parts the
/// typed decoders reject.
fn structural_walk(response: &Value) -> Option<String> {
    match response.pointer(CONTENT_POINTER)? {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(join_fragments(items.iter().filter_map(fragment))),
        other => fragment(other).map(str::to_string),
    }
}

/// Text carried by one loosely-shaped part.
fn fragment(item: &Value) -> Option<&str> {
    match item {
        Value::String(text) => Some(text),
        Value::Object(map) => map
            .get("text")
            .and_then(|t| t.as_str().or_else(|| t.get("value").and_then(Value::as_str)))
            .or_else(|| map.get("value").and_then(Value::as_str)),
        _ => None,
    }
}

fn join_fragments<'a>(fragments: impl Iterator<Item = &'a str>) -> String {
    fragments
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
