//! OpenAI Responses API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use campused_core::{ChatMessage, Role};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /responses`.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    /// Model name.
    pub model: String,
    /// Input messages.
    pub input: Vec<InputMessage>,
    /// Output format, for structured calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOptions>,
}

/// One input message.
#[derive(Debug, Clone, Serialize)]
pub struct InputMessage {
    /// `system`, `user` or `assistant`.
    pub role: Role,
    /// Plain text or typed content parts.
    pub content: InputContent,
}

impl InputMessage {
    /// A plain text message.
    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: InputContent::Text(content.into()),
        }
    }
}

impl From<&ChatMessage> for InputMessage {
    fn from(message: &ChatMessage) -> Self {
        Self::text(message.role, message.content.clone())
    }
}

/// Message content.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InputContent {
    /// Plain text.
    Text(String),
    /// Typed parts (text and images).
    Parts(Vec<ContentPart>),
}

/// A typed content part.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text.
    InputText {
        /// The text.
        text: String,
    },
    /// An image given as a URL (here always a `data:` URL).
    InputImage {
        /// Image URL.
        image_url: String,
    },
}

/// `text` options of a request.
#[derive(Debug, Clone, Serialize)]
pub struct TextOptions {
    /// Output format.
    pub format: TextFormat,
}

/// JSON schema output format.
#[derive(Debug, Clone, Serialize)]
pub struct TextFormat {
    /// Always `json_schema`.
    #[serde(rename = "type")]
    pub format_type: &'static str,
    /// Schema name.
    pub name: String,
    /// The schema.
    pub schema: Value,
    /// Whether the provider enforces the schema strictly.
    pub strict: bool,
}

impl TextFormat {
    /// A non-strict JSON schema format.
    #[must_use]
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            format_type: "json_schema",
            name: name.into(),
            schema,
            strict: false,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Body returned by `POST /responses`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesResponse {
    /// Output items.
    #[serde(default)]
    pub output: Vec<OutputItem>,
    /// Token usage.
    pub usage: Option<ResponseUsage>,
}

impl ResponsesResponse {
    /// Concatenated `output_text` parts of every output item.
    #[must_use]
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|part| part.content_type == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

/// One output item.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    /// Item type (`message`, `reasoning`, ...).
    #[serde(rename = "type", default)]
    pub item_type: String,
    /// Content parts.
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

/// One output content part.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputContent {
    /// Part type.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text, for `output_text` parts.
    pub text: Option<String>,
}

/// Token usage of a response.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResponseUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

/// Error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorResponse {
    /// Error details.
    pub error: OpenAiErrorBody,
}

/// Error details.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorBody {
    /// Message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_text_skips_non_text_parts() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Hello "},
                    {"type": "refusal", "refusal": "no"},
                    {"type": "output_text", "text": "there"}
                ]}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3, "total_tokens": 15}
        }))
        .unwrap();

        assert_eq!(response.output_text(), "Hello there");
        assert_eq!(response.usage.unwrap().input_tokens, 12);
    }

    #[test]
    fn image_parts_serialize_with_type_tags() {
        let message = InputMessage {
            role: Role::User,
            content: InputContent::Parts(vec![
                ContentPart::InputText { text: "look".into() },
                ContentPart::InputImage {
                    image_url: "data:image/png;base64,AAAA".into(),
                },
            ]),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "input_text");
        assert_eq!(value["content"][1]["type"], "input_image");
        assert_eq!(value["content"][1]["image_url"], "data:image/png;base64,AAAA");
    }
}
