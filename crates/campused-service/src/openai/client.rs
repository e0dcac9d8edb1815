//! OpenAI API client implementation.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use std::time::Duration;

use campused_core::{ChatMessage, Role};

use super::types::{
    ContentPart, InputContent, InputMessage, OpenAiErrorResponse, ResponsesRequest,
    ResponsesResponse, TextFormat, TextOptions,
};
use crate::llm::{Completion, LanguageModel, LlmError};

/// Instruction sent alongside every uploaded image.
pub const IMAGE_ANALYSIS_PROMPT: &str = "Analyze all details of this image, if it's photo of the document then transcribe it and if the diagram or anything than explain it.";

/// Model calls can take a while for long exams.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI API client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Create a new OpenAI client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API URL (e.g., `"https://api.openai.com/v1"`)
    /// * `api_key` - Secret API key
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Send one Responses API request.
    pub async fn create_response(
        &self,
        request: &ResponsesRequest,
    ) -> Result<Completion, LlmError> {
        let url = format!("{}/responses", self.base_url);

        tracing::debug!(
            model = %request.model,
            messages = request.input.len(),
            structured = request.text.is_some(),
            "Sending OpenAI request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let body: ResponsesResponse = Self::handle_response(response).await?;
        let usage = body
            .usage
            .ok_or_else(|| LlmError::InvalidResponse("response has no usage block".into()))?;

        Ok(Completion {
            text: body.output_text(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        })
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, LlmError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()));
        }

        // Try to parse error response
        let message = match response.json::<OpenAiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("HTTP {status}"),
        };

        Err(LlmError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// `data:` URL carrying `image` inline.
#[must_use]
pub fn image_data_url(image: &[u8], content_type: &str) -> String {
    format!("data:{content_type};base64,{}", BASE64.encode(image))
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn generate_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, LlmError> {
        let request = ResponsesRequest {
            model: model.to_string(),
            input: messages.iter().map(InputMessage::from).collect(),
            text: None,
        };
        self.create_response(&request).await
    }

    async fn analyze_image(
        &self,
        model: &str,
        image: &[u8],
        content_type: &str,
    ) -> Result<Completion, LlmError> {
        let request = ResponsesRequest {
            model: model.to_string(),
            input: vec![InputMessage {
                role: Role::User,
                content: InputContent::Parts(vec![
                    ContentPart::InputText {
                        text: IMAGE_ANALYSIS_PROMPT.to_string(),
                    },
                    ContentPart::InputImage {
                        image_url: image_data_url(image, content_type),
                    },
                ]),
            }],
            text: None,
        };
        self.create_response(&request).await
    }

    async fn generate_structured(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<Completion, LlmError> {
        let request = ResponsesRequest {
            model: model.to_string(),
            input: vec![
                InputMessage::text(Role::System, system_prompt),
                InputMessage::text(Role::User, user_prompt),
            ],
            text: Some(TextOptions {
                format: TextFormat::json_schema(schema_name, schema.clone()),
            }),
        };
        self.create_response(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(text: &str, input_tokens: u64, output_tokens: u64) -> serde_json::Value {
        json!({
            "id": "resp_1",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text}]
            }],
            "usage": {
                "input_tokens": input_tokens,
                "output_tokens": output_tokens,
                "total_tokens": input_tokens + output_tokens
            }
        })
    }

    #[test]
    fn data_url_keeps_content_type() {
        assert_eq!(
            image_data_url(b"png", "image/png"),
            "data:image/png;base64,cG5n"
        );
    }

    #[tokio::test]
    async fn chat_reports_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4.1-mini",
                "input": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "What is entropy?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Disorder.", 200, 100)))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "sk-test");
        let completion = client
            .generate_text(
                "gpt-4.1-mini",
                &[
                    ChatMessage::system("Be brief."),
                    ChatMessage::user("What is entropy?"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(completion.text, "Disorder.");
        assert_eq!(completion.input_tokens, 200);
        assert_eq!(completion.output_tokens, 100);
    }

    #[tokio::test]
    async fn structured_call_sends_json_schema_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(body_partial_json(json!({
                "text": {"format": {"type": "json_schema", "name": "flashcard_list", "strict": false}}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(reply(r#"{"questions":[]}"#, 50, 10)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "sk-test");
        let completion = client
            .generate_structured(
                "gpt-4o-mini",
                "system",
                "Generate the 1 number of the questions",
                "flashcard_list",
                &json!({"type": "object"}),
            )
            .await
            .unwrap();

        assert_eq!(completion.text, r#"{"questions":[]}"#);
    }

    #[tokio::test]
    async fn api_errors_carry_the_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached", "type": "rate_limit_error"}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "sk-test");
        let err = client
            .analyze_image("gpt-4.1-mini", b"img", "image/jpeg")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LlmError::Api { status: 429, ref message } if message == "Rate limit reached"
        ));
    }

    #[tokio::test]
    async fn missing_usage_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "sk-test");
        let err = client
            .generate_text("gpt-4.1-mini", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}
