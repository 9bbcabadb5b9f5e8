//! Async LLM client for tutoring replies
//!
//! A model-agnostic HTTP client for chat-style LLM APIs. Speaks both the
//! Anthropic messages format and the OpenAI-compatible chat format
//! (DeepSeek, OpenAI, local servers). Callers cancel by dropping the future.

use std::time::Duration;

use crate::core::error::{LessonError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Upper bound on one completion round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

/// API format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

/// Speaker of one chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of the conversation sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Async LLM client for making API calls
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
    max_tokens: u32,
}

impl LlmClient {
    /// Create a new LLM client with explicit configuration
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            api_url,
            model,
            api_format,
            max_tokens: 1024,
        }
    }

    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }

    /// Create a client from environment variables
    ///
    /// Required: LLM_API_KEY
    /// Optional: LLM_API_URL (defaults to Anthropic API)
    /// Optional: LLM_MODEL (defaults to claude-3-haiku-20240307)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| LessonError::Llm("LLM_API_KEY not set".into()))?;
        let api_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".into());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "claude-3-haiku-20240307".into());

        Ok(Self::new(api_key, api_url, model))
    }

    /// Cap the reply length. Tutoring replies are a few paragraphs at most.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_format(&self) -> ApiFormat {
        self.api_format
    }

    /// Run one completion over a conversation.
    ///
    /// `turns` must end with a user turn. Returns the raw reply text, still
    /// carrying any control markers.
    pub async fn complete(&self, system: &str, turns: &[ChatTurn]) -> Result<String> {
        match self.api_format {
            ApiFormat::Anthropic => {
                let body = AnthropicRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    system,
                    messages: turns,
                };
                let request = self
                    .client
                    .post(&self.api_url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body);
                let response: AnthropicResponse = Self::send(request).await?;
                response.text()
            }
            ApiFormat::OpenAI => {
                let body = OpenAIRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    messages: openai_messages(system, turns),
                };
                let request = self
                    .client
                    .post(&self.api_url)
                    .bearer_auth(&self.api_key)
                    .json(&body);
                let response: OpenAIResponse = Self::send(request).await?;
                response.text()
            }
        }
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| LessonError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LessonError::Llm(format!("API error {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| LessonError::Llm(e.to_string()))
    }
}

/// OpenAI carries the system prompt as the first message.
fn openai_messages<'a>(system: &'a str, turns: &'a [ChatTurn]) -> Vec<OpenAIMessage<'a>> {
    std::iter::once(OpenAIMessage {
        role: "system",
        content: system,
    })
    .chain(turns.iter().map(|turn| OpenAIMessage {
        role: match turn.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        },
        content: &turn.content,
    }))
    .collect()
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicResponse {
    /// Replies may arrive split over several text blocks.
    fn text(self) -> Result<String> {
        let text: String = self.content.into_iter().map(|block| block.text).collect();
        if text.trim().is_empty() {
            return Err(LessonError::Llm("Empty response".into()));
        }
        Ok(text)
    }
}

// OpenAI-compatible API format
#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIResponse {
    fn text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LessonError::Llm("Empty response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = LlmClient::new(
            "test-key".into(),
            "https://api.example.com".into(),
            "test-model".into(),
        );
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.model(), "test-model");
        assert_eq!(client.api_format(), ApiFormat::OpenAI);
    }

    #[test]
    fn test_detects_anthropic_format() {
        let client = LlmClient::new(
            "k".into(),
            "https://api.anthropic.com/v1/messages".into(),
            "m".into(),
        )
        .with_max_tokens(256);
        assert_eq!(client.api_format(), ApiFormat::Anthropic);
        assert_eq!(client.max_tokens, 256);
    }

    #[test]
    fn test_anthropic_body_shape() {
        let turns = [ChatTurn::user("What is ATP?")];
        let body = AnthropicRequest {
            model: "m",
            max_tokens: 100,
            system: "Be brief.",
            messages: &turns,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "Be brief.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "What is ATP?");
    }

    #[test]
    fn test_openai_messages_lead_with_system() {
        let turns = [ChatTurn::user("Hi"), ChatTurn::assistant("Hello"), ChatTurn::user("Why?")];
        let messages = openai_messages("Tutor.", &turns);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "Tutor.");
    }

    #[test]
    fn test_anthropic_response_joins_blocks() {
        let parsed: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Hello "},{"type":"text","text":"there"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text().unwrap(), "Hello there");

        let empty: AnthropicResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(empty.text().is_err());
    }

    #[test]
    fn test_openai_null_content_is_empty() {
        let parsed: OpenAIResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.text().is_err());
    }
}
