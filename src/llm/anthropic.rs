use super::{ChatProvider, ChatRequest, LlmError, Provider, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client.
pub struct AnthropicChat {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    // Newer Claude models reject temperature and top_p set together
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

impl AnthropicChat {
    pub fn new(api_key: &str, api_base: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicChat {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model,
            max_tokens: request.params.max_tokens,
            system: &request.system_prompt,
            messages: request
                .messages
                .iter()
                .map(|m| Message {
                    role: match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
            temperature: request.params.temperature.clamp(0.0, 1.0),
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, GenerationParams};
    use mockito::Matcher;

    fn request() -> ChatRequest {
        ChatRequest {
            model: None,
            system_prompt: "You are terse.".to_string(),
            messages: vec![ChatMessage::user("hello")],
            params: GenerationParams {
                max_tokens: 256,
                temperature: 0.62,
                top_p: 0.96,
            },
        }
    }

    #[tokio::test]
    async fn test_complete_joins_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "ak-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "system": "You are terse.",
                "max_tokens": 256,
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"Hi"},{"type":"text","text":" there"}]}"#)
            .create_async()
            .await;

        let client = AnthropicChat::new("ak-test", &server.url(), reqwest::Client::new());
        let text = client
            .complete("claude-sonnet-4-20250514", &request())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn test_complete_reports_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"error":{"type":"authentication_error"}}"#)
            .create_async()
            .await;

        let client = AnthropicChat::new("bad", &server.url(), reqwest::Client::new());
        let err = client.complete("claude-x", &request()).await.unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("authentication_error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
