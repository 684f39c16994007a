use super::{ChatProvider, ChatRequest, LlmError, Provider, Role};
use crate::services::moderation::{ModerationVerdict, Moderator};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;

pub const MODERATION_MODEL: &str = "omni-moderation-latest";

pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
}

impl OpenAiChat {
    pub fn new(api_key: &str, api_base: &str, http: reqwest::Client) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            client: Client::with_config(config).with_http_client(http),
        }
    }
}

/// Reasoning models only accept the default sampling parameters.
fn is_reasoning_model(model: &str) -> bool {
    let model = model.to_lowercase();
    ["o1", "o3", "o4"].iter().any(|p| model.starts_with(p))
}

pub(crate) fn build_messages(
    request: &ChatRequest,
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.clone())
            .build()?
            .into(),
    ];

    for message in &request.messages {
        let message: ChatCompletionRequestMessage = match message.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
        };
        messages.push(message);
    }

    Ok(messages)
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model)
            .messages(build_messages(request)?)
            .max_completion_tokens(request.params.max_tokens);
        if !is_reasoning_model(model) {
            args.temperature(request.params.temperature)
                .top_p(request.params.top_p);
        }

        let response = self.client.chat().create(args.build()?).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Client for the `/moderations` endpoint.
pub struct OpenAiModerator {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Value,
}

impl OpenAiModerator {
    pub fn new(api_key: &str, api_base: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Moderator for OpenAiModerator {
    async fn classify(&self, content: &str) -> Result<ModerationVerdict, LlmError> {
        let response = self
            .http
            .post(format!("{}/moderations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": MODERATION_MODEL,
                "input": content,
            }))
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: ModerationResponse = serde_json::from_str(&raw).map_err(|e| LlmError::Api {
            status: status.as_u16(),
            body: format!("unparseable moderation response: {}", e),
        })?;
        let result = parsed.results.into_iter().next().ok_or(LlmError::EmptyResponse)?;

        Ok(ModerationVerdict {
            flagged: result.flagged,
            categories: result.categories,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, GenerationParams};

    #[test]
    fn test_build_messages_keeps_order() {
        let request = ChatRequest {
            model: None,
            system_prompt: "sys".to_string(),
            messages: vec![
                ChatMessage::user("one"),
                ChatMessage::assistant("two"),
                ChatMessage::user("three"),
            ],
            params: GenerationParams {
                max_tokens: 10,
                temperature: 0.1,
                top_p: 1.0,
            },
        };
        let messages = build_messages(&request).unwrap();
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_reasoning_models() {
        assert!(is_reasoning_model("o3-mini"));
        assert!(!is_reasoning_model("gpt-4.1"));
    }

    #[tokio::test]
    async fn test_moderator_parses_flagged_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/moderations")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(r#"{"id":"modr-1","results":[{"flagged":true,"categories":{"violence":true,"hate":false}}]}"#)
            .create_async()
            .await;

        let moderator = OpenAiModerator::new("sk-test", &server.url(), reqwest::Client::new());
        let verdict = moderator.classify("something nasty").await.unwrap();

        mock.assert_async().await;
        assert!(verdict.flagged);
        assert_eq!(verdict.categories["violence"], serde_json::json!(true));
        assert!(verdict.raw.contains("modr-1"));
    }

    #[tokio::test]
    async fn test_moderator_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/moderations")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let moderator = OpenAiModerator::new("sk-test", &server.url(), reqwest::Client::new());
        let err = moderator.classify("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 500, .. }));
    }
}
