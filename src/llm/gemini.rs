use super::{ChatProvider, ChatRequest, LlmError, Provider, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `generateContent` client for Gemini models.
pub struct GeminiChat {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiChat {
    pub fn new(api_key: &str, api_base: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiChat {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String, LlmError> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &request.system_prompt,
                }],
            },
            contents: request
                .messages
                .iter()
                .map(|m| Content {
                    role: Some(match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }),
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            generation_config: GenerationConfig {
                max_output_tokens: request.params.max_tokens,
                temperature: request.params.temperature,
                top_p: request.params.top_p,
            },
        };

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.api_base, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

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
            system_prompt: "Be kind.".to_string(),
            messages: vec![
                ChatMessage::user("ping"),
                ChatMessage::assistant("pong"),
                ChatMessage::user("again"),
            ],
            params: GenerationParams {
                max_tokens: 512,
                temperature: 0.5,
                top_p: 0.9,
            },
        }
    }

    #[tokio::test]
    async fn test_complete_maps_roles_and_config() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
            .match_header("x-goog-api-key", "g-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "Be kind."}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "ping"}]},
                    {"role": "model", "parts": [{"text": "pong"}]},
                    {"role": "user", "parts": [{"text": "again"}]}
                ],
                "generationConfig": {"maxOutputTokens": 512}
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pong "},{"text":"again"}]}}]}"#)
            .create_async()
            .await;

        let client = GeminiChat::new("g-test", &server.url(), reqwest::Client::new());
        let text = client.complete("gemini-2.5-flash", &request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, "pong again");
    }

    #[tokio::test]
    async fn test_complete_without_candidates_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let client = GeminiChat::new("g-test", &server.url(), reqwest::Client::new());
        let err = client.complete("gemini-2.5-flash", &request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
