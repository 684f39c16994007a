//! Provider routing and the vendor-neutral chat types shared by every adapter.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::config::{Config, GenerationDefaults};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Google];

    /// Name stored in the `system` table and accepted from `DEFAULT_PROVIDER`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Google => "Google Gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "google" | "gemini" => Ok(Provider::Google),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Model-name prefixes that pin a request to a vendor regardless of the current provider.
pub const MODEL_PREFIXES: &[(&str, Provider)] = &[
    ("gpt", Provider::OpenAi),
    ("chatgpt", Provider::OpenAi),
    ("o1", Provider::OpenAi),
    ("o3", Provider::OpenAi),
    ("o4", Provider::OpenAi),
    ("claude", Provider::Anthropic),
    ("gemini", Provider::Google),
];

pub fn provider_for_model(model: &str) -> Option<Provider> {
    let model = model.trim().to_lowercase();
    MODEL_PREFIXES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, provider)| *provider)
}

/// A known prefix wins; anything else is served by `current`.
pub fn select_provider(model: Option<&str>, current: Provider) -> Provider {
    model
        .filter(|m| !m.trim().is_empty())
        .and_then(provider_for_model)
        .unwrap_or(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<GenerationDefaults> for GenerationParams {
    fn from(defaults: GenerationDefaults) -> Self {
        Self {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Explicit model; `None` means the routed provider's default model.
    pub model: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub provider: Provider,
    pub model: String,
    pub content: String,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{} is not configured (missing API key)", .0.display_name())]
    NotConfigured(Provider),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Provider returned an empty response")]
    EmptyResponse,
}

/// One vendor's chat completion endpoint.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Holds one adapter per configured vendor and dispatches requests to them.
pub struct LlmRouter {
    adapters: HashMap<Provider, Arc<dyn ChatProvider>>,
    default_models: HashMap<Provider, String>,
}

impl LlmRouter {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        let mut adapters: Vec<Arc<dyn ChatProvider>> = Vec::new();
        if let Some(key) = &config.openai_api_key {
            adapters.push(Arc::new(openai::OpenAiChat::new(
                key,
                &config.openai_api_base,
                http.clone(),
            )));
        }
        if let Some(key) = &config.anthropic_api_key {
            adapters.push(Arc::new(anthropic::AnthropicChat::new(
                key,
                &config.anthropic_api_base,
                http.clone(),
            )));
        }
        if let Some(key) = &config.gemini_api_key {
            adapters.push(Arc::new(gemini::GeminiChat::new(
                key,
                &config.gemini_api_base,
                http.clone(),
            )));
        }

        for provider in Provider::ALL {
            if config.api_key_for(provider).is_none() {
                warn!("LLM: {} has no API key; requests routed to it will be refused", provider.display_name());
            }
        }

        let default_models = Provider::ALL
            .into_iter()
            .map(|p| (p, config.default_model_for(p).to_string()))
            .collect();

        Ok(Self::with_adapters(adapters, default_models))
    }

    pub fn with_adapters(
        adapters: Vec<Arc<dyn ChatProvider>>,
        default_models: HashMap<Provider, String>,
    ) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.provider(), a)).collect(),
            default_models,
        }
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Provider and concrete model name a request would be served by.
    pub fn route(&self, model: Option<&str>, current: Provider) -> (Provider, String) {
        let provider = select_provider(model, current);
        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None => self.default_models.get(&provider).cloned().unwrap_or_default(),
        };
        (provider, model)
    }

    pub async fn generate(
        &self,
        request: &ChatRequest,
        current: Provider,
    ) -> Result<ChatResponse, LlmError> {
        let (provider, model) = self.route(request.model.as_deref(), current);
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or(LlmError::NotConfigured(provider))?;

        debug!(
            "LLM: {} request with model {} ({} messages)",
            provider,
            model,
            request.messages.len()
        );
        let content = adapter.complete(&model, request).await?;
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        info!("LLM: {} ({}) returned {} chars", provider, model, content.chars().count());

        Ok(ChatResponse {
            provider,
            model,
            content,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Adapter that echoes the model it was asked to use.
    pub(crate) struct EchoProvider(pub Provider);

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn provider(&self) -> Provider {
            self.0
        }

        async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String, LlmError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(format!("{}:{}:{}", self.0, model, last))
        }
    }

    pub(crate) fn echo_router() -> LlmRouter {
        let adapters: Vec<Arc<dyn ChatProvider>> = Provider::ALL
            .into_iter()
            .map(|p| Arc::new(EchoProvider(p)) as Arc<dyn ChatProvider>)
            .collect();
        LlmRouter::with_adapters(adapters, default_models())
    }

    fn default_models() -> HashMap<Provider, String> {
        HashMap::from([
            (Provider::OpenAi, "gpt-4.1-mini".to_string()),
            (Provider::Anthropic, "claude-sonnet-4-20250514".to_string()),
            (Provider::Google, "gemini-2.5-flash".to_string()),
        ])
    }

    fn request(model: Option<&str>) -> ChatRequest {
        ChatRequest {
            model: model.map(String::from),
            system_prompt: "be brief".to_string(),
            messages: vec![ChatMessage::user("hi")],
            params: GenerationParams {
                max_tokens: 100,
                temperature: 0.5,
                top_p: 1.0,
            },
        }
    }

    #[test]
    fn test_select_provider_prefix_overrides_current() {
        assert_eq!(
            select_provider(Some("gpt-4.1-2025-04-14"), Provider::Anthropic),
            Provider::OpenAi
        );
        assert_eq!(select_provider(Some("claude-3-5-haiku"), Provider::OpenAi), Provider::Anthropic);
        assert_eq!(select_provider(Some("Gemini-2.5-pro"), Provider::OpenAi), Provider::Google);
        assert_eq!(select_provider(Some("o3-mini"), Provider::Google), Provider::OpenAi);
    }

    #[test]
    fn test_select_provider_falls_back_to_current() {
        assert_eq!(select_provider(None, Provider::Anthropic), Provider::Anthropic);
        assert_eq!(select_provider(Some("  "), Provider::Google), Provider::Google);
        assert_eq!(select_provider(Some("mistral-large"), Provider::Google), Provider::Google);
    }

    #[test]
    fn test_provider_parse_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Google);
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[tokio::test]
    async fn test_generate_routes_by_model_prefix() {
        let router = echo_router();
        let response = router
            .generate(&request(Some("gpt-4.1-2025-04-14")), Provider::Anthropic)
            .await
            .unwrap();
        assert_eq!(response.provider, Provider::OpenAi);
        assert_eq!(response.model, "gpt-4.1-2025-04-14");
        assert_eq!(response.content, "openai:gpt-4.1-2025-04-14:hi");
    }

    #[tokio::test]
    async fn test_generate_uses_default_model_of_current_provider() {
        let router = echo_router();
        let response = router.generate(&request(None), Provider::Google).await.unwrap();
        assert_eq!(response.provider, Provider::Google);
        assert_eq!(response.model, "gemini-2.5-flash");

        // Unknown prefixes keep the requested name
        let (provider, model) = router.route(Some("mistral-large"), Provider::Anthropic);
        assert_eq!(provider, Provider::Anthropic);
        assert_eq!(model, "mistral-large");
    }

    #[tokio::test]
    async fn test_generate_unconfigured_provider() {
        let router = LlmRouter::with_adapters(
            vec![Arc::new(EchoProvider(Provider::OpenAi))],
            default_models(),
        );
        assert!(router.is_configured(Provider::OpenAi));
        assert!(!router.is_configured(Provider::Anthropic));

        let err = router
            .generate(&request(Some("claude-sonnet-4-20250514")), Provider::OpenAi)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(Provider::Anthropic)));
    }
}
