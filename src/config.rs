use crate::llm::Provider;
use chrono_tz::Tz;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// A selectable model offered to a slash command, parsed from `id:Display Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub id: String,
    pub name: String,
}

/// Generation parameters applied when a command does not override them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub bot_name: String,
    pub bot_id: Option<u64>,
    pub admin_user_ids: Vec<u64>,
    pub database_url: String,

    // Provider credentials and endpoints
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_base: String,
    pub anthropic_api_base: String,
    pub gemini_api_base: String,
    pub default_provider: Provider,

    // Models
    pub openai_model: String,
    pub anthropic_model: String,
    pub gemini_model: String,
    pub chat_models: Vec<ModelChoice>,
    pub fixme_models: Vec<ModelChoice>,
    pub talk_models: Vec<ModelChoice>,
    pub generation: GenerationDefaults,

    // Limits
    pub max_chars_per_message: usize,
    pub max_chat_message_length: usize,
    pub daily_usage_limit: i64,
    pub timezone: Tz,

    // Instructions
    pub instruction_dir: PathBuf,
    pub static_instructions_path: PathBuf,

    // Moderation
    pub moderation_fail_closed: bool,
    pub moderation_block_threshold: i64,

    pub llm_timeout_secs: u64,
}

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let timezone_name = env::var("TIMEZONE").unwrap_or_else(|_| "Asia/Tokyo".to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("TIMEZONE '{}' is not a valid IANA zone: {}", timezone_name, e))?;

        let default_provider = match env::var("DEFAULT_PROVIDER") {
            Ok(name) => name
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_PROVIDER must be one of: openai, anthropic, google"))?,
            Err(_) => Provider::OpenAi,
        };

        Ok(Config {
            discord_token: env::var("DISCORD_BOT_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_BOT_TOKEN must be set"))?,
            bot_name: env::var("BOT_NAME").unwrap_or_else(|_| "aibot".to_string()),
            bot_id: env::var("BOT_ID").ok().and_then(|id| id.parse().ok()),
            admin_user_ids: parse_id_list(&env::var("ADMIN_USER_IDS").unwrap_or_default()),
            database_url: env::var("DB_NAME").unwrap_or_else(|_| "aibot.db".to_string()),

            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            gemini_api_key: non_empty_var("GEMINI_API_KEY").or_else(|| non_empty_var("GOOGLE_API_KEY")),
            openai_api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_OPENAI_API_BASE.to_string()),
            anthropic_api_base: env::var("ANTHROPIC_API_BASE")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_API_BASE.to_string()),
            gemini_api_base: env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_GEMINI_API_BASE.to_string()),
            default_provider,

            openai_model: non_empty_var("DEFAULT_OPENAI_MODEL")
                .or_else(|| non_empty_var("OPENAI_MODEL"))
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            anthropic_model: non_empty_var("DEFAULT_ANTHROPIC_MODEL")
                .or_else(|| non_empty_var("ANTHROPIC_MODEL"))
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            gemini_model: non_empty_var("DEFAULT_GEMINI_MODEL")
                .or_else(|| non_empty_var("GEMINI_MODEL"))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            chat_models: parse_models(&env::var("CHAT_MODELS").unwrap_or_default()),
            fixme_models: parse_models(&env::var("FIXME_MODELS").unwrap_or_default()),
            talk_models: parse_models(&env::var("TALK_MODELS").unwrap_or_default()),
            generation: GenerationDefaults {
                max_tokens: env::var("DEFAULT_MAX_TOKENS")
                    .unwrap_or_else(|_| "4096".to_string())
                    .parse()
                    .unwrap_or(4096),
                temperature: env::var("DEFAULT_TEMPERATURE")
                    .unwrap_or_else(|_| "0.62".to_string())
                    .parse()
                    .unwrap_or(0.62),
                top_p: env::var("DEFAULT_TOP_P")
                    .unwrap_or_else(|_| "0.96".to_string())
                    .parse()
                    .unwrap_or(0.96),
            },

            max_chars_per_message: env::var("MAX_CHARS_PER_MESSAGE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            max_chat_message_length: env::var("MAX_CHAT_MESSAGE_LENGTH")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            daily_usage_limit: env::var("DAILY_USAGE_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            timezone,

            instruction_dir: env::var("INSTRUCTION_DIR")
                .unwrap_or_else(|_| "resources/gen".to_string())
                .into(),
            static_instructions_path: env::var("STATIC_INSTRUCTIONS_PATH")
                .unwrap_or_else(|_| "resources/instructions.toml".to_string())
                .into(),

            moderation_fail_closed: env::var("MODERATION_FAIL_CLOSED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            moderation_block_threshold: env::var("MODERATION_BLOCK_THRESHOLD")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),

            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
        })
    }

    pub fn api_key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::Google => self.gemini_api_key.as_deref(),
        }
    }

    pub fn default_model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.openai_model,
            Provider::Anthropic => &self.anthropic_model,
            Provider::Google => &self.gemini_model,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma separated list of Discord IDs, skipping anything that is not a number.
pub fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

/// Parse `model-id:Display Name,model-id2:Display Name 2`.
/// Entries without a `:` are ignored.
pub fn parse_models(raw: &str) -> Vec<ModelChoice> {
    raw.split(',')
        .filter_map(|entry| {
            let (id, name) = entry.trim().split_once(':')?;
            let (id, name) = (id.trim(), name.trim());
            if id.is_empty() || name.is_empty() {
                return None;
            }
            Some(ModelChoice {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("bot_name", &self.bot_name)
            .field("bot_id", &self.bot_id)
            .field("admin_user_ids", &self.admin_user_ids)
            .field("database_url", &self.database_url)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openai_api_base", &self.openai_api_base)
            .field("anthropic_api_base", &self.anthropic_api_base)
            .field("gemini_api_base", &self.gemini_api_base)
            .field("default_provider", &self.default_provider)
            .field("openai_model", &self.openai_model)
            .field("anthropic_model", &self.anthropic_model)
            .field("gemini_model", &self.gemini_model)
            .field("chat_models", &self.chat_models)
            .field("fixme_models", &self.fixme_models)
            .field("talk_models", &self.talk_models)
            .field("generation", &self.generation)
            .field("max_chars_per_message", &self.max_chars_per_message)
            .field("max_chat_message_length", &self.max_chat_message_length)
            .field("daily_usage_limit", &self.daily_usage_limit)
            .field("timezone", &self.timezone)
            .field("instruction_dir", &self.instruction_dir)
            .field("static_instructions_path", &self.static_instructions_path)
            .field("moderation_fail_closed", &self.moderation_fail_closed)
            .field(
                "moderation_block_threshold",
                &self.moderation_block_threshold,
            )
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .finish()
    }
}

/// Discord rejects message content above 2000 characters regardless of our own limit
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Config with in-memory database and no provider keys, shared by unit tests.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        discord_token: "test".to_string(),
        bot_name: "aibot".to_string(),
        bot_id: None,
        admin_user_ids: vec![1],
        database_url: ":memory:".to_string(),
        openai_api_key: None,
        anthropic_api_key: None,
        gemini_api_key: None,
        openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
        anthropic_api_base: DEFAULT_ANTHROPIC_API_BASE.to_string(),
        gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
        default_provider: Provider::OpenAi,
        openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
        gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        chat_models: Vec::new(),
        fixme_models: Vec::new(),
        talk_models: Vec::new(),
        generation: GenerationDefaults {
            max_tokens: 4096,
            temperature: 0.62,
            top_p: 0.96,
        },
        max_chars_per_message: 1000,
        max_chat_message_length: 2000,
        daily_usage_limit: 5,
        timezone: chrono_tz::Asia::Tokyo,
        instruction_dir: PathBuf::from("resources/gen"),
        static_instructions_path: PathBuf::from("resources/instructions.toml"),
        moderation_fail_closed: false,
        moderation_block_threshold: 3,
        llm_timeout_secs: 120,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Missing token
        env::remove_var("DISCORD_BOT_TOKEN");
        let result = Config::build();
        assert!(result.is_err(), "Should fail when DISCORD_BOT_TOKEN is missing");

        // 2. Defaults
        env::set_var("DISCORD_BOT_TOKEN", "test_token");
        env::set_var("ADMIN_USER_IDS", "10, 20,abc");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.admin_user_ids, vec![10, 20]);
        assert_eq!(config.timezone, chrono_tz::Asia::Tokyo);

        // 3. Debug redaction
        env::set_var("OPENAI_API_KEY", "secret_api_key");
        let config_redacted = Config::build().unwrap();
        let debug_output = format!("{:?}", config_redacted);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_api_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_BOT_TOKEN");
        env::remove_var("ADMIN_USER_IDS");
        env::remove_var("OPENAI_API_KEY");
    }

    #[test]
    fn test_parse_models() {
        let models = parse_models("gpt-4.1:GPT 4.1, claude-sonnet-4-20250514:Claude Sonnet 4,broken,:x");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "gpt-4.1");
        assert_eq!(models[0].name, "GPT 4.1");
        assert_eq!(models[1].name, "Claude Sonnet 4");

        assert!(parse_models("").is_empty());
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list(""), Vec::<u64>::new());
        assert_eq!(parse_id_list("123,456"), vec![123, 456]);
    }
}
