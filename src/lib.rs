pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod reply;
pub mod security;
pub mod services;
pub mod talk;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub llm: llm::LlmRouter,
    pub providers: services::provider::ProviderManager,
    pub instructions: services::instruction::InstructionService,
    pub moderation: services::moderation::ModerationService,
    pub access: services::access::AccessGate,
    pub sessions: std::sync::Arc<services::thread_session::ThreadSessionStore>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type ApplicationContext<'a> = poise::ApplicationContext<'a, Data, Error>;
