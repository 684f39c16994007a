use aibot::cli::{init_logging, parse_log_level, Cli};
use aibot::llm::openai::OpenAiModerator;
use aibot::services::access::AccessGate;
use aibot::services::instruction::{InstructionService, InstructionStore, StaticInstructions};
use aibot::services::moderation::{ModerationService, Moderator};
use aibot::services::provider::ProviderManager;
use aibot::services::scheduler::Scheduler;
use aibot::services::thread_session::ThreadSessionStore;
use aibot::{commands, config::Config, db::Database, llm::LlmRouter, talk, Data, Error};
use clap::Parser;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in /{}: {}", ctx.command().qualified_name, error);
            let reply = poise::CreateReply::default()
                .content("❌ Something went wrong while running this command.")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                warn!("Failed to report command error: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(parse_log_level(&cli.log)?);

    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();
    info!("Starting {} (default provider {})", config.bot_name, config.default_provider);

    let db = Database::new(&config)?;
    db.execute_init()?;

    let llm = LlmRouter::new(&config)?;

    let moderator: Option<Arc<dyn Moderator>> = match &config.openai_api_key {
        Some(key) => {
            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.llm_timeout_secs))
                .build()?;
            Some(Arc::new(OpenAiModerator::new(key, &config.openai_api_base, http)))
        }
        None => None,
    };
    let moderation = ModerationService::new(
        db.clone(),
        moderator,
        config.moderation_fail_closed,
        config.moderation_block_threshold,
    );
    let access = AccessGate::new(db.clone(), &config.admin_user_ids, config.daily_usage_limit);

    let statics = StaticInstructions::load(&config.static_instructions_path)?;
    let store = InstructionStore::new(config.instruction_dir.clone(), config.timezone);
    let instructions = InstructionService::new(db.clone(), store, statics);

    let providers = ProviderManager::load(db.clone(), config.default_provider).await;
    let sessions = Arc::new(ThreadSessionStore::default());

    let data = Data {
        config,
        db,
        llm,
        providers,
        instructions,
        moderation,
        access,
        sessions,
    };

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        if let Err(e) = talk::handle_thread_message(ctx, new_message, data).await {
                            error!("Talk: failed to answer in {}: {}", new_message.channel_id, e);
                        }
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                if let Some(expected) = data.config.bot_id {
                    if expected != ready.user.id.get() {
                        warn!(
                            "BOT_ID {} does not match the logged in user {}",
                            expected, ready.user.id
                        );
                    }
                }
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                Scheduler::new(data.db.clone(), data.sessions.clone()).spawn();
                Ok(data)
            })
        })
        .build();

    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Client error: {}", e))?;

    Ok(())
}
