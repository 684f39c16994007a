use crate::commands::checks::has_quota;
use crate::commands::models::autocomplete_chat_model;
use crate::commands::{generate_reply, moderate_input};
use crate::llm::{ChatMessage, ChatRequest};
use crate::reply::{say_ephemeral, send_chunked};
use crate::security::validate_chat_message;
use crate::{Context, Error};
use tracing::info;

/// Single-turn chat with the AI
#[poise::command(slash_command, check = "has_quota")]
pub async fn chat(
    ctx: Context<'_>,
    #[description = "Your message to the AI"] message: String,
    #[description = "Model to use (defaults to the current provider)"]
    #[autocomplete = "autocomplete_chat_model"]
    model: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    info!("User {} ({}) is executing /chat", ctx.author().name, user_id);

    if let Err(e) = validate_chat_message(&message, data.config.max_chat_message_length) {
        say_ephemeral(ctx, format!("❌ {}", e)).await?;
        return Ok(());
    }

    ctx.defer().await?;

    if let Some(refusal) = moderate_input(data, &message, user_id, "chat").await {
        ctx.say(refusal.message()).await?;
        return Ok(());
    }

    let request = ChatRequest {
        model,
        system_prompt: data.instructions.resolve("chat", user_id).await,
        messages: vec![ChatMessage::user(message)],
        params: data.config.generation.into(),
    };

    match generate_reply(data, user_id, &request).await {
        Ok(response) => {
            send_chunked(ctx, &response.content, data.config.max_chars_per_message).await?;
        }
        Err(refusal) => {
            ctx.say(refusal.message()).await?;
        }
    }
    Ok(())
}
