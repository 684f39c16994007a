//! Follow-up messages posted inside a `/talk` thread.

use crate::commands::{generate_reply, moderate_input};
use crate::llm::{ChatMessage, ChatRequest};
use crate::reply::send_chunked_to_channel;
use crate::security::validate_chat_message;
use crate::services::access::Access;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, info};

pub async fn handle_thread_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.author.bot || msg.content.trim().is_empty() {
        return Ok(());
    }
    let thread_id = msg.channel_id.get();
    if data.sessions.get(thread_id).is_none() {
        return Ok(());
    }

    let user_id = msg.author.id.get();
    debug!("Talk: message from {} in thread {}", user_id, thread_id);

    match data.access.check(user_id).await? {
        Access::Admin | Access::Allowed { .. } => {}
        Access::Blocked => {
            msg.reply(ctx, "🚫 You are not allowed to use this bot.").await?;
            return Ok(());
        }
        Access::QuotaExceeded { limit } => {
            msg.reply(
                ctx,
                format!("⏳ You have used all {} requests for today.", limit),
            )
            .await?;
            return Ok(());
        }
    }

    if let Err(e) = validate_chat_message(&msg.content, data.config.max_chat_message_length) {
        msg.reply(ctx, format!("❌ {}", e)).await?;
        return Ok(());
    }

    if let Some(refusal) = moderate_input(data, &msg.content, user_id, "talk").await {
        msg.reply(ctx, refusal.message()).await?;
        return Ok(());
    }

    if !data.sessions.push(thread_id, ChatMessage::user(msg.content.clone())) {
        info!("Talk: session {} ended before the reply", thread_id);
        return Ok(());
    }
    let Some(session) = data.sessions.get(thread_id) else {
        return Ok(());
    };

    let typing = msg.channel_id.start_typing(&ctx.http);
    let request = ChatRequest {
        model: Some(session.model.clone()),
        system_prompt: session.system_prompt.clone(),
        messages: session.history.clone(),
        params: session.params,
    };
    let result = generate_reply(data, user_id, &request).await;
    typing.stop();

    let content = match result {
        Ok(response) => {
            data.sessions
                .push(thread_id, ChatMessage::assistant(response.content.clone()));
            response.content
        }
        Err(refusal) => {
            data.sessions.discard_unanswered(thread_id);
            refusal.message()
        }
    };
    send_chunked_to_channel(
        &ctx.http,
        msg.channel_id,
        &content,
        data.config.max_chars_per_message,
    )
    .await
}
