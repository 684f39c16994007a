use crate::commands::checks::has_quota;
use crate::commands::models::autocomplete_talk_model;
use crate::commands::{generate_reply, moderate_input};
use crate::llm::{ChatMessage, ChatRequest, GenerationParams};
use crate::reply::{say_ephemeral, send_chunked_to_channel};
use crate::security::validate_chat_message;
use crate::services::thread_session::TalkSession;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

const THREAD_NAME_CHARS: usize = 20;

/// Thread title built from the opening message.
pub fn thread_name(message: &str) -> String {
    let head: String = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(THREAD_NAME_CHARS)
        .collect();
    if head.is_empty() {
        ">> talk".to_string()
    } else {
        format!(">> {}", head)
    }
}

/// Start a threaded conversation with the AI
#[poise::command(slash_command, guild_only, check = "has_quota")]
pub async fn talk(
    ctx: Context<'_>,
    #[description = "Opening message"] message: String,
    #[description = "Model to use (defaults to the current provider)"]
    #[autocomplete = "autocomplete_talk_model"]
    model: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    info!("User {} ({}) is executing /talk", ctx.author().name, user_id);

    if let Err(e) = validate_chat_message(&message, data.config.max_chat_message_length) {
        say_ephemeral(ctx, format!("❌ {}", e)).await?;
        return Ok(());
    }

    ctx.defer().await?;

    if let Some(refusal) = moderate_input(data, &message, user_id, "talk").await {
        ctx.say(refusal.message()).await?;
        return Ok(());
    }

    let (provider, model) = data.llm.route(model.as_deref(), data.providers.current());
    let embed = serenity::CreateEmbed::new()
        .description(format!("<@{}> started the talk!", user_id))
        .field("Model", format!("`{}` ({})", model, provider.display_name()), true)
        .field("Message", truncate_field(&message), false)
        .color(0x5865F2);
    let handle = ctx.send(poise::CreateReply::default().embed(embed)).await?;
    let starter = handle.message().await?;

    let thread = ctx
        .channel_id()
        .create_thread_from_message(
            ctx.http(),
            starter.id,
            serenity::CreateThread::new(thread_name(&message))
                .auto_archive_duration(serenity::AutoArchiveDuration::OneHour),
        )
        .await?;
    let thread_id = thread.id.get();

    let params: GenerationParams = data.config.generation.into();
    let system_prompt = data.instructions.resolve("talk", user_id).await;
    data.sessions.create(
        thread_id,
        TalkSession::new(system_prompt.clone(), model.clone(), params, user_id),
    );
    data.sessions.push(thread_id, ChatMessage::user(message.clone()));

    let request = ChatRequest {
        model: Some(model),
        system_prompt,
        messages: vec![ChatMessage::user(message)],
        params,
    };

    let content = match generate_reply(data, user_id, &request).await {
        Ok(response) => {
            data.sessions
                .push(thread_id, ChatMessage::assistant(response.content.clone()));
            response.content
        }
        Err(refusal) => {
            warn!("Talk: opening reply failed in thread {}", thread_id);
            data.sessions.discard_unanswered(thread_id);
            refusal.message()
        }
    };
    send_chunked_to_channel(
        ctx.http(),
        thread.id,
        &content,
        data.config.max_chars_per_message,
    )
    .await?;
    Ok(())
}

/// Embed field values are capped at 1024 characters.
fn truncate_field(text: &str) -> String {
    const FIELD_LIMIT: usize = 1024;
    if text.chars().count() <= FIELD_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(FIELD_LIMIT - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_name() {
        assert_eq!(thread_name("hello"), ">> hello");
        assert_eq!(
            thread_name("tell me about   the history of rust"),
            ">> tell me about the hi"
        );
        assert_eq!(thread_name("   "), ">> talk");
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("short"), "short");
        let long = "a".repeat(2000);
        let cut = truncate_field(&long);
        assert_eq!(cut.chars().count(), 1024);
        assert!(cut.ends_with("..."));
    }
}
