use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::debug;

/// Split `content` into chunks of at most `max_chars` characters,
/// breaking on a newline or space near the end of each chunk when one exists.
pub fn split_message(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.clamp(1, DISCORD_MESSAGE_LIMIT);
    let mut chunks = Vec::new();
    let mut rest = content.trim();

    while !rest.is_empty() {
        if rest.chars().count() <= max_chars {
            chunks.push(rest.to_string());
            break;
        }

        // Byte index of the first char past the limit
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..hard_end];

        // Only take a soft break from the second half, otherwise chunks get tiny
        let min_soft = window.len() / 2;
        let end = window
            .rfind('\n')
            .filter(|&i| i > min_soft)
            .or_else(|| window.rfind(' ').filter(|&i| i > min_soft))
            .unwrap_or(hard_end);

        let chunk = rest[..end].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = rest[end..].trim_start();
    }

    chunks
}

/// Reply to an interaction, splitting long content over several messages.
pub async fn send_chunked(
    ctx: Context<'_>,
    content: &str,
    max_chars: usize,
) -> Result<(), Error> {
    let chunks = split_message(content, max_chars);
    debug!("Reply: sending {} chunk(s)", chunks.len());
    for chunk in chunks {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Post into a channel or thread outside of an interaction.
pub async fn send_chunked_to_channel(
    http: &serenity::Http,
    channel_id: serenity::ChannelId,
    content: &str,
    max_chars: usize,
) -> Result<(), Error> {
    for chunk in split_message(content, max_chars) {
        channel_id.say(http, chunk).await?;
    }
    Ok(())
}

/// Answer a not-yet-acknowledged modal submission with an ephemeral message.
pub async fn respond_modal_ephemeral(
    ctx: &serenity::Context,
    submit: &serenity::ModalInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    let message = serenity::CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(true);
    submit
        .create_response(ctx, serenity::CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

/// Fill a deferred modal response: the first chunk replaces the "thinking" placeholder,
/// the rest go out as followups.
pub async fn send_chunked_deferred(
    ctx: &serenity::Context,
    submit: &serenity::ModalInteraction,
    content: &str,
    max_chars: usize,
    ephemeral: bool,
) -> Result<(), Error> {
    let mut chunks = split_message(content, max_chars).into_iter();
    let first = chunks.next().unwrap_or_default();
    submit
        .edit_response(ctx, serenity::EditInteractionResponse::new().content(first))
        .await?;

    for chunk in chunks {
        submit
            .create_followup(
                ctx,
                serenity::CreateInteractionResponseFollowup::new()
                    .content(chunk)
                    .ephemeral(ephemeral),
            )
            .await?;
    }
    Ok(())
}

/// Ephemeral notice visible only to the invoking user.
pub async fn say_ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_single_chunk() {
        assert_eq!(split_message("hello", 1000), vec!["hello"]);
        assert!(split_message("   ", 1000).is_empty());
    }

    #[test]
    fn test_split_prefers_newlines() {
        let content = format!("{}\n{}", "a".repeat(8), "b".repeat(8));
        let chunks = split_message(&content, 12);
        assert_eq!(chunks, vec!["a".repeat(8), "b".repeat(8)]);
    }

    #[test]
    fn test_split_hard_cut_without_whitespace() {
        let chunks = split_message(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), "x".repeat(25));
    }

    #[test]
    fn test_split_is_char_safe() {
        let content = "日本語".repeat(10);
        let chunks = split_message(&content, 7);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_limit_clamped_to_discord_max() {
        let chunks = split_message(&"y".repeat(4500), 10_000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), DISCORD_MESSAGE_LIMIT);
    }
}
