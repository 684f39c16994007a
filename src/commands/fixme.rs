use crate::commands::checks::has_quota;
use crate::commands::models::autocomplete_fixme_model;
use crate::commands::{generate_reply, moderate_input, prompt_modal};
use crate::llm::{ChatMessage, ChatRequest};
use crate::reply::{respond_modal_ephemeral, send_chunked_deferred};
use crate::security::validate_code_input;
use crate::{ApplicationContext, Error};
use tracing::info;

#[derive(Debug, poise::Modal)]
#[name = "Fix my code"]
struct CodeModal {
    #[name = "Code"]
    #[placeholder = "Paste the code you want reviewed and fixed"]
    #[paragraph]
    #[max_length = 4000]
    code: String,
}

/// Find and fix bugs in a piece of code
#[poise::command(slash_command, check = "has_quota")]
pub async fn fixme(
    ctx: ApplicationContext<'_>,
    #[description = "Model to use (defaults to the current provider)"]
    #[autocomplete = "autocomplete_fixme_model"]
    model: Option<String>,
) -> Result<(), Error> {
    let data = poise::Context::Application(ctx).data();
    let user_id = ctx.interaction.user.id.get();
    info!("User {} is executing /fixme", user_id);

    let Some((modal, submit)) = prompt_modal::<CodeModal>(ctx).await? else {
        return Ok(());
    };
    let serenity_ctx = ctx.serenity_context;

    if let Err(e) = validate_code_input(&modal.code) {
        respond_modal_ephemeral(serenity_ctx, &submit, format!("❌ {}", e)).await?;
        return Ok(());
    }

    submit.defer_ephemeral(serenity_ctx).await?;

    if let Some(refusal) = moderate_input(data, &modal.code, user_id, "fixme").await {
        send_chunked_deferred(serenity_ctx, &submit, &refusal.message(), 2000, true).await?;
        return Ok(());
    }

    let request = ChatRequest {
        model,
        system_prompt: data.instructions.resolve("fixme", user_id).await,
        messages: vec![ChatMessage::user(modal.code)],
        params: data.config.generation.into(),
    };

    let content = match generate_reply(data, user_id, &request).await {
        Ok(response) => response.content,
        Err(refusal) => refusal.message(),
    };
    send_chunked_deferred(
        serenity_ctx,
        &submit,
        &content,
        data.config.max_chars_per_message,
        true,
    )
    .await?;
    Ok(())
}
