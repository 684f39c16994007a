use crate::commands::checks::{admin_only, beta_only};
use crate::commands::{moderate_input, prompt_modal};
use crate::reply::{respond_modal_ephemeral, say_ephemeral, send_chunked_deferred};
use crate::services::instruction::InstructionError;
use crate::{ApplicationContext, Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

#[derive(Debug, poise::Modal)]
#[name = "Create an instruction"]
struct InstructionModal {
    #[name = "Name"]
    #[placeholder = "A short label, e.g. Pirate tutor"]
    #[max_length = 50]
    name: String,
    #[name = "Instruction"]
    #[placeholder = "How should the AI behave?"]
    #[paragraph]
    #[max_length = 1024]
    instruction: String,
}

/// Custom instructions are frozen for everyone but admins while the lock is on.
async fn refuse_if_locked(ctx: Context<'_>) -> Result<bool, Error> {
    let data = ctx.data();
    if data.access.is_admin(ctx.author().id.get()) {
        return Ok(false);
    }
    if data.instructions.is_locked().await? {
        say_ephemeral(
            ctx,
            "🔒 Custom instructions are locked by an admin. The default instruction is in use.",
        )
        .await?;
        return Ok(true);
    }
    Ok(false)
}

/// Create a custom system instruction and make it active
#[poise::command(slash_command, check = "beta_only")]
pub async fn create(ctx: ApplicationContext<'_>) -> Result<(), Error> {
    let poise_ctx = poise::Context::Application(ctx);
    let data = poise_ctx.data();
    let user_id = ctx.interaction.user.id.get();
    info!("User {} is executing /create", user_id);

    if refuse_if_locked(poise_ctx).await? {
        return Ok(());
    }

    let Some((modal, submit)) = prompt_modal::<InstructionModal>(ctx).await? else {
        return Ok(());
    };
    let serenity_ctx = ctx.serenity_context;

    let name = modal.name.trim();
    if name.is_empty() {
        respond_modal_ephemeral(serenity_ctx, &submit, "❌ The name cannot be empty.").await?;
        return Ok(());
    }

    submit.defer_ephemeral(serenity_ctx).await?;

    let screened = format!("{}\n{}", name, modal.instruction);
    if let Some(refusal) = moderate_input(data, &screened, user_id, "instruction").await {
        send_chunked_deferred(serenity_ctx, &submit, &refusal.message(), 2000, true).await?;
        return Ok(());
    }

    let reply = match data.instructions.create(user_id, name, &modal.instruction).await {
        Ok(id) => format!("✅ Instruction **{}** saved as #{} and activated.", name, id),
        Err(InstructionError::Validation(e)) => format!("❌ {}", e),
        Err(e) => {
            error!("Failed to create instruction for {}: {}", user_id, e);
            "❌ Failed to save the instruction.".to_string()
        }
    };
    send_chunked_deferred(serenity_ctx, &submit, &reply, 2000, true).await?;
    Ok(())
}

/// List your custom instructions
#[poise::command(slash_command, check = "beta_only")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    let instructions = data.instructions.list(user_id).await?;

    if instructions.is_empty() {
        say_ephemeral(ctx, "You have no custom instructions yet. Use `/create` to add one.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("📜 Your Instructions")
        .color(0x5865F2);
    for item in &instructions {
        let marker = if item.is_active { " ✅" } else { "" };
        embed = embed.field(
            format!("#{} {}{}", item.id, item.name, marker),
            format!("`{}`\n{}", item.preview, item.created_at),
            false,
        );
    }
    if data.instructions.is_locked().await? {
        embed = embed.footer(serenity::CreateEmbedFooter::new(
            "Locked: the default instruction is in use",
        ));
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Activate one of your stored instructions
#[poise::command(slash_command, check = "beta_only")]
pub async fn activate(
    ctx: Context<'_>,
    #[description = "Instruction ID from /list"] id: i64,
) -> Result<(), Error> {
    if refuse_if_locked(ctx).await? {
        return Ok(());
    }
    let user_id = ctx.author().id.get();

    match ctx.data().instructions.activate(user_id, id).await {
        Ok(record) => {
            say_ephemeral(ctx, format!("✅ Activated **{}** (#{}).", record.name, record.id))
                .await?;
        }
        Err(InstructionError::NotFound) => {
            say_ephemeral(ctx, format!("❌ You have no instruction #{}.", id)).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Go back to the default instruction
#[poise::command(slash_command, check = "beta_only")]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    if refuse_if_locked(ctx).await? {
        return Ok(());
    }
    let count = ctx.data().instructions.reset(ctx.author().id.get()).await?;
    let message = if count == 0 {
        "You were already using the default instruction."
    } else {
        "✅ Reset to the default instruction."
    };
    say_ephemeral(ctx, message).await?;
    Ok(())
}

/// Force the default instruction for everyone
#[poise::command(slash_command, check = "admin_only")]
pub async fn lock(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().instructions.lock(ctx.author().id.get()).await?;
    say_ephemeral(ctx, "🔒 Instructions locked. Every command now uses its default instruction.")
        .await?;
    Ok(())
}

/// Allow custom instructions again
#[poise::command(slash_command, check = "admin_only")]
pub async fn unlock(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().instructions.unlock(ctx.author().id.get()).await?;
    say_ephemeral(ctx, "🔓 Instructions unlocked. Active custom instructions apply again.").await?;
    Ok(())
}
