use crate::commands::checks::admin_only;
use crate::reply::say_ephemeral;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Show a user's daily limit and today's usage
#[poise::command(slash_command, check = "admin_only")]
pub async fn limit(
    ctx: Context<'_>,
    #[description = "User to inspect (omit for the default limit)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let access = &ctx.data().access;

    let Some(user) = user else {
        let default = access.default_limit().await?;
        say_ephemeral(ctx, format!("Default daily limit: **{}** requests.", default)).await?;
        return Ok(());
    };

    let target = user.id.get();
    let message = if access.is_admin(target) {
        format!("<@{}> is an admin and is not metered.", target)
    } else {
        let limit = access.limit_for(target).await?;
        let used = access.usage_today(target).await?;
        format!(
            "<@{}> has used **{}/{}** requests today.",
            target, used, limit
        )
    };
    say_ephemeral(ctx, message).await?;
    Ok(())
}

/// Set the daily request limit for a user or for everyone
#[poise::command(slash_command, rename = "set-limit", check = "admin_only")]
pub async fn set_limit(
    ctx: Context<'_>,
    #[description = "Requests per day"]
    #[min = 0]
    limit: i64,
    #[description = "User to override (omit to change the default)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    if limit < 0 {
        say_ephemeral(ctx, "❌ The limit cannot be negative.").await?;
        return Ok(());
    }

    let target = user.as_ref().map(|u| u.id.get());
    ctx.data().access.set_limit(target, limit).await?;
    info!(
        "Admin {} set daily limit {} for {:?}",
        ctx.author().id,
        limit,
        target
    );

    let message = match target {
        Some(id) => format!("✅ Daily limit for <@{}> set to **{}**.", id, limit),
        None => format!("✅ Default daily limit set to **{}**.", limit),
    };
    say_ephemeral(ctx, message).await?;
    Ok(())
}
