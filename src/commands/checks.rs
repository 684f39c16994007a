//! Command checks. Each one answers the user itself before returning `Ok(false)`.

use crate::reply::say_ephemeral;
use crate::services::access::Access;
use crate::{Context, Error};
use tracing::info;

/// Blocked users are refused; admins pass; everyone else needs quota left today.
pub async fn has_quota(ctx: Context<'_>) -> Result<bool, Error> {
    let user_id = ctx.author().id.get();
    let access = ctx.data().access.check(user_id).await?;

    match access {
        Access::Admin | Access::Allowed { .. } => Ok(true),
        Access::Blocked => {
            info!("Refused {} for blocked user {}", ctx.command().name, user_id);
            say_ephemeral(ctx, "🚫 You are not allowed to use this bot.").await?;
            Ok(false)
        }
        Access::QuotaExceeded { limit } => {
            say_ephemeral(
                ctx,
                format!(
                    "⏳ You have used all {} requests for today. The limit resets at midnight.",
                    limit
                ),
            )
            .await?;
            Ok(false)
        }
    }
}

pub async fn beta_only(ctx: Context<'_>) -> Result<bool, Error> {
    let user_id = ctx.author().id.get();
    let access = &ctx.data().access;

    if access.is_blocked(user_id).await? {
        say_ephemeral(ctx, "🚫 You are not allowed to use this bot.").await?;
        return Ok(false);
    }
    if access.is_beta(user_id).await? {
        return Ok(true);
    }

    say_ephemeral(ctx, "🔒 This command is only available to beta users.").await?;
    Ok(false)
}

pub async fn admin_only(ctx: Context<'_>) -> Result<bool, Error> {
    let user_id = ctx.author().id.get();
    let access = &ctx.data().access;

    if access.is_blocked(user_id).await? {
        say_ephemeral(ctx, "🚫 You are not allowed to use this bot.").await?;
        return Ok(false);
    }
    if access.check_admin(user_id).await? {
        return Ok(true);
    }

    say_ephemeral(ctx, "🔒 This command is only available to admins.").await?;
    Ok(false)
}
