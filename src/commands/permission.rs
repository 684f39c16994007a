use crate::commands::checks::admin_only;
use crate::db::Permission;
use crate::reply::say_ephemeral;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PermissionChoice {
    #[name = "beta"]
    Beta,
    #[name = "blocked"]
    Blocked,
}

impl From<PermissionChoice> for Permission {
    fn from(choice: PermissionChoice) -> Self {
        match choice {
            PermissionChoice::Beta => Permission::Beta,
            PermissionChoice::Blocked => Permission::Blocked,
        }
    }
}

/// Grant a permission to a user
#[poise::command(slash_command, rename = "add-pm", check = "admin_only")]
pub async fn add_pm(
    ctx: Context<'_>,
    #[description = "User to grant"] user: serenity::User,
    #[description = "Permission"] permission: PermissionChoice,
) -> Result<(), Error> {
    let permission = Permission::from(permission);
    let admin_id = ctx.author().id.get();
    let target = user.id.get();

    let added = ctx
        .data()
        .db
        .run_blocking(move |db| db.grant_permission(target, permission, Some(admin_id)))
        .await?;

    let message = if added {
        info!("Admin {} granted {} to {}", admin_id, permission, target);
        format!("✅ Granted `{}` to <@{}>.", permission, target)
    } else {
        format!("<@{}> already has `{}`.", target, permission)
    };
    say_ephemeral(ctx, message).await?;
    Ok(())
}

/// Show a user's permissions
#[poise::command(slash_command, rename = "ck-pm", check = "admin_only")]
pub async fn ck_pm(
    ctx: Context<'_>,
    #[description = "User to inspect"] user: serenity::User,
) -> Result<(), Error> {
    let target = user.id.get();
    let permissions = ctx
        .data()
        .db
        .run_blocking(move |db| db.list_permissions(target))
        .await?;

    let mut lines: Vec<String> = permissions.iter().map(|p| format!("`{}`", p)).collect();
    if ctx.data().access.is_admin(target) {
        lines.push("`admin` (configured)".to_string());
    }

    let message = if lines.is_empty() {
        format!("<@{}> has no permissions.", target)
    } else {
        format!("Permissions of <@{}>: {}", target, lines.join(", "))
    };
    say_ephemeral(ctx, message).await?;
    Ok(())
}

/// Revoke a permission from a user
#[poise::command(slash_command, rename = "rm-pm", check = "admin_only")]
pub async fn rm_pm(
    ctx: Context<'_>,
    #[description = "User to revoke from"] user: serenity::User,
    #[description = "Permission"] permission: PermissionChoice,
) -> Result<(), Error> {
    let permission = Permission::from(permission);
    let target = user.id.get();

    let removed = ctx
        .data()
        .db
        .run_blocking(move |db| db.revoke_permission(target, permission))
        .await?;

    let message = if removed {
        info!(
            "Admin {} revoked {} from {}",
            ctx.author().id,
            permission,
            target
        );
        format!("✅ Revoked `{}` from <@{}>.", permission, target)
    } else {
        format!("<@{}> does not have `{}`.", target, permission)
    };
    say_ephemeral(ctx, message).await?;
    Ok(())
}
