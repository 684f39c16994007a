use crate::commands::checks::beta_only;
use crate::llm::Provider;
use crate::reply::say_ephemeral;
use crate::services::provider::ProviderSwitchError;
use crate::{Context, Error};
use tracing::info;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ProviderChoice {
    #[name = "OpenAI"]
    OpenAi,
    #[name = "Anthropic"]
    Anthropic,
    #[name = "Google Gemini"]
    Google,
}

impl From<ProviderChoice> for Provider {
    fn from(choice: ProviderChoice) -> Self {
        match choice {
            ProviderChoice::OpenAi => Provider::OpenAi,
            ProviderChoice::Anthropic => Provider::Anthropic,
            ProviderChoice::Google => Provider::Google,
        }
    }
}

/// Show or switch the AI provider used when no model is given
#[poise::command(slash_command, check = "beta_only")]
pub async fn provider(
    ctx: Context<'_>,
    #[description = "Provider to switch to"] target: Option<ProviderChoice>,
) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();

    let Some(target) = target.map(Provider::from) else {
        let current = data.providers.current();
        let available: Vec<String> = Provider::ALL
            .iter()
            .map(|p| {
                let mark = if data.llm.is_configured(*p) { "✅" } else { "❌" };
                format!("{} {}", mark, p.display_name())
            })
            .collect();
        say_ephemeral(
            ctx,
            format!(
                "Current provider: **{}**\n{}",
                current.display_name(),
                available.join("\n")
            ),
        )
        .await?;
        return Ok(());
    };

    info!("User {} is switching provider to {}", user_id, target);
    match data
        .providers
        .switch(target, data.llm.is_configured(target), user_id)
        .await
    {
        Ok(previous) if previous == target => {
            say_ephemeral(ctx, format!("Already using **{}**.", target.display_name())).await?;
        }
        Ok(previous) => {
            say_ephemeral(
                ctx,
                format!(
                    "✅ Switched provider from **{}** to **{}**.",
                    previous.display_name(),
                    target.display_name()
                ),
            )
            .await?;
        }
        Err(e @ ProviderSwitchError::NotConfigured(_)) => {
            say_ephemeral(ctx, format!("❌ {}", e)).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
