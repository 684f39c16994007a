use crate::config::ModelChoice;
use crate::Context;
use poise::serenity_prelude as serenity;

/// Discord shows at most 25 autocomplete entries.
const MAX_CHOICES: usize = 25;

pub fn matching_models<'a>(models: &'a [ModelChoice], partial: &str) -> Vec<&'a ModelChoice> {
    let partial = partial.trim().to_lowercase();
    models
        .iter()
        .filter(|m| {
            partial.is_empty()
                || m.id.to_lowercase().contains(&partial)
                || m.name.to_lowercase().contains(&partial)
        })
        .take(MAX_CHOICES)
        .collect()
}

fn choices(models: &[ModelChoice], partial: &str) -> std::vec::IntoIter<serenity::AutocompleteChoice> {
    matching_models(models, partial)
        .into_iter()
        .map(|m| serenity::AutocompleteChoice::new(m.name.clone(), m.id.clone()))
        .collect::<Vec<_>>()
        .into_iter()
}

pub async fn autocomplete_chat_model(
    ctx: Context<'_>,
    partial: &str,
) -> std::vec::IntoIter<serenity::AutocompleteChoice> {
    choices(&ctx.data().config.chat_models, partial)
}

pub async fn autocomplete_fixme_model(
    ctx: Context<'_>,
    partial: &str,
) -> std::vec::IntoIter<serenity::AutocompleteChoice> {
    choices(&ctx.data().config.fixme_models, partial)
}

pub async fn autocomplete_talk_model(
    ctx: Context<'_>,
    partial: &str,
) -> std::vec::IntoIter<serenity::AutocompleteChoice> {
    choices(&ctx.data().config.talk_models, partial)
}
