pub mod chat;
pub mod checks;
pub mod fixme;
pub mod instruction;
pub mod limit;
pub mod models;
pub mod permission;
pub mod provider;
pub mod talk;

use crate::llm::{ChatRequest, ChatResponse, LlmError};
use crate::{ApplicationContext, Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long a user has to fill in a modal.
const MODAL_TIMEOUT: Duration = Duration::from_secs(600);

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        chat::chat(),
        fixme::fixme(),
        talk::talk(),
        provider::provider(),
        instruction::create(),
        instruction::list(),
        instruction::activate(),
        instruction::reset(),
        instruction::lock(),
        instruction::unlock(),
        permission::add_pm(),
        permission::ck_pm(),
        permission::rm_pm(),
        limit::limit(),
        limit::set_limit(),
    ]
}

/// Why an AI request was not answered, phrased for the user.
#[derive(Debug)]
pub enum Refusal {
    Flagged { escalated: bool },
    Unavailable(String),
    Failed,
}

impl Refusal {
    pub fn message(&self) -> String {
        match self {
            Refusal::Flagged { escalated: false } => {
                "🚫 Your input was rejected by the moderation system.".to_string()
            }
            Refusal::Flagged { escalated: true } => {
                "🚫 Your input was rejected by the moderation system. Repeated violations have blocked your access.".to_string()
            }
            Refusal::Unavailable(provider) => {
                format!("⚠️ {} is not available right now. Ask an admin to configure it.", provider)
            }
            Refusal::Failed => "❌ Failed to get a response from the AI service.".to_string(),
        }
    }
}

/// Run moderation on user input; `Some` means the request must stop here.
pub async fn moderate_input(
    data: &Data,
    content: &str,
    user_id: u64,
    request_type: &str,
) -> Option<Refusal> {
    let decision = data.moderation.moderate(content, user_id, request_type).await;
    decision.flagged.then_some(Refusal::Flagged {
        escalated: decision.escalated,
    })
}

/// Send `request` to the routed provider and count the call on success.
pub async fn generate_reply(
    data: &Data,
    user_id: u64,
    request: &ChatRequest,
) -> Result<ChatResponse, Refusal> {
    let current = data.providers.current();
    let response = match data.llm.generate(request, current).await {
        Ok(response) => response,
        Err(LlmError::NotConfigured(provider)) => {
            warn!("AI request from {} routed to unconfigured {}", user_id, provider);
            return Err(Refusal::Unavailable(provider.display_name().to_string()));
        }
        Err(e) => {
            error!("AI request from {} failed: {}", user_id, e);
            return Err(Refusal::Failed);
        }
    };

    if let Err(e) = data.access.record_call(user_id).await {
        error!("Failed to record usage for {}: {}", user_id, e);
    }
    Ok(response)
}

/// Show modal `M` as the interaction response and wait for its submission.
///
/// The submit interaction is returned unanswered; the caller must respond to it
/// (usually with a defer) within three seconds.
pub async fn prompt_modal<M: poise::Modal>(
    ctx: ApplicationContext<'_>,
) -> Result<Option<(M, serenity::ModalInteraction)>, Error> {
    let user_id = ctx.interaction.user.id;
    let custom_id = ctx.interaction.id.to_string();
    ctx.interaction
        .create_response(ctx.serenity_context, M::create(None, custom_id.clone()))
        .await?;
    ctx.has_sent_initial_response.store(true, Ordering::SeqCst);

    let submit = serenity::ModalInteractionCollector::new(ctx.serenity_context)
        .author_id(user_id)
        .filter(move |m| m.data.custom_id == custom_id)
        .timeout(MODAL_TIMEOUT)
        .await;

    let Some(submit) = submit else {
        debug!("Modal for {} timed out", user_id);
        return Ok(None);
    };
    let modal = M::parse(submit.data.clone())?;
    Ok(Some((modal, submit)))
}
