//! Content moderation in front of every provider call.
//!
//! Failure policy: when the moderation endpoint cannot be reached the request is allowed
//! (fail-open) unless `MODERATION_FAIL_CLOSED=true`. Either way the check is logged with
//! outcome `error`.

use crate::db::{Database, NewModerationLog, Permission};
use crate::llm::LlmError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Window used to count past flags for automatic blocking.
pub const ESCALATION_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub categories: serde_json::Value,
    pub raw: String,
}

/// A content classifier, normally the OpenAI moderation endpoint.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn classify(&self, content: &str) -> Result<ModerationVerdict, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    Flagged,
    Clean,
    Error,
}

impl ModerationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationOutcome::Flagged => "flagged",
            ModerationOutcome::Clean => "clean",
            ModerationOutcome::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationDecision {
    /// Whether the request must be rejected.
    pub flagged: bool,
    pub outcome: ModerationOutcome,
    /// The user was blocked as a result of this check.
    pub escalated: bool,
}

/// First 16 hex chars of the SHA-256 of `content`; raw content is never stored.
pub fn content_hash(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub struct ModerationService {
    db: Database,
    moderator: Option<Arc<dyn Moderator>>,
    fail_closed: bool,
    block_threshold: i64,
}

impl ModerationService {
    pub fn new(
        db: Database,
        moderator: Option<Arc<dyn Moderator>>,
        fail_closed: bool,
        block_threshold: i64,
    ) -> Self {
        if moderator.is_none() {
            warn!(
                "Moderation: no moderator configured, requests will be {}",
                if fail_closed { "rejected" } else { "allowed unchecked" }
            );
        }
        Self {
            db,
            moderator,
            fail_closed,
            block_threshold,
        }
    }

    pub async fn moderate(
        &self,
        content: &str,
        user_id: u64,
        request_type: &str,
    ) -> ModerationDecision {
        let result = match &self.moderator {
            Some(moderator) => moderator.classify(content).await,
            None => Err(LlmError::NotConfigured(crate::llm::Provider::OpenAi)),
        };

        let (outcome, categories, raw) = match result {
            Ok(verdict) if verdict.flagged => (
                ModerationOutcome::Flagged,
                verdict.categories.to_string(),
                verdict.raw,
            ),
            Ok(verdict) => (
                ModerationOutcome::Clean,
                verdict.categories.to_string(),
                verdict.raw,
            ),
            Err(e) => {
                error!("Moderation: check failed for user {}: {}", user_id, e);
                (ModerationOutcome::Error, "{}".to_string(), e.to_string())
            }
        };

        let flagged = match outcome {
            ModerationOutcome::Flagged => true,
            ModerationOutcome::Clean => false,
            ModerationOutcome::Error => self.fail_closed,
        };

        let entry = NewModerationLog {
            user_id,
            request_type: request_type.to_string(),
            content_hash: content_hash(content),
            flagged,
            outcome: outcome.as_str().to_string(),
            categories,
            raw_response: raw,
        };
        if let Err(e) = self.db.run_blocking(move |db| db.log_moderation(&entry)).await {
            error!("Moderation: failed to write log row: {}", e);
        }

        let mut escalated = false;
        if outcome == ModerationOutcome::Flagged {
            warn!(
                "Moderation: content flagged for user {}, type {}",
                user_id, request_type
            );
            escalated = self.escalate(user_id).await;
        }

        ModerationDecision {
            flagged,
            outcome,
            escalated,
        }
    }

    /// Block the user once their recent flag count reaches the threshold.
    async fn escalate(&self, user_id: u64) -> bool {
        if self.block_threshold <= 0 {
            return false;
        }
        let threshold = self.block_threshold;
        let result = self
            .db
            .run_blocking(move |db| {
                let flags = db.count_recent_flags(user_id, ESCALATION_WINDOW_DAYS)?;
                if flags < threshold {
                    return Ok(None);
                }
                let granted = db.grant_permission(user_id, Permission::Blocked, None)?;
                Ok(Some((flags, granted)))
            })
            .await;

        match result {
            Ok(Some((flags, true))) => {
                info!(
                    "Moderation: user {} blocked after {} flags in {} days",
                    user_id, flags, ESCALATION_WINDOW_DAYS
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                error!("Moderation: escalation check failed for {}: {}", user_id, e);
                false
            }
        }
    }

    pub async fn recent_flags(&self, user_id: u64, days: i64) -> i64 {
        self.db
            .run_blocking(move |db| db.count_recent_flags(user_id, days))
            .await
            .unwrap_or_else(|e| {
                error!("Moderation: failed to count flags for {}: {}", user_id, e);
                0
            })
    }
}
