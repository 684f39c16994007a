use crate::db::Database;
use crate::error::DbError;
use crate::llm::Provider;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{info, warn};

/// `system` table key holding the current provider.
pub const CURRENT_PROVIDER_KEY: &str = "current_provider";

#[derive(Error, Debug)]
pub enum ProviderSwitchError {
    #[error("{} has no API key configured", .0.display_name())]
    NotConfigured(Provider),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Process-wide "current provider" used when a request names no model.
pub struct ProviderManager {
    db: Database,
    current: RwLock<Provider>,
}

impl ProviderManager {
    /// A persisted choice from a previous run wins over `fallback`.
    pub async fn load(db: Database, fallback: Provider) -> Self {
        let stored = db
            .run_blocking(|db| db.get_setting(CURRENT_PROVIDER_KEY))
            .await;

        let current = match stored {
            Ok(Some(value)) => match value.parse::<Provider>() {
                Ok(provider) => provider,
                Err(e) => {
                    warn!("Provider: ignoring stored value '{}': {}", value, e);
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                warn!("Provider: failed to read stored provider, using {}: {}", fallback, e);
                fallback
            }
        };
        info!("Provider: current provider is {}", current);

        Self {
            db,
            current: RwLock::new(current),
        }
    }

    pub fn current(&self) -> Provider {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Change the current provider. `is_configured` must confirm the target has a key.
    pub async fn switch(
        &self,
        target: Provider,
        is_configured: bool,
        changed_by: u64,
    ) -> Result<Provider, ProviderSwitchError> {
        if !is_configured {
            return Err(ProviderSwitchError::NotConfigured(target));
        }

        self.db
            .run_blocking(move |db| {
                db.set_setting(CURRENT_PROVIDER_KEY, target.as_str(), Some(changed_by))
            })
            .await?;

        let previous = {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *guard, target)
        };
        info!(
            "Provider: switched from {} to {} by user {}",
            previous, target, changed_by
        );
        Ok(previous)
    }
}
