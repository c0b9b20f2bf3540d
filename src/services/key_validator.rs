use crate::services::key_store::KeyStore;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    /// Unknown, inactive and expired keys are deliberately indistinguishable.
    #[error("invalid or expired API key")]
    Unauthorized,

    #[error("key lookup failed: {0}")]
    Lookup(#[from] anyhow::Error),
}

/// Resolves an API key to the owning account. Read-only.
#[derive(Clone)]
pub struct KeyValidator {
    store: Arc<dyn KeyStore>,
}

impl KeyValidator {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    pub async fn validate(&self, api_key: &str) -> Result<String, KeyError> {
        if api_key.is_empty() {
            return Err(KeyError::Unauthorized);
        }

        match self.store.find_key(api_key).await? {
            Some(key) if key.id == api_key && key.is_usable_at(Utc::now()) => Ok(key.owner_id),
            _ => Err(KeyError::Unauthorized),
        }
    }
}
