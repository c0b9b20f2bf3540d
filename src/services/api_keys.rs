use crate::models::{ApiKey, KeyStatus};
use crate::services::key_store::KeyStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Key management for an authenticated owner: generate, toggle and list.
pub struct ApiKeyService {
    store: Arc<dyn KeyStore>,
    ttl: Duration,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn KeyStore>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl: Duration::days(ttl_days),
        }
    }

    pub async fn generate(&self, owner_id: &str, name: &str) -> Result<ApiKey> {
        let now = Utc::now();
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            status: KeyStatus::Active,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.store.insert_key(key.clone()).await?;
        tracing::info!("Generated API key '{}' for owner {}", name, owner_id);
        Ok(key)
    }

    /// Flips the key between active and inactive. `None` if the owner has no such key.
    pub async fn toggle(&self, owner_id: &str, key_id: &str) -> Result<Option<ApiKey>> {
        let Some(current) = self
            .store
            .find_key(key_id)
            .await?
            .filter(|k| k.owner_id == owner_id)
        else {
            return Ok(None);
        };

        let updated = self
            .store
            .set_status(owner_id, key_id, current.status.toggled())
            .await?;

        if let Some(key) = &updated {
            tracing::info!(
                "API key '{}' of owner {} is now {}",
                key.name,
                owner_id,
                key.status.as_str()
            );
        }
        Ok(updated)
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<ApiKey>> {
        self.store.owner_keys(owner_id).await
    }
}
