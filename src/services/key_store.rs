use crate::entities::{api_keys, prelude::*};
use crate::models::{ApiKey, KeyStatus};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};

/// Owner/key store. Lookups by key value go through an index, never a scan over owners.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn find_key(&self, key_id: &str) -> Result<Option<ApiKey>>;
    async fn owner_keys(&self, owner_id: &str) -> Result<Vec<ApiKey>>;
    async fn insert_key(&self, key: ApiKey) -> Result<()>;
    /// Returns the updated key, or `None` when the owner has no such key.
    async fn set_status(
        &self,
        owner_id: &str,
        key_id: &str,
        status: KeyStatus,
    ) -> Result<Option<ApiKey>>;
}

pub struct SeaOrmKeyStore {
    db: DatabaseConnection,
}

impl SeaOrmKeyStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_domain(model: api_keys::Model) -> Result<ApiKey> {
    Ok(ApiKey {
        status: model.status.parse()?,
        id: model.id,
        owner_id: model.owner_id,
        name: model.name,
        created_at: model.created_at,
        expires_at: model.expires_at,
    })
}

#[async_trait]
impl KeyStore for SeaOrmKeyStore {
    async fn find_key(&self, key_id: &str) -> Result<Option<ApiKey>> {
        ApiKeys::find_by_id(key_id)
            .one(&self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    async fn owner_keys(&self, owner_id: &str) -> Result<Vec<ApiKey>> {
        ApiKeys::find()
            .filter(api_keys::Column::OwnerId.eq(owner_id))
            .order_by_asc(api_keys::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn insert_key(&self, key: ApiKey) -> Result<()> {
        api_keys::ActiveModel {
            id: Set(key.id),
            owner_id: Set(key.owner_id),
            name: Set(key.name),
            status: Set(key.status.as_str().to_string()),
            created_at: Set(key.created_at),
            expires_at: Set(key.expires_at),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        owner_id: &str,
        key_id: &str,
        status: KeyStatus,
    ) -> Result<Option<ApiKey>> {
        let Some(model) = ApiKeys::find_by_id(key_id)
            .filter(api_keys::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut active = model.into_active_model();
        active.status = Set(status.as_str().to_string());
        let updated = active.update(&self.db).await?;

        to_domain(updated).map(Some)
    }
}
