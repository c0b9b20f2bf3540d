use crate::config::MAX_PRESIGN_EXPIRY_SECS;
use crate::services::storage::StorageService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

pub const UPLOAD_PREFIX: &str = "uploads/";
const PRESIGNED_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum PresignError {
    #[error("{0}")]
    Validation(String),

    #[error("could not generate presigned URL: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresignedUpload {
    pub url: String,
    pub key: String,
    pub expires_in: u64,
}

/// Issues single-object, write-only capabilities. Holds no per-request state.
#[derive(Clone)]
pub struct PresignedUrlIssuer {
    storage: Arc<dyn StorageService>,
    default_expiry_secs: u64,
}

impl PresignedUrlIssuer {
    pub fn new(storage: Arc<dyn StorageService>, default_expiry_secs: u64) -> Self {
        Self {
            storage,
            default_expiry_secs: default_expiry_secs.min(MAX_PRESIGN_EXPIRY_SECS),
        }
    }

    pub async fn issue(
        &self,
        file_name: &str,
        expiry_secs: Option<u64>,
    ) -> Result<PresignedUpload, PresignError> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(PresignError::Validation("File name is required.".to_string()));
        }

        let expires_in = expiry_secs.unwrap_or(self.default_expiry_secs);
        if expires_in == 0 || expires_in > MAX_PRESIGN_EXPIRY_SECS {
            return Err(PresignError::Validation(format!(
                "Expiry must be between 1 and {} seconds",
                MAX_PRESIGN_EXPIRY_SECS
            )));
        }

        let key = format!("{}{}", UPLOAD_PREFIX, file_name);
        let url = self
            .storage
            .presign_put(&key, Duration::from_secs(expires_in), PRESIGNED_CONTENT_TYPE)
            .await?;

        Ok(PresignedUpload {
            url,
            key,
            expires_in,
        })
    }
}
