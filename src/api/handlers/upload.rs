use crate::AppState;
use crate::api::error::AppError;
use crate::services::presign::{PresignError, PresignedUpload, UPLOAD_PREFIX};
use crate::utils::validation::sanitize_filename;
use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use utoipa::{IntoParams, ToSchema};

/// Content type recorded on objects ingested through the multipart route
pub const UPLOAD_CONTENT_TYPE: &str = "application/x-hdf";

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PresignQuery {
    /// Name of the object to create under `uploads/`
    pub file_name: Option<String>,
    /// Lifetime in seconds, at most 3600
    pub expires_in: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub key: String,
    pub size: u64,
    pub parts: usize,
}

#[utoipa::path(
    get,
    path = "/presigned-url",
    params(PresignQuery),
    responses(
        (status = 200, description = "Presigned PUT URL", body = PresignedUpload),
        (status = 400, description = "File name missing or expiry out of range"),
        (status = 500, description = "Could not generate presigned URL")
    ),
    tag = "uploads"
)]
pub async fn get_presigned_url(
    State(state): State<AppState>,
    Query(query): Query<PresignQuery>,
) -> Result<Json<PresignedUpload>, AppError> {
    let file_name = query.file_name.unwrap_or_default();

    let presigned = state
        .presigner
        .issue(&file_name, query.expires_in)
        .await
        .map_err(|e| match e {
            PresignError::Validation(msg) => AppError::BadRequest(msg),
            PresignError::Storage(e) => {
                tracing::error!("Error generating presigned URL: {:?}", e);
                AppError::Internal("Could not generate presigned URL.".to_string())
            }
        })?;

    Ok(Json(presigned))
}

#[utoipa::path(
    post,
    path = "/multipart-upload",
    request_body(content = Multipart, description = "Imagery file in the `file` field"),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "File missing or invalid"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Upload failed")
    ),
    tag = "uploads"
)]
pub async fn multipart_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut staged = None;
    let mut filename = String::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let err_msg = e.to_string();
        if err_msg.contains("length limit exceeded") {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(err_msg)
        }
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let original_filename = field.file_name().unwrap_or_default().to_string();
        filename = sanitize_filename(&original_filename)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        staged = Some(state.staging.stage(reader).await?);
    }

    let staged = staged.ok_or_else(|| AppError::BadRequest("File is required.".to_string()))?;
    let destination_key = format!("{}{}", UPLOAD_PREFIX, filename);

    tracing::info!(
        "Uploading {} ({} bytes) to {}",
        filename,
        staged.size(),
        destination_key
    );

    let receipt = state
        .uploader
        .upload(staged, &destination_key, UPLOAD_CONTENT_TYPE)
        .await?;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully.".to_string(),
        key: receipt.key,
        size: receipt.size,
        parts: receipt.parts,
    }))
}
