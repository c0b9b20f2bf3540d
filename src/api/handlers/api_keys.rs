use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ApiKey, KeyStatus};
use crate::utils::auth::Claims;
use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateKeyRequest {
    #[serde(alias = "apiName")]
    #[validate(length(min = 1, max = 100, message = "Key name must be between 1 and 100 characters"))]
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleKeyRequest {
    pub api_key: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub api_key: String,
    pub name: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub valid_till: DateTime<Utc>,
    pub expired: bool,
}

impl ApiKeyResponse {
    fn from_key(key: ApiKey, now: DateTime<Utc>) -> Self {
        Self {
            expired: key.is_expired_at(now),
            api_key: key.id,
            name: key.name,
            status: key.status,
            created_at: key.created_at,
            valid_till: key.expires_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyListResponse {
    pub message: String,
    pub api_keys: Vec<ApiKeyResponse>,
}

async fn owner_key_list(
    state: &AppState,
    owner_id: &str,
    message: &str,
) -> Result<ApiKeyListResponse, AppError> {
    let now = Utc::now();
    let keys = state.api_keys.list(owner_id).await?;
    Ok(ApiKeyListResponse {
        message: message.to_string(),
        api_keys: keys
            .into_iter()
            .map(|k| ApiKeyResponse::from_key(k, now))
            .collect(),
    })
}

#[utoipa::path(
    post,
    path = "/api-keys",
    request_body = CreateKeyRequest,
    responses(
        (status = 201, description = "API key generated", body = ApiKeyListResponse),
        (status = 400, description = "Invalid key name"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "api-keys"
)]
pub async fn create_key(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyListResponse>), AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Key name cannot be blank".to_string()));
    }

    state.api_keys.generate(&claims.sub, name).await?;

    let body = owner_key_list(&state, &claims.sub, "API key generated successfully").await?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[utoipa::path(
    put,
    path = "/api-keys/toggle",
    request_body = ToggleKeyRequest,
    responses(
        (status = 200, description = "API key status toggled", body = ApiKeyListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "API key not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "api-keys"
)]
pub async fn toggle_key(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleKeyRequest>,
) -> Result<Json<ApiKeyListResponse>, AppError> {
    state
        .api_keys
        .toggle(&claims.sub, &req.api_key)
        .await?
        .ok_or_else(|| AppError::NotFound("API key not found".to_string()))?;

    let body = owner_key_list(&state, &claims.sub, "API key status toggled").await?;
    Ok(Json(body))
}

#[utoipa::path(
    get,
    path = "/api-keys",
    responses(
        (status = 200, description = "API keys of the caller", body = ApiKeyListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "api-keys"
)]
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiKeyListResponse>, AppError> {
    let body = owner_key_list(&state, &claims.sub, "API keys retrieved").await?;
    Ok(Json(body))
}
