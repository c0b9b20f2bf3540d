pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::TransferConfig;
use crate::services::api_keys::ApiKeyService;
use crate::services::key_store::KeyStore;
use crate::services::key_validator::KeyValidator;
use crate::services::presign::PresignedUrlIssuer;
use crate::services::staging::StagingArea;
use crate::services::storage::StorageService;
use crate::services::streaming::RangeStreamer;
use crate::services::upload_coordinator::UploadCoordinator;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload::get_presigned_url,
        api::handlers::upload::multipart_upload,
        api::handlers::stream::stream_file,
        api::handlers::api_keys::create_key,
        api::handlers::api_keys::toggle_key,
        api::handlers::api_keys::list_keys,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::upload::UploadResponse,
            api::handlers::api_keys::CreateKeyRequest,
            api::handlers::api_keys::ToggleKeyRequest,
            api::handlers::api_keys::ApiKeyResponse,
            api::handlers::api_keys::ApiKeyListResponse,
            services::presign::PresignedUpload,
            models::KeyStatus,
        )
    ),
    tags(
        (name = "system", description = "Liveness"),
        (name = "uploads", description = "Presigned and server-side multipart uploads"),
        (name = "files", description = "Range-aware imagery streaming"),
        (name = "api-keys", description = "API key management")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub upload_storage: Arc<dyn StorageService>,
    pub serve_storage: Arc<dyn StorageService>,
    pub key_store: Arc<dyn KeyStore>,
    pub key_validator: KeyValidator,
    pub api_keys: Arc<ApiKeyService>,
    pub staging: StagingArea,
    pub uploader: Arc<UploadCoordinator>,
    pub presigner: PresignedUrlIssuer,
    pub streamer: RangeStreamer,
    pub config: TransferConfig,
}

impl AppState {
    /// Wires the services on top of the two buckets and the key store.
    pub fn new(
        upload_storage: Arc<dyn StorageService>,
        serve_storage: Arc<dyn StorageService>,
        key_store: Arc<dyn KeyStore>,
        config: TransferConfig,
    ) -> Self {
        Self {
            key_validator: KeyValidator::new(key_store.clone()),
            api_keys: Arc::new(ApiKeyService::new(
                key_store.clone(),
                config.api_key_ttl_days,
            )),
            staging: StagingArea::new(config.staging_dir.clone(), config.max_file_size as u64),
            uploader: Arc::new(UploadCoordinator::new(upload_storage.clone(), &config)),
            presigner: PresignedUrlIssuer::new(upload_storage.clone(), config.presign_expiry_secs),
            streamer: RangeStreamer::new(serve_storage.clone()),
            upload_storage,
            serve_storage,
            key_store,
            config,
        }
    }
}

fn cors_layer(config: &TransferConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    if origins.is_empty() || config.allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/presigned-url",
            get(api::handlers::upload::get_presigned_url),
        )
        .route(
            "/multipart-upload",
            post(api::handlers::upload::multipart_upload).layer(
                axum::extract::DefaultBodyLimit::max(
                    state.config.max_file_size + 10 * 1024 * 1024, // Add 10MB buffer for multipart overhead
                ),
            ),
        )
        .route("/file/:name", get(api::handlers::stream::stream_file))
        .route(
            "/api-keys",
            post(api::handlers::api_keys::create_key)
                .get(api::handlers::api_keys::list_keys)
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api-keys/toggle",
            put(api::handlers::api_keys::toggle_key).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
