use crate::config::TransferConfig;
use crate::services::storage::S3StorageService;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

pub struct StorageHandles {
    pub upload: Arc<S3StorageService>,
    pub serve: Arc<S3StorageService>,
}

pub async fn setup_storage(config: &TransferConfig) -> StorageHandles {
    // Setup S3 client; without an endpoint the default AWS resolution applies
    let endpoint_url = env::var("S3_ENDPOINT").ok();
    let region = env::var("S3_REGION").unwrap_or_else(|_| "ap-south-1".to_string());

    info!(
        "☁️  S3 Storage: {} (upload bucket: {}, serve bucket: {})",
        endpoint_url.as_deref().unwrap_or("aws"),
        config.upload_bucket,
        config.serve_bucket
    );

    let mut loader = aws_config::from_env().region(Region::new(region));
    if let Some(endpoint) = &endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    if let (Ok(access_key), Ok(secret_key)) =
        (env::var("S3_ACCESS_KEY"), env::var("S3_SECRET_KEY"))
    {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ));
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(endpoint_url.is_some())
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    StorageHandles {
        upload: Arc::new(S3StorageService::new(
            s3_client.clone(),
            config.upload_bucket.clone(),
        )),
        serve: Arc::new(S3StorageService::new(s3_client, config.serve_bucket.clone())),
    }
}
