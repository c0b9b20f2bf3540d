use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// S3 rejects multipart parts smaller than this, except for the last one.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Upper bound for presigned write capabilities.
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 3600;

/// Transfer configuration for uploads, downloads and key handling
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum accepted upload size in bytes (default: 1 GB)
    pub max_file_size: usize,

    /// Size of each multipart part in bytes (default: 5 MB)
    pub part_size: usize,

    /// Number of parts transferred concurrently (default: 4)
    pub upload_concurrency: usize,

    /// Retries per part after the first attempt (default: 3)
    pub part_max_retries: u32,

    /// Backoff base delay in milliseconds (default: 200)
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling in milliseconds (default: 5000)
    pub retry_max_delay_ms: u64,

    /// Deadline for a whole multipart upload in seconds (default: 3600)
    pub upload_timeout_secs: u64,

    /// Lifetime of presigned write URLs in seconds (default and max: 3600)
    pub presign_expiry_secs: u64,

    /// Directory for staged upload payloads (default: system temp dir)
    pub staging_dir: PathBuf,

    /// Age after which open multipart sessions and staging files are swept (default: 24)
    pub abandoned_upload_age_hours: u64,

    /// Interval between background sweeps in seconds (default: 3600)
    pub cleanup_interval_secs: u64,

    /// Lifetime of newly generated API keys in days (default: 30)
    pub api_key_ttl_days: i64,

    /// Bucket receiving uploads
    pub upload_bucket: String,

    /// Bucket serving imagery to API key holders
    pub serve_bucket: String,

    /// JWT secret for key management endpoints
    pub jwt_secret: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            part_size: MIN_PART_SIZE,
            upload_concurrency: 4,
            part_max_retries: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5000,
            upload_timeout_secs: 3600,
            presign_expiry_secs: MAX_PRESIGN_EXPIRY_SECS,
            staging_dir: env::temp_dir(),
            abandoned_upload_age_hours: 24,
            cleanup_interval_secs: 3600,
            api_key_ttl_days: 30,
            upload_bucket: "kdg-raw".to_string(),
            serve_bucket: "final-cog".to_string(),
            jwt_secret: "secret".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl TransferConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        let upload_bucket = lookup("UPLOAD_BUCKET").unwrap_or(default.upload_bucket);
        // Serving falls back to the upload bucket when only one is configured
        let serve_bucket = lookup("SERVE_BUCKET").unwrap_or_else(|| upload_bucket.clone());

        Self {
            max_file_size: parse_var(&lookup, "MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            part_size: parse_var(&lookup, "PART_SIZE")
                .map(|v: usize| v.max(MIN_PART_SIZE))
                .unwrap_or(default.part_size),

            upload_concurrency: parse_var(&lookup, "UPLOAD_CONCURRENCY")
                .map(|v: usize| v.clamp(1, 16))
                .unwrap_or(default.upload_concurrency),

            part_max_retries: parse_var(&lookup, "PART_MAX_RETRIES").unwrap_or(default.part_max_retries),

            retry_base_delay_ms: parse_var(&lookup, "RETRY_BASE_DELAY_MS")
                .unwrap_or(default.retry_base_delay_ms),

            retry_max_delay_ms: parse_var(&lookup, "RETRY_MAX_DELAY_MS")
                .unwrap_or(default.retry_max_delay_ms),

            upload_timeout_secs: parse_var(&lookup, "UPLOAD_TIMEOUT_SECS")
                .unwrap_or(default.upload_timeout_secs),

            presign_expiry_secs: parse_var(&lookup, "PRESIGN_EXPIRY_SECS")
                .map(|v: u64| v.clamp(1, MAX_PRESIGN_EXPIRY_SECS))
                .unwrap_or(default.presign_expiry_secs),

            staging_dir: lookup("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            abandoned_upload_age_hours: parse_var(&lookup, "ABANDONED_UPLOAD_AGE_HOURS")
                .unwrap_or(default.abandoned_upload_age_hours),

            cleanup_interval_secs: parse_var(&lookup, "CLEANUP_INTERVAL_SECS")
                .unwrap_or(default.cleanup_interval_secs),

            api_key_ttl_days: parse_var(&lookup, "API_KEY_TTL_DAYS").unwrap_or(default.api_key_ttl_days),

            upload_bucket,
            serve_bucket,

            jwt_secret: lookup("JWT_SECRET").unwrap_or_else(|| "secret".to_string()), // Fallback for dev convenience

            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development and tests (small parts, fast retries)
    pub fn development() -> Self {
        Self {
            max_file_size: 64 * 1024 * 1024,
            part_size: 1024 * 1024,
            upload_concurrency: 4,
            part_max_retries: 2,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 10,
            upload_timeout_secs: 60,
            upload_bucket: "uploads".to_string(),
            serve_bucket: "uploads".to_string(),
            ..Self::default()
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn abandoned_upload_age(&self) -> Duration {
        Duration::from_secs(self.abandoned_upload_age_hours * 3600)
    }
}


fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    lookup(name).and_then(|v| v.parse().ok())
}
