#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use imagery_vault::config::TransferConfig;
use imagery_vault::infrastructure::database;
use imagery_vault::models::{ApiKey, CompletedPartInfo, KeyStatus};
use imagery_vault::services::key_store::{KeyStore, SeaOrmKeyStore};
use imagery_vault::services::storage::{
    MultipartUploadInfo, ObjectBody, ObjectMetadata, StorageService,
};
use imagery_vault::{AppState, create_app};
use sea_orm::Database;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Counts a part call as in flight until it returns or is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Raises its flag when the body stream holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct MockSession {
    key: String,
    initiated: DateTime<Utc>,
    parts: HashMap<i32, Vec<u8>>,
}

/// In-memory blob store with failure injection and call recording.
#[derive(Default)]
pub struct MockStorageService {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    sessions: Mutex<HashMap<String, MockSession>>,
    /// Remaining injected failures per part number.
    part_failures: Mutex<HashMap<i32, usize>>,
    part_attempts: Mutex<HashMap<i32, usize>>,
    part_delay: Mutex<Option<Duration>>,
    commit_delay: Mutex<Option<Duration>>,
    committed: Mutex<Vec<Vec<i32>>>,
    fail_commit: AtomicBool,
    fail_presign: AtomicBool,
    /// Object bodies never finish once their bytes are sent.
    stall_bodies: AtomicBool,
    body_dropped: Arc<AtomicBool>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub creates: AtomicUsize,
    pub commits: AtomicUsize,
    pub aborts: AtomicUsize,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Every attempt at `part_number` fails.
    pub fn fail_part(&self, part_number: i32) {
        self.fail_part_times(part_number, usize::MAX);
    }

    pub fn fail_part_times(&self, part_number: i32, times: usize) {
        self.part_failures
            .lock()
            .unwrap()
            .insert(part_number, times);
    }

    pub fn fail_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_presign(&self) {
        self.fail_presign.store(true, Ordering::SeqCst);
    }

    pub fn delay_parts(&self, delay: Duration) {
        *self.part_delay.lock().unwrap() = Some(delay);
    }

    /// Every commit call sleeps this long before doing anything else.
    pub fn delay_commit(&self, delay: Duration) {
        *self.commit_delay.lock().unwrap() = Some(delay);
    }

    pub fn stall_bodies(&self) {
        self.stall_bodies.store(true, Ordering::SeqCst);
    }

    /// True once a body stream handed out by `get_object_range` has been dropped.
    pub fn body_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }

    pub fn total_attempts(&self) -> usize {
        self.part_attempts.lock().unwrap().values().sum()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, part_number: i32) -> usize {
        self.part_attempts
            .lock()
            .unwrap()
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    /// Part numbers of every commit call, in call order.
    pub fn committed_part_lists(&self) -> Vec<Vec<i32>> {
        self.committed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn has_session(&self, upload_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(upload_id)
    }

    pub fn insert_session(&self, key: &str, upload_id: &str, initiated: DateTime<Utc>) {
        self.sessions.lock().unwrap().insert(
            upload_id.to_string(),
            MockSession {
                key: key.to_string(),
                initiated,
                parts: HashMap::new(),
            },
        );
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn create_multipart_upload(&self, key: &str, _content_type: &str) -> anyhow::Result<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let upload_id = format!("mock-upload-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.insert_session(key, &upload_id, Utc::now());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> anyhow::Result<String> {
        *self
            .part_attempts
            .lock()
            .unwrap()
            .entry(part_number)
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let delay = *self.part_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        drop(guard);

        {
            let mut failures = self.part_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&part_number) {
                if *remaining > 0 {
                    *remaining = remaining.saturating_sub(1);
                    anyhow::bail!("injected failure for part {}", part_number);
                }
            }
        }

        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(upload_id)
            .ok_or_else(|| anyhow::anyhow!("NoSuchUpload"))?;
        session.parts.insert(part_number, data.to_vec());
        Ok(format!("\"etag-{}\"", part_number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> anyhow::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let delay = *self.commit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.committed
            .lock()
            .unwrap()
            .push(parts.iter().map(|p| p.part_number).collect());

        if self.fail_commit.load(Ordering::SeqCst) {
            anyhow::bail!("injected commit failure");
        }

        let session = self
            .sessions
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| anyhow::anyhow!("NoSuchUpload"))?;

        let mut data = Vec::new();
        for part in parts {
            let bytes = session
                .parts
                .get(&part.part_number)
                .ok_or_else(|| anyhow::anyhow!("InvalidPart {}", part.part_number))?;
            data.extend_from_slice(bytes);
        }
        self.put_object(key, data);
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn list_multipart_uploads(&self, prefix: &str) -> anyhow::Result<Vec<MultipartUploadInfo>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.key.starts_with(prefix))
            .map(|(id, s)| MultipartUploadInfo {
                key: s.key.clone(),
                upload_id: id.clone(),
                initiated: Some(s.initiated),
            })
            .collect())
    }

    async fn head_object(&self, key: &str) -> anyhow::Result<Option<ObjectMetadata>> {
        Ok(self.object(key).map(|data| ObjectMetadata {
            size: data.len() as u64,
            e_tag: Some("\"mock-etag\"".to_string()),
            last_modified: Some(Utc::now()),
        }))
    }

    async fn get_object_range(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> anyhow::Result<ObjectBody> {
        let data = self
            .object(key)
            .ok_or_else(|| anyhow::anyhow!("Key not found"))?;
        let window = match range {
            Some((start, end)) => data[start as usize..=end as usize].to_vec(),
            None => data,
        };

        let chunks: Vec<std::io::Result<Bytes>> = window
            .chunks(1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let body = futures::stream::iter(chunks);
        if !self.stall_bodies.load(Ordering::SeqCst) {
            return Ok(body.boxed());
        }

        let flag = DropFlag(self.body_dropped.clone());
        Ok(body
            .chain(futures::stream::pending())
            .map(move |chunk| {
                let _held = &flag;
                chunk
            })
            .boxed())
    }

    async fn presign_put(
        &self,
        key: &str,
        expires_in: Duration,
        _content_type: &str,
    ) -> anyhow::Result<String> {
        if self.fail_presign.load(Ordering::SeqCst) {
            anyhow::bail!("injected presign failure");
        }
        Ok(format!(
            "https://mock-bucket.s3.local/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}

pub async fn setup_key_store() -> Arc<SeaOrmKeyStore> {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    Arc::new(SeaOrmKeyStore::new(db))
}

pub async fn insert_key(
    store: &dyn KeyStore,
    id: &str,
    owner_id: &str,
    status: KeyStatus,
    expires_at: DateTime<Utc>,
) {
    store
        .insert_key(ApiKey {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: format!("{}-name", id),
            status,
            created_at: Utc::now(),
            expires_at,
        })
        .await
        .unwrap();
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub upload: Arc<MockStorageService>,
    pub serve: Arc<MockStorageService>,
    pub keys: Arc<SeaOrmKeyStore>,
    pub staging: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(TransferConfig::development()).await
    }

    pub async fn with_config(mut config: TransferConfig) -> Self {
        let staging = TempDir::new().unwrap();
        config.staging_dir = staging.path().to_path_buf();

        let upload = Arc::new(MockStorageService::new());
        let serve = Arc::new(MockStorageService::new());
        let keys = setup_key_store().await;

        let state = AppState::new(upload.clone(), serve.clone(), keys.clone(), config);
        let app = create_app(state.clone());

        Self {
            app,
            state,
            upload,
            serve,
            keys,
            staging,
        }
    }

    /// Names of files currently left in the staging directory.
    pub fn staged_files(&self) -> Vec<String> {
        std::fs::read_dir(self.staging.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
            Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n",
            boundary = BOUNDARY,
            field = field,
            filename = filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Deterministic non-repeating-per-part payload.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
