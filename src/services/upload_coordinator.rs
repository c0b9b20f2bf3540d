use crate::config::TransferConfig;
use crate::models::{CompletedPartInfo, PartPlan, UploadReceipt, UploadSession};
use crate::services::staging::StagedFile;
use crate::services::storage::StorageService;
use bytes::Bytes;
use rand::Rng;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("staging failed: {0}")]
    Staging(#[source] std::io::Error),

    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("could not open multipart session: {0}")]
    Initiate(#[source] anyhow::Error),

    #[error("part {part_number} failed after {attempts} attempt(s): {source}")]
    PartUpload {
        part_number: i32,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("part task failed: {0}")]
    TaskFailed(String),

    #[error("invalid part sequence: {0}")]
    InvalidPartSequence(String),

    #[error("commit failed: {0}")]
    Commit(#[source] anyhow::Error),

    #[error("upload did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Exponential backoff with random jitter, clamped to `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            max_retries: config.part_max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(30) as i32);
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        Duration::from_secs_f64(raw * (1.0 + jitter)).min(self.max_delay)
    }
}

/// Splits `total_size` bytes into consecutive windows of `part_size`.
///
/// An empty payload still yields one (empty) part, since a multipart session
/// cannot be committed without parts.
pub fn plan_parts(total_size: u64, part_size: u64) -> Vec<PartPlan> {
    let part_size = part_size.max(1);
    let count = total_size.div_ceil(part_size).max(1);

    (0..count)
        .map(|i| {
            let offset = i * part_size;
            PartPlan {
                part_number: (i + 1) as i32,
                offset,
                len: part_size.min(total_size - offset),
            }
        })
        .collect()
}

/// Orders parts ascending and checks they cover `1..=expected` with no gaps or duplicates.
pub fn validate_part_sequence(
    parts: &mut [CompletedPartInfo],
    expected: usize,
) -> Result<(), UploadError> {
    parts.sort_by_key(|p| p.part_number);

    if parts.len() != expected {
        return Err(UploadError::InvalidPartSequence(format!(
            "expected {} parts, got {}",
            expected,
            parts.len()
        )));
    }

    for (index, part) in parts.iter().enumerate() {
        let wanted = (index + 1) as i32;
        if part.part_number != wanted {
            return Err(UploadError::InvalidPartSequence(format!(
                "found part {} where part {} was expected",
                part.part_number, wanted
            )));
        }
    }

    Ok(())
}

/// Drives one multipart transfer from a staged file into blob storage.
pub struct UploadCoordinator {
    storage: Arc<dyn StorageService>,
    part_size: u64,
    concurrency: usize,
    retry: RetryPolicy,
    timeout: Duration,
}

impl UploadCoordinator {
    pub fn new(storage: Arc<dyn StorageService>, config: &TransferConfig) -> Self {
        Self {
            storage,
            part_size: config.part_size as u64,
            concurrency: config.upload_concurrency.max(1),
            retry: RetryPolicy::from_config(config),
            timeout: config.upload_timeout(),
        }
    }

    /// Uploads the staged file to `destination_key`, committing all parts or none.
    ///
    /// The staged file is consumed and deleted before this returns, whatever the outcome.
    pub async fn upload(
        &self,
        staged: StagedFile,
        destination_key: &str,
        content_type: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let result = self.transfer(&staged, destination_key, content_type).await;

        let staged_path = staged.path().to_path_buf();
        if let Err(e) = staged.remove() {
            tracing::warn!(
                "Failed to remove staged file {}: {}",
                staged_path.display(),
                e
            );
        }

        result
    }

    async fn transfer(
        &self,
        staged: &StagedFile,
        destination_key: &str,
        content_type: &str,
    ) -> Result<UploadReceipt, UploadError> {
        // One deadline covers initiate, parts and commit
        let deadline = Instant::now() + self.timeout;
        let plan = plan_parts(staged.size(), self.part_size);

        let upload_id = match timeout_at(
            deadline,
            self.storage
                .create_multipart_upload(destination_key, content_type),
        )
        .await
        {
            Ok(result) => result.map_err(UploadError::Initiate)?,
            Err(_) => return Err(UploadError::TimedOut(self.timeout)),
        };

        let mut session = UploadSession {
            upload_id,
            destination_key: destination_key.to_string(),
            total_size: staged.size(),
            part_size: self.part_size,
            parts: Vec::with_capacity(plan.len()),
        };

        tracing::info!(
            "Opened multipart upload {} for {} ({} bytes, {} parts)",
            session.upload_id,
            destination_key,
            session.total_size,
            plan.len()
        );

        let mut tasks = self.spawn_parts(staged.path(), &session, &plan);
        let collected = timeout_at(deadline, collect_parts(&mut tasks, &session.upload_id)).await;
        let uploaded = match collected {
            Ok(result) => result,
            Err(_) => {
                drain(&mut tasks).await;
                Err(UploadError::TimedOut(self.timeout))
            }
        };

        let mut parts = match uploaded {
            Ok(parts) => parts,
            Err(e) => {
                self.abort(&session).await;
                return Err(e);
            }
        };

        if let Err(e) = validate_part_sequence(&mut parts, plan.len()) {
            self.abort(&session).await;
            return Err(e);
        }
        session.parts = parts;

        let committed = timeout_at(
            deadline,
            self.storage.complete_multipart_upload(
                &session.destination_key,
                &session.upload_id,
                &session.parts,
            ),
        )
        .await;

        let failure = match committed {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(UploadError::Commit(e)),
            Err(_) => Some(UploadError::TimedOut(self.timeout)),
        };
        if let Some(e) = failure {
            self.abort(&session).await;
            return Err(e);
        }

        tracing::info!(
            "Committed multipart upload {} for {}",
            session.upload_id,
            session.destination_key
        );

        Ok(UploadReceipt {
            key: session.destination_key,
            size: session.total_size,
            parts: session.parts.len(),
        })
    }

    /// Dispatches every part; the semaphore keeps at most `concurrency` in flight.
    fn spawn_parts(
        &self,
        path: &Path,
        session: &UploadSession,
        plan: &[PartPlan],
    ) -> JoinSet<Result<CompletedPartInfo, UploadError>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for part in plan.iter().copied() {
            let semaphore = semaphore.clone();
            let storage = self.storage.clone();
            let retry = self.retry.clone();
            let path = path.to_path_buf();
            let key = session.destination_key.clone();
            let upload_id = session.upload_id.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| UploadError::TaskFailed(e.to_string()))?;
                upload_part_with_retry(storage.as_ref(), &path, &key, &upload_id, part, &retry)
                    .await
            });
        }

        tasks
    }

    async fn abort(&self, session: &UploadSession) {
        match self
            .storage
            .abort_multipart_upload(&session.destination_key, &session.upload_id)
            .await
        {
            Ok(()) => tracing::warn!(
                "Aborted multipart upload {} for {}",
                session.upload_id,
                session.destination_key
            ),
            Err(e) => tracing::error!(
                "Failed to abort multipart upload {} for {}: {:?}",
                session.upload_id,
                session.destination_key,
                e
            ),
        }
    }
}

/// Waits for every part. The first failure cancels the rest; the set is drained before returning.
async fn collect_parts(
    tasks: &mut JoinSet<Result<CompletedPartInfo, UploadError>>,
    upload_id: &str,
) -> Result<Vec<CompletedPartInfo>, UploadError> {
    let mut completed = Vec::with_capacity(tasks.len());
    let mut first_error = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => Err(UploadError::TaskFailed(e.to_string())),
        };

        match outcome {
            Ok(part) => completed.push(part),
            Err(e) => {
                if first_error.is_none() {
                    tracing::warn!("Cancelling remaining parts of {}: {}", upload_id, e);
                    tasks.abort_all();
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(completed),
    }
}

/// Cancels outstanding part tasks and waits until each has stopped.
async fn drain<T: 'static>(tasks: &mut JoinSet<T>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

async fn read_window(path: &Path, part: PartPlan) -> std::io::Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(part.offset)).await?;
    let mut buffer = vec![0u8; part.len as usize];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

async fn upload_part_with_retry(
    storage: &dyn StorageService,
    path: &Path,
    key: &str,
    upload_id: &str,
    part: PartPlan,
    retry: &RetryPolicy,
) -> Result<CompletedPartInfo, UploadError> {
    let data = read_window(path, part)
        .await
        .map_err(|e| UploadError::PartUpload {
            part_number: part.part_number,
            attempts: 0,
            source: e.into(),
        })?;

    let mut attempt = 0;
    loop {
        match storage
            .upload_part(key, upload_id, part.part_number, data.clone())
            .await
        {
            Ok(e_tag) => {
                tracing::debug!("Uploaded part {} of {}", part.part_number, upload_id);
                return Ok(CompletedPartInfo {
                    part_number: part.part_number,
                    e_tag,
                });
            }
            Err(e) if attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                tracing::warn!(
                    "Part {} of {} failed (attempt {}), retrying in {:?}: {}",
                    part.part_number,
                    upload_id,
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(UploadError::PartUpload {
                    part_number: part.part_number,
                    attempts: attempt + 1,
                    source: e,
                });
            }
        }
    }
}
