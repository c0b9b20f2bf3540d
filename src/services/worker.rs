use crate::services::presign::UPLOAD_PREFIX;
use crate::services::storage::StorageService;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub aborted_uploads: usize,
    pub removed_staging_files: usize,
}

/// Periodically aborts abandoned multipart sessions and removes stale staging files.
pub struct BackgroundWorker {
    storage: Arc<dyn StorageService>,
    staging_dir: PathBuf,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        storage: Arc<dyn StorageService>,
        staging_dir: PathBuf,
        max_age: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            staging_dir,
            max_age,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) -> SweepReport {
        tracing::info!("🧹 Running background cleanup tasks...");

        let report = SweepReport {
            aborted_uploads: self.abort_abandoned_uploads().await,
            removed_staging_files: self.remove_stale_staging_files().await,
        };

        tracing::info!(
            "✅ Background cleanup completed: {} uploads aborted, {} staging files removed",
            report.aborted_uploads,
            report.removed_staging_files
        );
        report
    }

    async fn abort_abandoned_uploads(&self) -> usize {
        let uploads = match self.storage.list_multipart_uploads(UPLOAD_PREFIX).await {
            Ok(uploads) => uploads,
            Err(e) => {
                tracing::error!("Failed to list multipart uploads: {:?}", e);
                return 0;
            }
        };

        let Ok(max_age) = chrono::Duration::from_std(self.max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let mut aborted = 0;

        // Sessions without an initiation time are left alone
        for upload in uploads
            .into_iter()
            .filter(|u| u.initiated.is_some_and(|t| t < cutoff))
        {
            match self
                .storage
                .abort_multipart_upload(&upload.key, &upload.upload_id)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        "Aborted abandoned multipart upload {} for {}",
                        upload.upload_id,
                        upload.key
                    );
                    aborted += 1;
                }
                Err(e) => tracing::error!(
                    "Failed to abort abandoned upload {}: {:?}",
                    upload.upload_id,
                    e
                ),
            }
        }

        aborted
    }

    async fn remove_stale_staging_files(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.staging_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    "Cannot read staging dir {}: {}",
                    self.staging_dir.display(),
                    e
                );
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_name().to_string_lossy().starts_with("upload-") {
                continue;
            }

            let stale = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified.elapsed().is_ok_and(|age| age > self.max_age),
                Err(_) => false,
            };
            if !stale {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    "Failed to remove stale staging file {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        removed
    }
}
