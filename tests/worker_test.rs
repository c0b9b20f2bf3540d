mod common;

use chrono::Utc;
use common::MockStorageService;
use imagery_vault::services::worker::BackgroundWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_cleanup_aborts_abandoned_uploads() {
    let storage = Arc::new(MockStorageService::new());
    storage.insert_session("uploads/old.h5", "old", Utc::now() - chrono::Duration::hours(48));
    storage.insert_session("uploads/fresh.h5", "fresh", Utc::now());
    storage.insert_session("cogs/old.tif", "foreign", Utc::now() - chrono::Duration::hours(48));

    let staging = tempfile::TempDir::new().unwrap();
    let (_tx, rx) = watch::channel(false);
    let worker = BackgroundWorker::new(
        storage.clone(),
        staging.path().to_path_buf(),
        Duration::from_secs(24 * 3600),
        Duration::from_secs(3600),
        rx,
    );

    let report = worker.perform_cleanup().await;

    assert_eq!(report.aborted_uploads, 1);
    assert!(!storage.has_session("old"));
    assert!(storage.has_session("fresh"));
    assert!(storage.has_session("foreign"));
}

#[tokio::test]
async fn test_cleanup_removes_stale_staging_files() {
    let storage = Arc::new(MockStorageService::new());
    let staging = tempfile::TempDir::new().unwrap();
    std::fs::write(staging.path().join("upload-abc123"), b"leftover").unwrap();
    std::fs::write(staging.path().join("unrelated.txt"), b"keep").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (_tx, rx) = watch::channel(false);
    let worker = BackgroundWorker::new(
        storage,
        staging.path().to_path_buf(),
        Duration::from_millis(1),
        Duration::from_secs(3600),
        rx,
    );

    let report = worker.perform_cleanup().await;

    assert_eq!(report.removed_staging_files, 1);
    assert!(!staging.path().join("upload-abc123").exists());
    assert!(staging.path().join("unrelated.txt").exists());
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let storage = Arc::new(MockStorageService::new());
    let staging = tempfile::TempDir::new().unwrap();
    let (tx, rx) = watch::channel(false);

    let worker = BackgroundWorker::new(
        storage,
        staging.path().to_path_buf(),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
        rx,
    );
    let handle = tokio::spawn(worker.run());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
