use crate::models::CompletedPartInfo;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Body of a stored object. Dropping it cancels the underlying fetch.
pub type ObjectBody = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub size: u64,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MultipartUploadInfo {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
}

/// Blob storage capability. Components receive it explicitly so tests can substitute a fake.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<()>;
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;
    async fn list_multipart_uploads(&self, prefix: &str) -> Result<Vec<MultipartUploadInfo>>;
    /// Metadata-only lookup; `None` when the object does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>>;
    /// Streams the object, or only the inclusive window `(start, end)` when given.
    async fn get_object_range(&self, key: &str, range: Option<(u64, u64)>) -> Result<ObjectBody>;
    async fn presign_put(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> Result<String>;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn to_chrono(d: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(d.secs(), d.subsec_nanos())
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await?;

        let upload_id = res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))?;
        Ok(upload_id.to_string())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let res = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await?;

        let e_tag = res
            .e_tag()
            .ok_or_else(|| anyhow::anyhow!("No ETag returned for part {}", part_number))?;
        Ok(e_tag.to_string())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<()> {
        let completed_parts = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(&p.e_tag)
                    .part_number(p.part_number)
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn list_multipart_uploads(&self, prefix: &str) -> Result<Vec<MultipartUploadInfo>> {
        let mut uploads = Vec::new();
        let mut key_marker = None;
        let mut upload_id_marker = None;

        loop {
            let res = self
                .client
                .list_multipart_uploads()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_key_marker(key_marker)
                .set_upload_id_marker(upload_id_marker)
                .send()
                .await?;

            for upload in res.uploads() {
                if let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) {
                    uploads.push(MultipartUploadInfo {
                        key: key.to_string(),
                        upload_id: upload_id.to_string(),
                        initiated: upload.initiated().and_then(to_chrono),
                    });
                }
            }

            if res.is_truncated().unwrap_or(false) {
                key_marker = res.next_key_marker().map(str::to_string);
                upload_id_marker = res.next_upload_id_marker().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(uploads)
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: output.content_length().unwrap_or(0).max(0) as u64,
                e_tag: output.e_tag().map(str::to_string),
                last_modified: output.last_modified().and_then(to_chrono),
            })),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn get_object_range(&self, key: &str, range: Option<(u64, u64)>) -> Result<ObjectBody> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(|(start, end)| format!("bytes={}-{}", start, end)))
            .send()
            .await?;

        Ok(ReaderStream::new(res.body.into_async_read()).boxed())
    }

    async fn presign_put(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> Result<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await?;

        Ok(presigned.uri().to_string())
    }
}
