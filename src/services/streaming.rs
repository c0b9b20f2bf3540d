use crate::services::range::{RangeError, parse_range_header};
use crate::services::storage::{ObjectBody, StorageService};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Which part of the object the body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamWindow {
    Full,
    Partial { start: u64, end: u64 },
}

pub struct ObjectStream {
    pub size: u64,
    pub window: StreamWindow,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub body: ObjectBody,
}

impl ObjectStream {
    pub fn content_length(&self) -> u64 {
        match self.window {
            StreamWindow::Full => self.size,
            StreamWindow::Partial { start, end } => end - start + 1,
        }
    }

    /// `Content-Range` value for partial responses.
    pub fn content_range(&self) -> Option<String> {
        match self.window {
            StreamWindow::Full => None,
            StreamWindow::Partial { start, end } => {
                Some(format!("bytes {}-{}/{}", start, end, self.size))
            }
        }
    }
}

/// Serves stored objects, honouring byte ranges, without buffering them.
#[derive(Clone)]
pub struct RangeStreamer {
    storage: Arc<dyn StorageService>,
}

impl RangeStreamer {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    pub async fn stream(
        &self,
        object_key: &str,
        range_header: Option<&str>,
    ) -> Result<ObjectStream, StreamError> {
        let metadata = self
            .storage
            .head_object(object_key)
            .await?
            .ok_or_else(|| StreamError::NotFound(object_key.to_string()))?;
        let size = metadata.size;

        let window = match range_header {
            None => StreamWindow::Full,
            Some(header) => match parse_range_header(header).and_then(|spec| {
                spec.map(|spec| spec.resolve(size)).transpose()
            }) {
                Ok(None) => StreamWindow::Full,
                Ok(Some((start, end))) => StreamWindow::Partial { start, end },
                Err(RangeError::Malformed(value)) => {
                    tracing::debug!("Rejecting malformed range '{}' for {}", value, object_key);
                    return Err(StreamError::RangeNotSatisfiable { size });
                }
                Err(RangeError::Unsatisfiable { size }) => {
                    return Err(StreamError::RangeNotSatisfiable { size });
                }
            },
        };

        let fetch_range = match window {
            StreamWindow::Full => None,
            StreamWindow::Partial { start, end } => Some((start, end)),
        };
        let body = self.storage.get_object_range(object_key, fetch_range).await?;

        Ok(ObjectStream {
            size,
            window,
            e_tag: metadata.e_tag,
            last_modified: metadata.last_modified,
            body,
        })
    }
}
