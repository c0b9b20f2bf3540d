use crate::services::upload_coordinator::UploadError;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A payload written to local disk for the duration of one upload request.
///
/// The backing file is removed when the handle is dropped, so every exit path
/// of the owning request (including cancellation) cleans up. Call [`StagedFile::remove`]
/// to delete eagerly and observe the I/O result.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn remove(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Allocates uniquely named staging files in one directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
    max_size: u64,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            dir: dir.into(),
            max_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the whole reader to a fresh staging file.
    pub async fn stage<R>(&self, mut reader: R) -> Result<StagedFile, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(UploadError::Staging)?;

        let named = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.dir)
            .map_err(UploadError::Staging)?;
        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        // From here on `path` owns the file: any early return deletes it.
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut size: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await.map_err(UploadError::Staging)?;
            if n == 0 {
                break;
            }
            size += n as u64;
            if size > self.max_size {
                return Err(UploadError::TooLarge {
                    limit: self.max_size,
                });
            }
            file.write_all(&buffer[..n])
                .await
                .map_err(UploadError::Staging)?;
        }

        file.flush().await.map_err(UploadError::Staging)?;
        file.sync_all().await.map_err(UploadError::Staging)?;

        tracing::debug!("Staged {} bytes at {}", size, path.display());

        Ok(StagedFile { path, size })
    }
}
