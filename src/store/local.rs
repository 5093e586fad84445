use super::{is_generated_file_name, ImageStore, FILE_PREFIX};
use crate::ai::mime;
use crate::models::StoredImage;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15 * 60);

/// Filesystem-backed store rooted at a single, flat images directory.
pub struct LocalImageStore {
    images_dir: PathBuf,
    max_age: Duration,
}

impl LocalImageStore {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Age used by the sweep that runs before every save.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn file_name(created_at: &DateTime<Local>, mime_type: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}{}_{}.{}",
            FILE_PREFIX,
            created_at.format("%Y%m%d_%H%M%S"),
            &suffix[..8],
            mime::extension_for_mime(mime_type)
        )
    }

    /// Deletes `path` if it was last modified before `cutoff`.
    ///
    /// A file that disappears underneath us counts as not removed, not as an
    /// error.
    async fn remove_if_older(path: &Path, cutoff: SystemTime) -> Result<bool> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() || metadata.modified()? >= cutoff {
            return Ok(false);
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `bytes` into the freshly created `path`, removing the file
    /// again if the write does not complete.
    async fn write_or_discard<W>(path: &Path, mut file: W, bytes: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = file.write_all(bytes).await;
        if written.is_ok() {
            written = file.flush().await;
        }

        if let Err(e) = written {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(remove) if remove.kind() == ErrorKind::NotFound => {}
                Err(remove) => tracing::debug!(
                    "Failed to remove partial image {}: {}",
                    path.display(),
                    remove
                ),
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<StoredImage> {
        tokio::fs::create_dir_all(&self.images_dir).await?;

        if let Err(e) = self.cleanup(self.max_age).await {
            tracing::warn!("Cleanup before save failed: {}", e);
        }

        let created_at = Local::now();
        let path = self
            .images_dir
            .join(Self::file_name(&created_at, mime_type));

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Self::write_or_discard(&path, file, bytes).await?;

        tracing::info!("Saved image -> {}", path.display());
        Ok(StoredImage { path, created_at })
    }

    async fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return Ok(0);
        };

        let mut entries = match tokio::fs::read_dir(&self.images_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !is_generated_file_name(name) {
                continue;
            }

            let path = entry.path();
            match Self::remove_if_older(&path, cutoff).await {
                Ok(true) => {
                    removed += 1;
                    tracing::info!("Cleanup removed old image {}", path.display());
                }
                Ok(false) => {}
                Err(e) => tracing::debug!("Cleanup skipped {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}
