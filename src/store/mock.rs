use super::{ImageStore, FILE_PREFIX};
use crate::ai::mime;
use crate::models::StoredImage;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Local;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory store that records what it was asked to persist.
#[derive(Clone)]
pub struct MockImageStore {
    base_path: PathBuf,
    saved: Arc<Mutex<Vec<(Vec<u8>, String)>>>,
    cleanup_count: Arc<Mutex<usize>>,
    fail_saves: bool,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("/tmp/mock-images"),
            saved: Arc::new(Mutex::new(Vec::new())),
            cleanup_count: Arc::new(Mutex::new(0)),
            fail_saves: false,
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Every save fails as if the disk were full.
    pub fn failing(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn get_saved(&self) -> Vec<(Vec<u8>, String)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn get_cleanup_count(&self) -> usize {
        *self.cleanup_count.lock().unwrap()
    }
}

impl Default for MockImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<StoredImage> {
        if self.fail_saves {
            return Err(Error::Io(std::io::Error::other("mock store is full")));
        }

        let mut saved = self.saved.lock().unwrap();
        saved.push((bytes.to_vec(), mime_type.to_string()));

        let path = self.base_path.join(format!(
            "{}mock_{}.{}",
            FILE_PREFIX,
            saved.len(),
            mime::extension_for_mime(mime_type)
        ));

        Ok(StoredImage {
            path,
            created_at: Local::now(),
        })
    }

    async fn cleanup(&self, _max_age: Duration) -> Result<usize> {
        *self.cleanup_count.lock().unwrap() += 1;
        Ok(0)
    }
}
