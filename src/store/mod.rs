//! Local persistence for generated images
//!
//! Writes decoded images under uniquely named files and sweeps expired ones.

pub mod local;
pub mod mock;

pub use local::LocalImageStore;
pub use mock::MockImageStore;

use crate::models::StoredImage;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Every generated file name starts with this.
pub const FILE_PREFIX: &str = "gemini_image_";

/// Matches `gemini_image_*.*`.
pub fn is_generated_file_name(name: &str) -> bool {
    name.strip_prefix(FILE_PREFIX)
        .is_some_and(|rest| rest.contains('.'))
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `bytes` and returns where they landed.
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<StoredImage>;

    /// Removes generated files older than `max_age`, returning how many went.
    async fn cleanup(&self, max_age: Duration) -> Result<usize>;
}
