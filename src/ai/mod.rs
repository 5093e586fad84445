//! AI service integration for image generation
//!
//! Provides the Gemini `generateContent` client with multi-key rotation, plus
//! the service seam the host layer depends on.

pub mod gemini;
pub mod mime;
pub mod mock;

pub use gemini::GeminiImageClient;
pub use mock::MockImageGenerationClient;

use crate::models::{GenerationRequest, StoredImage};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    async fn generate_image(&self, request: &GenerationRequest) -> Result<StoredImage>;
}
