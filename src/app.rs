//! Host-facing orchestration: configuration in, image path or failure reason out.

use crate::ai::gemini::ModelEndpoint;
use crate::ai::{GeminiImageClient, ImageGenerationService};
use crate::models::{Config, GenerationRequest, ImagePayload, StoredImage};
use crate::scheduler;
use crate::store::LocalImageStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// What happens to a file once the host has delivered it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryPolicy {
    pub delete_after_send: bool,
    pub delete_delay: Duration,
}

impl From<&Config> for DeliveryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            delete_after_send: config.delete_after_send,
            delete_delay: config.delete_delay(),
        }
    }
}

/// Generates images for the host and manages their after-send lifetime.
pub struct App {
    image_gen: Box<dyn ImageGenerationService>,
    delivery: DeliveryPolicy,
}

impl App {
    /// Build an app from a concrete generation service.
    ///
    /// This is primarily useful for tests and harnesses that need to inject
    /// mocks.
    pub fn with_service(image_gen: Box<dyn ImageGenerationService>, delivery: DeliveryPolicy) -> Self {
        Self {
            image_gen,
            delivery,
        }
    }

    /// Wires the Gemini client and local store from configuration.
    pub fn new(config: &Config) -> Self {
        let endpoint = ModelEndpoint::new(&config.api_base, &config.api_version, &config.model);
        let policy = config.retry_policy();
        // The pre-save sweep keeps its fixed default age; the configured age
        // only applies once every key is exhausted.
        let store = LocalImageStore::new(&config.images_dir);

        info!(
            "Image provider: Gemini (model: {}, keys: {}, images: {})",
            endpoint.model,
            config.api_keys.len(),
            config.images_dir.display()
        );

        let client = GeminiImageClient::new(endpoint, config.api_keys.clone(), Arc::new(store))
            .with_policy(policy);

        Self::with_service(Box::new(client), DeliveryPolicy::from(config))
    }

    pub fn delivery(&self) -> DeliveryPolicy {
        self.delivery
    }

    pub async fn generate(
        &self,
        prompt: &str,
        reference_images: Vec<ImagePayload>,
    ) -> Result<StoredImage> {
        let request = GenerationRequest {
            prompt: prompt.trim().to_string(),
            reference_images,
        };
        info!(
            "Generating image ({} chars of prompt, {} reference images)",
            request.prompt.len(),
            request.reference_images.len()
        );
        self.image_gen.generate_image(&request).await
    }

    /// Call once the image has been delivered; schedules removal if enabled.
    pub fn after_send(&self, image: &StoredImage) -> Option<JoinHandle<()>> {
        if !self.delivery.delete_after_send {
            return None;
        }
        scheduler::schedule_delete(&image.path, self.delivery.delete_delay)
    }

    /// End-user text for a failed generation.
    pub fn failure_reason(err: &Error) -> String {
        match err {
            Error::NoApiKeys => {
                "No Gemini API key is configured. Set GEMINI_API_KEYS.".to_string()
            }
            Error::Config(detail) => format!("Image generation is misconfigured: {}", detail),
            Error::NoImage(detail) => format!("The model did not return an image: {}", detail),
            Error::KeysExhausted(_) => {
                "Image generation failed. Please retry later or use another API key.".to_string()
            }
            other => format!("Image generation failed: {}", other),
        }
    }
}
