use super::ImageGenerationService;
use crate::models::{GenerationRequest, StoredImage};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Local;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Scripted result for one `generate_image` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Image(PathBuf),
    NoImage(String),
    KeysExhausted(String),
    NoApiKeys,
}

impl MockOutcome {
    fn into_result(self) -> Result<StoredImage> {
        match self {
            MockOutcome::Image(path) => Ok(StoredImage {
                path,
                created_at: Local::now(),
            }),
            MockOutcome::NoImage(detail) => Err(Error::NoImage(detail)),
            MockOutcome::KeysExhausted(detail) => Err(Error::KeysExhausted(detail)),
            MockOutcome::NoApiKeys => Err(Error::NoApiKeys),
        }
    }
}

#[derive(Clone)]
pub struct MockImageGenerationClient {
    outcomes: Arc<Mutex<Vec<MockOutcome>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockImageGenerationClient {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_outcome(self, outcome: MockOutcome) -> Self {
        self.outcomes.lock().unwrap().push(outcome);
        self
    }

    pub fn with_image_path(self, path: impl Into<PathBuf>) -> Self {
        self.with_outcome(MockOutcome::Image(path.into()))
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn get_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockImageGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerationService for MockImageGenerationClient {
    async fn generate_image(&self, request: &GenerationRequest) -> Result<StoredImage> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());

        let outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            MockOutcome::Image(PathBuf::from("/tmp/gemini_image_mock.png")).into_result()
        } else {
            let index = (requests.len() - 1) % outcomes.len();
            outcomes[index].clone().into_result()
        }
    }
}
