use super::types::GenerateContentRequest;
use crate::models::{DEFAULT_API_BASE, DEFAULT_API_VERSION, DEFAULT_MODEL};
use crate::Result;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Total per-request timeout; the only cancellation an attempt honours.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Where `generateContent` lives: `{api_base}/{api_version}/models/{model}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEndpoint {
    pub api_base: String,
    pub api_version: String,
    pub model: String,
}

impl ModelEndpoint {
    /// `model` may be given with or without a `models/` prefix.
    pub fn new(api_base: &str, api_version: &str, model: &str) -> Self {
        let model = model.trim();
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_version: api_version.trim().trim_matches('/').to_string(),
            model: model.strip_prefix("models/").unwrap_or(model).to_string(),
        }
    }

    /// Endpoint URL without the key query parameter; safe to log.
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.api_base, self.api_version, self.model
        )
    }
}

impl Default for ModelEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_API_VERSION, DEFAULT_MODEL)
    }
}

/// Status and raw body of one `generateContent` call.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Lightweight Gemini REST client; one POST per call, no retries.
pub struct GeminiHttpClient {
    client: Client,
    endpoint: ModelEndpoint,
    timeout: Duration,
}

impl GeminiHttpClient {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self::new_with_client(endpoint, Client::new())
    }

    pub fn new_with_client(endpoint: ModelEndpoint, client: Client) -> Self {
        Self {
            client,
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends the request with `api_key` as the `key` query credential.
    ///
    /// Only transport failures (connect, timeout, body read) are `Err`; every
    /// HTTP status is returned for the caller to classify.
    pub async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<RawResponse> {
        let url = self.endpoint.generate_content_url();
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| e.without_url())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.without_url())?;

        Ok(RawResponse { status, body })
    }
}
