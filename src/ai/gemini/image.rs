use super::client::{GeminiHttpClient, ModelEndpoint, RawResponse};
use super::decode::{self, EncodedImage};
use super::types::GenerateContentRequest;
use crate::ai::ImageGenerationService;
use crate::models::{GenerationRequest, KeyPool, RetryPolicy, StoredImage};
use crate::store::ImageStore;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;
use tracing::{error, info, warn};

const ERROR_DETAIL_LIMIT: usize = 500;

/// What a single POST with a single key amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Terminal: persist and return.
    Success(EncodedImage),
    /// Terminal: the provider answered without an image. Carries its text.
    NoImageFound(String),
    /// Retry the same key after backoff.
    TransientError(String),
    /// 429 or 403: stop retrying this key and move to the next one.
    KeyRejected(StatusCode, String),
}

impl AttemptOutcome {
    pub fn classify(response: &RawResponse) -> Self {
        match response.status {
            StatusCode::OK => match serde_json::from_str::<Value>(&response.body) {
                Ok(body) if body.is_object() => match decode::find_image(&body) {
                    Some(image) => AttemptOutcome::Success(image),
                    None => AttemptOutcome::NoImageFound(
                        decode::response_text(&body)
                            .unwrap_or_else(|| "no image in response".to_string()),
                    ),
                },
                _ => AttemptOutcome::TransientError(format!(
                    "unexpected response body: {}",
                    truncate(&response.body)
                )),
            },
            StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => {
                AttemptOutcome::KeyRejected(response.status, error_message(&response.body))
            }
            status => AttemptOutcome::TransientError(format!(
                "Gemini API error (status {}): {}",
                status,
                truncate(&response.body)
            )),
        }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(ERROR_DETAIL_LIMIT).collect()
}

/// `error.message` from a Gemini error body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| truncate(body))
}

/// Sleeps between attempts on one key: `min(8, 2^n)` units after attempt `n`.
///
/// Yields `max_retries - 1` delays; there is no sleep after the final attempt.
pub fn backoff_delays(unit: Duration, max_retries: u32) -> impl Iterator<Item = Duration> {
    (0..max_retries.saturating_sub(1)).map(move |attempt| unit * 2u32.pow(attempt.min(3)))
}

/// Generates images through Gemini, rotating across the configured keys.
pub struct GeminiImageClient {
    http: GeminiHttpClient,
    store: Arc<dyn ImageStore>,
    keys: KeyPool,
    policy: RetryPolicy,
}

impl GeminiImageClient {
    pub fn new(endpoint: ModelEndpoint, keys: KeyPool, store: Arc<dyn ImageStore>) -> Self {
        Self::new_with_client(endpoint, keys, store, reqwest::Client::new())
    }

    pub fn new_with_client(
        endpoint: ModelEndpoint,
        keys: KeyPool,
        store: Arc<dyn ImageStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(endpoint, client),
            store,
            keys,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.policy.backoff_unit = unit;
        self
    }

    /// Tries each key in order until one yields an image or a terminal answer.
    ///
    /// Fails with [`Error::NoApiKeys`] before any network activity when the
    /// pool is empty, and with [`Error::KeysExhausted`] once every key has
    /// been rejected or run out of attempts.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<StoredImage> {
        if self.keys.is_empty() {
            return Err(Error::NoApiKeys);
        }
        if request.is_empty() {
            warn!("Submitting image request with no prompt and no reference images");
        }

        let payload = GenerateContentRequest::from_generation(request);
        let mut last_error = String::from("no attempts made");

        for (index, key) in self.keys.iter() {
            match self.try_key(index, key, &payload).await {
                Ok(AttemptOutcome::Success(image)) => {
                    info!("key#{} produced an image ({})", index, image.mime_type);
                    return self.persist(&image).await;
                }
                Ok(AttemptOutcome::NoImageFound(detail)) => {
                    info!("Gemini API success but no image in response: {}", detail);
                    return Err(Error::NoImage(detail));
                }
                Ok(AttemptOutcome::KeyRejected(status, detail)) => {
                    warn!(
                        "key#{} quota/denied ({}): {}",
                        index,
                        status.as_u16(),
                        detail
                    );
                    last_error = format!("key rejected ({}): {}", status.as_u16(), detail);
                }
                Ok(AttemptOutcome::TransientError(detail)) | Err(detail) => {
                    last_error = detail;
                }
            }

            if index + 1 < self.keys.len() {
                info!("Rotating to next API key");
            }
        }

        error!(
            "All {} API keys exhausted, last error: {}",
            self.keys.len(),
            last_error
        );
        if let Err(e) = self.store.cleanup(self.policy.cleanup_after).await {
            warn!("Cleanup after failed generation failed: {}", e);
        }
        Err(Error::KeysExhausted(last_error))
    }

    /// Runs the attempt budget for one key.
    ///
    /// `Ok` holds a non-transient outcome; `Err` holds the last transient
    /// detail once the budget is spent.
    async fn try_key(
        &self,
        index: usize,
        key: &str,
        payload: &GenerateContentRequest,
    ) -> std::result::Result<AttemptOutcome, String> {
        let max_retries = self.policy.max_retries.max(1);
        let mut attempt = 0u32;

        Retry::spawn(
            backoff_delays(self.policy.backoff_unit, max_retries),
            || {
                attempt += 1;
                let attempt = attempt;
                async move {
                    match self.attempt(key, payload).await {
                        AttemptOutcome::TransientError(detail) => {
                            warn!(
                                "key#{} try {}/{} failed: {}",
                                index, attempt, max_retries, detail
                            );
                            Err(detail)
                        }
                        outcome => Ok(outcome),
                    }
                }
            },
        )
        .await
    }

    async fn attempt(&self, key: &str, payload: &GenerateContentRequest) -> AttemptOutcome {
        match self.http.generate_content(key, payload).await {
            Ok(response) => AttemptOutcome::classify(&response),
            Err(e) => AttemptOutcome::TransientError(format!("network error: {}", e)),
        }
    }

    async fn persist(&self, image: &EncodedImage) -> Result<StoredImage> {
        let bytes = image.decode_bytes()?;
        self.store
            .save(&bytes, &image.mime_type)
            .await
            .map_err(|e| {
                error!("Failed to save generated image: {}", e);
                e
            })
    }
}

#[async_trait]
impl ImageGenerationService for GeminiImageClient {
    async fn generate_image(&self, request: &GenerationRequest) -> Result<StoredImage> {
        self.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::test_support;
    use crate::store::MockImageStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::query_param;
    use wiremock::{MockServer, ResponseTemplate};

    fn image_body(data: &str) -> Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [{ "inlineData": { "mimeType": "image/png", "data": data } }]
                }
            }]
        })
    }

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    fn make_client(server: &MockServer, keys: &[&str], store: &MockImageStore) -> GeminiImageClient {
        GeminiImageClient::new(
            test_support::endpoint(server),
            KeyPool::new(keys),
            Arc::new(store.clone()),
        )
        .with_backoff_unit(Duration::from_millis(1))
    }

    #[test]
    fn test_classify_decision_table() {
        let ok = raw(200, &image_body("AAAA").to_string());
        assert!(matches!(AttemptOutcome::classify(&ok), AttemptOutcome::Success(_)));

        let no_image = raw(200, r#"{"candidates":[{"content":{"parts":[{"text":"no"}]}}]}"#);
        assert_eq!(
            AttemptOutcome::classify(&no_image),
            AttemptOutcome::NoImageFound("no".to_string())
        );

        assert!(matches!(
            AttemptOutcome::classify(&raw(200, "<html>")),
            AttemptOutcome::TransientError(_)
        ));
        assert!(matches!(
            AttemptOutcome::classify(&raw(200, "[]")),
            AttemptOutcome::TransientError(_)
        ));
        assert!(matches!(
            AttemptOutcome::classify(&raw(500, "boom")),
            AttemptOutcome::TransientError(_)
        ));
        assert!(matches!(
            AttemptOutcome::classify(&raw(400, "bad")),
            AttemptOutcome::TransientError(_)
        ));

        let quota = raw(429, r#"{"error":{"code":429,"message":"Quota exceeded"}}"#);
        assert_eq!(
            AttemptOutcome::classify(&quota),
            AttemptOutcome::KeyRejected(StatusCode::TOO_MANY_REQUESTS, "Quota exceeded".to_string())
        );
        assert_eq!(
            AttemptOutcome::classify(&raw(403, "denied")),
            AttemptOutcome::KeyRejected(StatusCode::FORBIDDEN, "denied".to_string())
        );
    }

    #[test]
    fn test_backoff_is_capped_exponential() {
        let delays: Vec<u64> = backoff_delays(Duration::from_secs(1), 6)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 8]);

        assert_eq!(backoff_delays(Duration::from_secs(1), 1).count(), 0);
        assert_eq!(backoff_delays(Duration::from_secs(1), 0).count(), 0);
    }

    #[tokio::test]
    async fn test_success_saves_decoded_image() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body("iVBORw==")))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, &["k1", "k2"], &store);
        let stored = client.generate(&GenerationRequest::new("a cat")).await.unwrap();

        assert!(stored.path.to_string_lossy().ends_with(".png"));
        assert_eq!(
            store.get_saved(),
            vec![(vec![0x89, 0x50, 0x4E, 0x47], "image/png".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_key_pool_is_configuration_error() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = make_client(&server, &[], &store);
        let err = client.generate(&GenerationRequest::new("a cat")).await.unwrap_err();

        assert!(matches!(err, Error::NoApiKeys));
        assert!(err.is_configuration());
        assert_eq!(store.get_cleanup_count(), 0);
    }

    #[tokio::test]
    async fn test_no_image_halts_without_trying_other_keys() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(query_param("key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "I won't draw that" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(query_param("key", "k2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body("AAAA")))
            .expect(0)
            .mount(&server)
            .await;

        let client = make_client(&server, &["k1", "k2"], &store);
        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();

        match err {
            Error::NoImage(detail) => assert_eq!(detail, "I won't draw that"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.get_saved().is_empty());
    }

    #[tokio::test]
    async fn test_rejections_rotate_without_backoff() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        for key in ["k1", "k2", "k3"] {
            test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
                .and(query_param("key", key))
                .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                    "error": { "code": 429, "message": "Resource exhausted" }
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = make_client(&server, &["k1", "k2", "k3"], &store)
            .with_backoff_unit(Duration::from_secs(30));

        let started = Instant::now();
        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            Error::KeysExhausted(detail) => assert!(detail.contains("Resource exhausted")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.get_cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_key_then_next_key_succeeds() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(query_param("key", "slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(image_body("AAAA"))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(3)
            .mount(&server)
            .await;
        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(query_param("key", "fast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body("AQID")))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, &["slow", "fast"], &store)
            .with_policy(RetryPolicy::new(3, 15))
            .with_backoff_unit(Duration::from_millis(1))
            .with_timeout(Duration::from_millis(100));

        let stored = client.generate(&GenerationRequest::new("x")).await.unwrap();

        assert!(stored.path.to_string_lossy().contains("gemini_image_mock_1"));
        assert_eq!(store.get_saved()[0].0, vec![1, 2, 3]);
        assert_eq!(store.get_cleanup_count(), 0);
    }

    #[tokio::test]
    async fn test_server_error_retries_same_key() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(query_param("key", "only"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body("AAAA")))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, &["only"], &store);
        client.generate(&GenerationRequest::new("x")).await.unwrap();

        assert_eq!(store.get_saved().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_back_off_between_attempts() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        // Three attempts sleep one unit, then two units.
        let client = make_client(&server, &["only"], &store)
            .with_backoff_unit(Duration::from_millis(100));

        let started = Instant::now();
        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::KeysExhausted(_)));
        assert!(
            elapsed >= Duration::from_millis(300),
            "expected backoff sleeps, finished in {:?}",
            elapsed
        );
        assert!(store.get_saved().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_retried_then_exhausts() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(2)
            .mount(&server)
            .await;

        let client = make_client(&server, &["only"], &store).with_policy(RetryPolicy {
            max_retries: 2,
            backoff_unit: Duration::from_millis(1),
            cleanup_after: Duration::from_secs(60),
        });

        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();
        match err {
            Error::KeysExhausted(detail) => assert!(detail.contains("not json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_terminal() {
        let server = MockServer::start().await;
        let store = MockImageStore::new().failing();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body("AAAA")))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, &["k1", "k2"], &store);
        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();

        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_reference_images_are_sent_inline() {
        let server = MockServer::start().await;
        let store = MockImageStore::new();

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(wiremock::matchers::body_string_contains(
                r#"{"inlineData":{"mimeType":"image/jpeg","data":"AAAA"}}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body("AAAA")))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new("make it blue").with_reference_image(
            crate::models::ImagePayload::from_base64_str("data:image/jpeg;base64,AAAA").unwrap(),
        );

        let client = make_client(&server, &["k1"], &store);
        client.generate(&request).await.unwrap();
    }
}
