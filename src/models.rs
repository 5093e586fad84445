//! Data models and configuration
//!
//! Defines the per-call request values, the API key pool, stored image
//! records, and the environment-driven configuration.

use crate::ai::gemini::decode;
use crate::ai::mime;
use crate::{Error, Result};
use base64::Engine as _;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_IMAGES_DIR: &str = "images";

/// A reference image supplied alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    /// Wraps raw bytes, inferring the MIME type from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = mime::detect_image_mime(&data).to_string();
        Self { mime_type, data }
    }

    /// Accepts bare base64 or a `data:image/...;base64,` URI.
    ///
    /// Bare base64 is assumed to be `image/png`; a data URI carries its own
    /// MIME type in the header.
    pub fn from_base64_str(encoded: &str) -> Result<Self> {
        let (mime_type, payload) = match mime::split_data_uri(encoded) {
            Some((header, payload)) => (mime::data_uri_mime(header), payload),
            None => (mime::DEFAULT_IMAGE_MIME, encoded),
        };

        let data = decode::decode_base64(payload)
            .map_err(|e| Error::Decode(format!("Invalid reference image base64: {}", e)))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Immutable input for one generation call.
///
/// An empty prompt is allowed; the request is submitted as-is.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<ImagePayload>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
        }
    }

    pub fn with_reference_image(mut self, image: ImagePayload) -> Self {
        self.reference_images.push(image);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prompt.is_empty() && self.reference_images.is_empty()
    }
}

/// Ordered API keys, tried front to back on every call.
#[derive(Clone, Default, PartialEq)]
pub struct KeyPool {
    keys: Vec<String>,
}

impl KeyPool {
    /// Builds a pool, trimming whitespace and dropping blank entries.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Keys paired with their position, used in logs instead of the secret.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.keys.iter().map(String::as_str).enumerate()
    }
}

impl fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .finish()
    }
}

/// A generated image written to the images directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
}

/// Per-key attempt budget plus the cleanup age used on failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per key, always at least one.
    pub max_retries: u32,
    /// Backoff after attempt `n` is `min(8, 2^n)` of this unit.
    pub backoff_unit: Duration,
    pub cleanup_after: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, cleanup_minutes: u64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff_unit: Duration::from_secs(1),
            cleanup_after: Duration::from_secs(cleanup_minutes * 60),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 15)
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_keys: KeyPool,
    pub api_base: String,
    pub api_version: String,
    pub model: String,
    pub max_retries: u32,
    pub cleanup_minutes: u64,
    pub delete_after_send: bool,
    pub delete_delay_seconds: u64,
    pub images_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut api_keys = KeyPool::new(
            lookup("GEMINI_API_KEYS")
                .unwrap_or_default()
                .split(',')
                .collect::<Vec<_>>(),
        );
        if api_keys.is_empty() {
            // Single-key setups predate the list variable.
            if let Some(legacy) = lookup("GEMINI_API_KEY") {
                api_keys = KeyPool::new([legacy]);
            }
        }

        let api_base = lookup("GEMINI_API_BASE")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_version = non_blank(lookup("GEMINI_API_VERSION"))
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let model = non_blank(lookup("GEMINI_MODEL")).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_retries: u32 = parse_var(&lookup, "GEMINI_MAX_RETRIES", 3)?;
        let cleanup_minutes = parse_var(&lookup, "GEMINI_CLEANUP_MINUTES", 15)?;
        let delete_delay_seconds = parse_var(&lookup, "GEMINI_DELETE_DELAY_SECONDS", 15)?;
        let delete_after_send = match non_blank(lookup("GEMINI_DELETE_AFTER_SEND")) {
            None => true,
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::Config(format!("GEMINI_DELETE_AFTER_SEND is not a boolean: {}", v))
            })?,
        };

        let images_dir = non_blank(lookup("GEMINI_IMAGES_DIR"))
            .unwrap_or_else(|| DEFAULT_IMAGES_DIR.to_string())
            .into();

        Ok(Self {
            api_keys,
            api_base,
            api_version,
            model,
            max_retries: max_retries.max(1),
            cleanup_minutes,
            delete_after_send,
            delete_delay_seconds,
            images_dir,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.cleanup_minutes)
    }

    pub fn delete_delay(&self) -> Duration {
        Duration::from_secs(self.delete_delay_seconds)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match non_blank(lookup(name)) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", name, v, e))),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
