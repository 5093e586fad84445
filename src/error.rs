//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No Gemini API keys configured")]
    NoApiKeys,

    #[error("Gemini returned no image: {0}")]
    NoImage(String),

    #[error("All API keys exhausted: {0}")]
    KeysExhausted(String),

    #[error("Image decode error: {0}")]
    Decode(String),
}

impl Error {
    /// True when the feature itself is unusable rather than this call failing.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::NoApiKeys | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
