//! Resilient Gemini image generation client
//!
//! Turns a prompt and optional reference images into a generated image file,
//! rotating across multiple API keys with per-key retries, and manages the
//! lifetime of the files it writes.

pub mod ai;
pub mod app;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod store;

pub use error::{Error, Result};
