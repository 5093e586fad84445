pub mod client;
pub mod decode;
pub mod image;
pub mod types;

pub use client::{GeminiHttpClient, ModelEndpoint};
pub use image::{AttemptOutcome, GeminiImageClient};
