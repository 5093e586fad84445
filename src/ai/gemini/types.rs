//! Gemini `generateContent` request payload types.
//!
//! Responses are decoded from `serde_json::Value` in `decode.rs` so that
//! divergent shapes degrade to "no image" instead of a parse failure.

use crate::models::{GenerationRequest, ImagePayload};
use serde::Serialize;

/// Top-level `generateContent` request body.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    /// One user turn: the prompt text (if any), then each reference image.
    pub fn from_generation(request: &GenerationRequest) -> Self {
        let mut parts = Vec::with_capacity(request.reference_images.len() + 1);
        if !request.prompt.is_empty() {
            parts.push(Part::Text {
                text: request.prompt.clone(),
            });
        }
        parts.extend(request.reference_images.iter().map(Part::from));

        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
        }
    }
}

/// Gemini content container.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

/// Untagged union of text and inline media content parts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl From<&ImagePayload> for Part {
    fn from(image: &ImagePayload) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.to_base64(),
            },
        }
    }
}

/// Base64 inline payload used for reference images.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}
