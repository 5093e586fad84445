//! Locates the first image embedded in a `generateContent` response body.

use crate::ai::mime;
use crate::{Error, Result};
use base64::Engine as _;
use serde_json::Value;

/// A base64 image found in a response, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        decode_base64(&self.data)
            .map_err(|e| Error::Decode(format!("Failed to decode Gemini base64 image: {}", e)))
    }
}

/// Standard base64, ignoring ASCII whitespace such as wrapped lines.
pub fn decode_base64(text: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

fn parts(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
        .flatten()
}

fn inline_image(part: &Value) -> Option<EncodedImage> {
    let inline = part.get("inlineData")?.as_object()?;
    let data = inline.get("data")?.as_str().filter(|d| !d.is_empty())?;
    let mime_type = inline
        .get("mimeType")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(mime::DEFAULT_IMAGE_MIME);

    Some(EncodedImage {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    })
}

fn data_uri_image(part: &Value) -> Option<EncodedImage> {
    let text = part.get("text")?.as_str()?;
    if !text.starts_with(mime::DATA_URI_IMAGE_PREFIX) {
        return None;
    }
    let (header, payload) = mime::split_data_uri(text)?;

    Some(EncodedImage {
        mime_type: mime::data_uri_mime(header).to_string(),
        data: payload.to_string(),
    })
}

/// First image across all candidates and parts; `None` when there is none.
///
/// Never fails: unexpected shapes are skipped.
pub fn find_image(body: &Value) -> Option<EncodedImage> {
    parts(body).find_map(|part| inline_image(part).or_else(|| data_uri_image(part)))
}

/// Text the model returned instead of an image, for reporting.
pub fn response_text(body: &Value) -> Option<String> {
    let text: Vec<&str> = parts(body)
        .filter_map(|part| part.get("text")?.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if !text.is_empty() {
        return Some(text.join(" "));
    }

    body.get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(|reason| format!("prompt blocked ({})", reason))
}
