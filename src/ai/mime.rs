pub const DEFAULT_IMAGE_MIME: &str = "image/png";
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";
pub const DATA_URI_IMAGE_PREFIX: &str = "data:image/";

pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        _ => {
            tracing::debug!(
                "Unrecognized image format (first 4 bytes: {:02X?}), falling back to {}",
                &bytes[..bytes.len().min(4)],
                DEFAULT_IMAGE_MIME
            );
            DEFAULT_IMAGE_MIME
        }
    }
}

/// File extension for a MIME type; unknown types map to `png`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => DEFAULT_IMAGE_EXTENSION,
    }
}

/// Splits `data:<header>,<payload>` at the first comma.
pub fn split_data_uri(value: &str) -> Option<(&str, &str)> {
    if !value.starts_with("data:") {
        return None;
    }
    value.split_once(',')
}

/// MIME type from a data URI header such as `data:image/jpeg;base64`.
pub fn data_uri_mime(header: &str) -> &str {
    header
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_IMAGE_MIME)
}
