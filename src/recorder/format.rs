//! Output format selection

use crate::platform::MediaEncoderFactory;
use crate::utils::error::{MediaError, MediaResult};

/// Pick the container format for a recording.
///
/// A supported `requested` type wins. Otherwise the first supported entry of
/// `preferences` is used.
pub fn select_mime_type(
    encoder: &dyn MediaEncoderFactory,
    requested: Option<&str>,
    preferences: &[String],
) -> MediaResult<String> {
    if let Some(requested) = requested {
        if encoder.is_type_supported(requested) {
            return Ok(requested.to_string());
        }
        tracing::warn!(
            "Requested recording format {} is not supported, falling back",
            requested
        );
    }

    preferences
        .iter()
        .find(|candidate| encoder.is_type_supported(candidate))
        .cloned()
        .ok_or_else(|| {
            MediaError::UnsupportedCapability(format!(
                "none of the recording formats are supported: {}",
                preferences.join(", ")
            ))
        })
}

/// Mime type without codec parameters, e.g. `video/webm`
pub fn container_of(mime_type: &str) -> &str {
    mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
}

/// File extension for a recording of `mime_type`
pub fn extension_for(mime_type: &str) -> &'static str {
    match container_of(mime_type) {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "audio/ogg" | "video/ogg" => "ogg",
        _ => "bin",
    }
}
