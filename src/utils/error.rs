//! Error types and handling
//!
//! Common error taxonomy shared by every coordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Session-wide error type
#[derive(Error, Debug)]
pub enum MediaError {
    /// Operation requires an inactive state (duplicate peer, already sharing or recording)
    #[error("Already active: {0}")]
    AlreadyActive(String),

    /// Operation requires an active session, channel or recording
    #[error("Not active: {0}")]
    NotActive(String),

    /// Unknown peer id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Platform lacks a required primitive or format
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// Empty stream, missing required track
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The underlying primitive rejected the operation
    #[error("Platform operation failed ({code}): {message}")]
    PlatformOperationFailed {
        code: String,
        message: String,
        details: Value,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MediaError {
    /// Stable code used by UI bridges
    pub fn code(&self) -> &str {
        match self {
            MediaError::AlreadyActive(_) => "ALREADY_ACTIVE",
            MediaError::NotActive(_) => "NOT_ACTIVE",
            MediaError::NotFound(_) => "NOT_FOUND",
            MediaError::UnsupportedCapability(_) => "UNSUPPORTED_CAPABILITY",
            MediaError::InvalidInput(_) => "INVALID_INPUT",
            MediaError::PlatformOperationFailed { .. } => "PLATFORM_OPERATION_FAILED",
            MediaError::Config(_) => "CONFIG_ERROR",
            MediaError::Io(_) => "IO_ERROR",
            MediaError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Attach the operation name and peer to a platform failure.
    ///
    /// Other variants pass through untouched.
    pub fn with_context(self, operation: &str, peer_id: Option<&str>) -> Self {
        match self {
            MediaError::PlatformOperationFailed {
                code,
                message,
                details,
            } => MediaError::PlatformOperationFailed {
                code,
                message: format!("{} failed: {}", operation, message),
                details: serde_json::json!({
                    "operation": operation,
                    "peerId": peer_id,
                    "cause": details,
                }),
            },
            other => other,
        }
    }
}

/// Failure reported by a platform adapter
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct PlatformError {
    /// Platform error name, e.g. "NotAllowedError"
    pub name: String,

    /// Human readable message
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<PlatformError> for MediaError {
    fn from(error: PlatformError) -> Self {
        MediaError::PlatformOperationFailed {
            code: error.name.clone(),
            message: error.message.clone(),
            details: serde_json::json!({
                "name": error.name,
                "message": error.message,
            }),
        }
    }
}

/// Error response for UI layers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<MediaError> for ErrorResponse {
    fn from(error: MediaError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using MediaError
pub type MediaResult<T> = Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_conversion() {
        let err: MediaError = PlatformError::new("NotAllowedError", "Permission denied").into();
        match &err {
            MediaError::PlatformOperationFailed { code, details, .. } => {
                assert_eq!(code, "NotAllowedError");
                assert_eq!(details["message"], "Permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), "PLATFORM_OPERATION_FAILED");
    }

    #[test]
    fn test_with_context_wraps_details() {
        let err: MediaError = PlatformError::new("InvalidStateError", "closed").into();
        let err = err.with_context("createOffer", Some("peer-1"));
        match err {
            MediaError::PlatformOperationFailed { message, details, .. } => {
                assert!(message.starts_with("createOffer failed"));
                assert_eq!(details["peerId"], "peer-1");
                assert_eq!(details["cause"]["name"], "InvalidStateError");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_with_context_keeps_other_variants() {
        let err = MediaError::NotFound("peer-9".into()).with_context("send", Some("peer-9"));
        assert!(matches!(err, MediaError::NotFound(_)));
    }

    #[test]
    fn test_error_response() {
        let response: ErrorResponse = MediaError::AlreadyActive("recording".into()).into();
        assert_eq!(response.code, "ALREADY_ACTIVE");
        assert_eq!(response.message, "Already active: recording");
    }
}
