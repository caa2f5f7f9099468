use axum::http::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the images API
///
/// Every variant is rendered at the boundary as a JSON error body with the
/// status returned by [`ImageError::status_code`]; none of them abort the
/// invocation.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to decode image payload: {0}")]
    Decoding(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedFormat(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("No route for {method} {resource}")]
    RouteNotFound {
        resource: String,
        method: String,
        /// The resource exists but has no handler for this method
        resource_registered: bool,
    },

    #[error("Malformed request event: {0}")]
    MalformedRequest(String),

    #[error("Failed to issue access URL: {0}")]
    Signing(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ImageError::Validation(_)
            | ImageError::Decoding(_)
            | ImageError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ImageError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ImageError::NotFound(_) => StatusCode::NOT_FOUND,
            ImageError::RouteNotFound {
                resource_registered: false,
                ..
            } => StatusCode::NOT_FOUND,
            ImageError::RouteNotFound {
                resource_registered: true,
                ..
            } => StatusCode::METHOD_NOT_ALLOWED,
            ImageError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ImageError::Signing(_) | ImageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageError::Storage(_) => StatusCode::BAD_GATEWAY,
            ImageError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            ImageError::Validation(_) => "VALIDATION_ERROR",
            ImageError::Decoding(_) => "DECODING_ERROR",
            ImageError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ImageError::NotFound(_) => "NOT_FOUND",
            ImageError::RouteNotFound {
                resource_registered: false,
                ..
            } => "ROUTE_NOT_FOUND",
            ImageError::RouteNotFound {
                resource_registered: true,
                ..
            } => "METHOD_NOT_ALLOWED",
            ImageError::MalformedRequest(_) => "MALFORMED_REQUEST",
            ImageError::Signing(_) => "PRESIGN_ERROR",
            ImageError::NotImplemented(_) => "NOT_IMPLEMENTED",
            ImageError::Timeout { .. } => "TIMEOUT",
            ImageError::Storage(_) => "STORAGE_ERROR",
            ImageError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        }
    }
}

impl From<StorageError> for ImageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ImageError::NotFound(key),
            StorageError::Signing(message) => ImageError::Signing(message),
            backend @ StorageError::Backend { .. } => ImageError::Storage(backend.to_string()),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
