use crate::error::ImageError;
use axum::http::StatusCode;
use serde::Serialize;
use std::collections::HashMap;

/// Serialized reply handed back to the trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ResponseEnvelope {
    /// JSON response with `payload` as the body
    pub fn json<T: Serialize>(status: StatusCode, payload: &T) -> Result<Self, ImageError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| ImageError::Internal(format!("Failed to encode response: {}", e)))?;

        Ok(Self::with_body(status, body))
    }

    /// Response carrying no payload
    pub fn empty(status: StatusCode) -> Self {
        Self::with_body(status, String::new())
    }

    pub fn from_error(error: &ImageError) -> Self {
        // ErrorResponse only holds strings, encoding cannot fail.
        let body = serde_json::to_string(&error.to_response_body()).unwrap_or_default();
        Self::with_body(error.status_code(), body)
    }

    fn with_body(status: StatusCode, body: String) -> Self {
        Self {
            status_code: status.as_u16(),
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body,
        }
    }
}
