//! Normalization of raw API gateway proxy events into [`RequestEnvelope`].

use crate::error::ImageError;
use axum::http::Method;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Format of `requestContext.requestTime`, e.g. `09/Apr/2015:12:34:56 +0000`
const REQUEST_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Canonical, read-only view of one inbound request
///
/// Absent or null header, parameter and query maps normalize to empty maps.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    method: Method,
    resource: String,
    path: String,
    headers: HashMap<String, String>,
    path_parameters: HashMap<String, String>,
    query_parameters: HashMap<String, String>,
    multi_value_query_parameters: HashMap<String, Vec<String>>,
    body: Option<String>,
    is_base64_encoded: bool,
    timestamp: DateTime<Utc>,
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    http_method: Option<String>,
    resource: Option<String>,
    path: Option<String>,
    headers: Option<HashMap<String, String>>,
    path_parameters: Option<HashMap<String, String>>,
    query_string_parameters: Option<HashMap<String, String>>,
    multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    #[serde(default, deserialize_with = "present")]
    body: Option<Option<String>>,
    is_base64_encoded: Option<bool>,
    request_context: Option<RawRequestContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequestContext {
    http_method: Option<String>,
    request_time: Option<String>,
    request_time_epoch: Option<i64>,
    request_id: Option<String>,
}

/// Distinguishes a `null` field (`Some(None)`) from an absent one (`None`)
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl RequestEnvelope {
    /// Map a raw trigger event onto the canonical request shape
    ///
    /// The event must carry an HTTP method (top level or in
    /// `requestContext`), a resource template and a `body` field, which may
    /// be null.
    pub fn from_event(event: serde_json::Value) -> Result<Self, ImageError> {
        let raw: RawEvent = serde_json::from_value(event)
            .map_err(|e| ImageError::MalformedRequest(e.to_string()))?;

        let context = raw.request_context;

        let method_name = raw
            .http_method
            .or_else(|| context.as_ref().and_then(|c| c.http_method.clone()))
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ImageError::MalformedRequest("missing httpMethod".to_string()))?;

        let method = Method::from_bytes(method_name.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                ImageError::MalformedRequest(format!("invalid httpMethod '{}'", method_name))
            })?;

        let resource = raw
            .resource
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ImageError::MalformedRequest("missing resource".to_string()))?;

        let body = raw
            .body
            .ok_or_else(|| ImageError::MalformedRequest("missing body".to_string()))?;

        let timestamp = match context.as_ref() {
            Some(c) => request_timestamp(c)?,
            None => Utc::now(),
        };

        Ok(Self {
            method,
            path: raw.path.unwrap_or_else(|| resource.clone()),
            resource,
            headers: raw.headers.unwrap_or_default(),
            path_parameters: raw.path_parameters.unwrap_or_default(),
            query_parameters: raw.query_string_parameters.unwrap_or_default(),
            multi_value_query_parameters: raw.multi_value_query_string_parameters.unwrap_or_default(),
            body,
            is_base64_encoded: raw.is_base64_encoded.unwrap_or(false),
            timestamp,
            request_id: context.and_then(|c| c.request_id),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Route template, e.g. `/images/{id}`
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Concrete request path, e.g. `/images/abc123`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header by its exact key, then case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn path_parameters(&self) -> &HashMap<String, String> {
        &self.path_parameters
    }

    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters.get(name).map(String::as_str)
    }

    pub fn query_parameters(&self) -> &HashMap<String, String> {
        &self.query_parameters
    }

    pub fn multi_value_query_parameters(&self) -> &HashMap<String, Vec<String>> {
        &self.multi_value_query_parameters
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn is_base64_encoded(&self) -> bool {
        self.is_base64_encoded
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

fn request_timestamp(context: &RawRequestContext) -> Result<DateTime<Utc>, ImageError> {
    if let Some(ref request_time) = context.request_time {
        return DateTime::parse_from_str(request_time, REQUEST_TIME_FORMAT)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                ImageError::MalformedRequest(format!(
                    "invalid requestTime '{}': {}",
                    request_time, e
                ))
            });
    }

    if let Some(epoch_millis) = context.request_time_epoch {
        return Utc.timestamp_millis_opt(epoch_millis).single().ok_or_else(|| {
            ImageError::MalformedRequest(format!("invalid requestTimeEpoch {}", epoch_millis))
        });
    }

    Ok(Utc::now())
}
