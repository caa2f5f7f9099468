//! HTTP adapter for running the service outside Lambda.
//!
//! Requests are rewritten into API gateway proxy events and go through
//! [`ImagesApi::handle_event`], the same path Lambda invocations take.

use crate::config::ApiConfig;
use crate::handlers::{ImagesApi, COLLECTION_RESOURCE, ID_PARAMETER, ITEM_RESOURCE};
use crate::response::ResponseEnvelope;
use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the API router
pub fn create_router(api: Arc<ImagesApi>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/images", any(collection))
        .route("/images/:id", any(item))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "images-service"
    }))
}

async fn collection(
    State(api): State<Arc<ImagesApi>>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = proxy_event(
        COLLECTION_RESOURCE,
        "/images",
        HashMap::new(),
        &method,
        query,
        &headers,
        &body,
    );

    into_http_response(api.handle_event(event).await)
}

async fn item(
    State(api): State<Arc<ImagesApi>>,
    Path(id): Path<String>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/images/{}", id);
    let path_parameters = HashMap::from([(ID_PARAMETER.to_string(), id)]);

    let event = proxy_event(
        ITEM_RESOURCE,
        &path,
        path_parameters,
        &method,
        query,
        &headers,
        &body,
    );

    into_http_response(api.handle_event(event).await)
}

/// Build the proxy event API gateway would deliver for this request
///
/// UTF-8 bodies are passed through as text; anything else is base64-encoded
/// and flagged, as API gateway does for binary media types.
fn proxy_event(
    resource: &str,
    path: &str,
    path_parameters: HashMap<String, String>,
    method: &Method,
    query: Vec<(String, String)>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Value {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (canonical_header_name(name.as_str()), v.to_string()))
        })
        .collect();

    let mut single_query = HashMap::new();
    let mut multi_query: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in query {
        multi_query.entry(key.clone()).or_default().push(value.clone());
        single_query.insert(key, value);
    }

    let (body, is_base64_encoded) = if body.is_empty() {
        (Value::Null, false)
    } else {
        match std::str::from_utf8(body) {
            Ok(text) => (Value::String(text.to_string()), false),
            Err(_) => (Value::String(STANDARD.encode(body)), true),
        }
    };

    let path_parameters = non_empty(json!(path_parameters));
    let single_query = non_empty(json!(single_query));
    let multi_query = non_empty(json!(multi_query));
    let now = Utc::now();

    json!({
        "resource": resource,
        "path": path,
        "httpMethod": method.as_str(),
        "headers": headers,
        "pathParameters": path_parameters,
        "queryStringParameters": single_query,
        "multiValueQueryStringParameters": multi_query,
        "body": body,
        "isBase64Encoded": is_base64_encoded,
        "requestContext": {
            "httpMethod": method.as_str(),
            "requestTimeEpoch": now.timestamp_millis(),
        }
    })
}

/// API gateway sends null rather than `{}` for empty maps
fn non_empty(map: Value) -> Value {
    match map {
        Value::Object(ref fields) if fields.is_empty() => Value::Null,
        other => other,
    }
}

/// `content-type` -> `Content-Type`, matching what API gateway forwards
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn into_http_response(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (name, value) in &envelope.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Body::from(envelope.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Start the local HTTP server and serve until SIGINT/SIGTERM
pub async fn start_api_server(api: Arc<ImagesApi>, config: &ApiConfig) -> Result<()> {
    let router = create_router(api);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting images HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Images HTTP server stopped");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
