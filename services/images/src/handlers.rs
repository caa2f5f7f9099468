//! The `/images` route table and its handlers.

use crate::error::ImageError;
use crate::image::ImageManager;
use crate::request::RequestEnvelope;
use crate::response::ResponseEnvelope;
use crate::router::{HandlerFuture, Route, RouteTableError, Router};
use axum::http::{Method, StatusCode};
use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};

pub const COLLECTION_RESOURCE: &str = "/images";
pub const ITEM_RESOURCE: &str = "/images/{id}";
pub const ID_PARAMETER: &str = "id";
pub const NAME_HEADER: &str = "Image-Name";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

pub fn image_routes() -> Vec<Route<ImageManager>> {
    vec![
        Route::new(COLLECTION_RESOURCE, Method::GET, list_images),
        Route::new(COLLECTION_RESOURCE, Method::POST, create_image),
        Route::new(ITEM_RESOURCE, Method::GET, get_image),
        Route::new(ITEM_RESOURCE, Method::PUT, replace_image),
        Route::new(ITEM_RESOURCE, Method::PATCH, patch_image),
        Route::new(ITEM_RESOURCE, Method::DELETE, delete_image),
    ]
}

/// GET /images
fn list_images<'a>(manager: &'a ImageManager, _request: &'a RequestEnvelope) -> HandlerFuture<'a> {
    Box::pin(async move {
        let images = manager.list().await?;
        ResponseEnvelope::json(StatusCode::OK, &images)
    })
}

/// POST /images
///
/// The display name comes from the `Image-Name` header, the format from
/// `Content-Type` and the base64-encoded image from the body.
fn create_image<'a>(manager: &'a ImageManager, request: &'a RequestEnvelope) -> HandlerFuture<'a> {
    Box::pin(async move {
        let image = manager
            .create(
                request.header(NAME_HEADER).unwrap_or_default(),
                request.header(CONTENT_TYPE_HEADER).unwrap_or_default(),
                request.body().unwrap_or_default(),
            )
            .await?;

        ResponseEnvelope::json(StatusCode::CREATED, &image)
    })
}

/// GET /images/{id}
fn get_image<'a>(manager: &'a ImageManager, request: &'a RequestEnvelope) -> HandlerFuture<'a> {
    Box::pin(async move {
        let image = manager.read(item_id(request)?).await?;
        ResponseEnvelope::json(StatusCode::OK, &image)
    })
}

/// PUT /images/{id}
fn replace_image<'a>(manager: &'a ImageManager, request: &'a RequestEnvelope) -> HandlerFuture<'a> {
    Box::pin(async move {
        let image = manager.replace(item_id(request)?).await?;
        ResponseEnvelope::json(StatusCode::OK, &image)
    })
}

/// PATCH /images/{id}
fn patch_image<'a>(manager: &'a ImageManager, request: &'a RequestEnvelope) -> HandlerFuture<'a> {
    Box::pin(async move {
        let image = manager.patch(item_id(request)?).await?;
        ResponseEnvelope::json(StatusCode::OK, &image)
    })
}

/// DELETE /images/{id}
fn delete_image<'a>(manager: &'a ImageManager, request: &'a RequestEnvelope) -> HandlerFuture<'a> {
    Box::pin(async move {
        manager.delete(item_id(request)?).await?;
        Ok(ResponseEnvelope::empty(StatusCode::NO_CONTENT))
    })
}

fn item_id(request: &RequestEnvelope) -> Result<&str, ImageError> {
    request
        .path_parameter(ID_PARAMETER)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ImageError::Validation(format!("missing path parameter '{}'", ID_PARAMETER)))
}

/// Entry point shared by the Lambda runtime and the local HTTP server
pub struct ImagesApi {
    router: Router<ImageManager>,
    manager: Arc<ImageManager>,
}

impl ImagesApi {
    pub fn new(manager: Arc<ImageManager>) -> Result<Self, RouteTableError> {
        Ok(Self {
            router: Router::from_table(image_routes())?,
            manager,
        })
    }

    /// Normalize a raw trigger event, dispatch it and render the outcome
    ///
    /// Never fails: every error becomes a JSON error response.
    pub async fn handle_event(&self, event: serde_json::Value) -> ResponseEnvelope {
        let request = match RequestEnvelope::from_event(event) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected malformed request event");
                metrics::counter!("dispatch.rejected").increment(1);
                return ResponseEnvelope::from_error(&e);
            }
        };

        let span = info_span!(
            "request",
            request_id = request.request_id().unwrap_or("-"),
            method = %request.method(),
            path = %request.path()
        );

        async {
            match self.router.dispatch(&self.manager, &request).await {
                Ok(response) => response,
                Err(e) => {
                    if e.status_code().is_server_error() {
                        error!(error = %e, code = e.code(), "Request failed");
                    } else {
                        warn!(error = %e, code = e.code(), "Request failed");
                    }
                    ResponseEnvelope::from_error(&e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ManagerSettings;
    use crate::storage::{MemoryMetadataStore, MemoryObjectStore, MemoryUrlIssuer};
    use serde_json::{json, Value};

    fn api() -> ImagesApi {
        let manager = ImageManager::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryUrlIssuer::new()),
            ManagerSettings::new("image-bucket"),
        );

        ImagesApi::new(Arc::new(manager)).unwrap()
    }

    fn create_event(name: &str, content_type: &str, body: &str) -> Value {
        json!({
            "resource": "/images",
            "path": "/images",
            "httpMethod": "POST",
            "headers": {"Image-Name": name, "Content-Type": content_type},
            "pathParameters": null,
            "queryStringParameters": null,
            "body": body,
            "isBase64Encoded": false,
            "requestContext": {"requestTime": "18/Oct/2026:10:00:00 +0000"}
        })
    }

    fn item_event(method: &str, id: &str) -> Value {
        json!({
            "resource": "/images/{id}",
            "path": format!("/images/{}", id),
            "httpMethod": method,
            "headers": {},
            "pathParameters": {"id": id},
            "body": null,
            "isBase64Encoded": false
        })
    }

    fn body(response: &ResponseEnvelope) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn test_route_table_is_valid() {
        let router = Router::from_table(image_routes()).unwrap();

        assert_eq!(router.methods(COLLECTION_RESOURCE).len(), 2);
        assert_eq!(router.methods(ITEM_RESOURCE).len(), 4);
    }

    #[tokio::test]
    async fn test_create_read_delete_through_dispatch() {
        let api = api();

        let created = api
            .handle_event(create_event("cat", "image/png", "UE5HREFUQQ=="))
            .await;
        assert_eq!(created.status_code, 201);
        assert_eq!(created.headers.get("Content-Type").unwrap(), "application/json");

        let created = body(&created);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 16);
        assert_eq!(created["name"], "cat");
        assert_eq!(created["format"], "PNG");
        let uri = created["uri"].as_str().unwrap();
        assert!(uri.split('?').next().unwrap().ends_with(&format!("{}.png", id)));

        let read = api.handle_event(item_event("GET", &id)).await;
        assert_eq!(read.status_code, 200);
        let read = body(&read);
        assert_eq!(read["id"], created["id"]);
        assert_eq!(read["name"], created["name"]);
        assert_eq!(read["format"], created["format"]);

        let deleted = api.handle_event(item_event("DELETE", &id)).await;
        assert_eq!(deleted.status_code, 204);
        assert!(deleted.body.is_empty());

        let missing = api.handle_event(item_event("GET", &id)).await;
        assert_eq!(missing.status_code, 404);
        assert_eq!(body(&missing)["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unimplemented_routes() {
        let api = api();

        let mut list = create_event("cat", "image/png", "");
        list["httpMethod"] = json!("GET");

        for event in [list, item_event("PUT", "abc"), item_event("PATCH", "abc")] {
            let response = api.handle_event(event).await;
            assert_eq!(response.status_code, 501);
            assert_eq!(body(&response)["code"], "NOT_IMPLEMENTED");
        }
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let api = api();

        let mut unknown_resource = item_event("GET", "abc");
        unknown_resource["resource"] = json!("/videos/{id}");
        let response = api.handle_event(unknown_resource).await;
        assert_eq!(response.status_code, 404);
        assert_eq!(body(&response)["code"], "ROUTE_NOT_FOUND");

        let response = api.handle_event(item_event("POST", "abc")).await;
        assert_eq!(response.status_code, 405);
        assert_eq!(body(&response)["code"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_malformed_event() {
        let response = api().handle_event(json!({"httpMethod": "GET"})).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response)["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        let api = api();

        let response = api.handle_event(create_event("", "image/png", "UE5HREFUQQ==")).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response)["code"], "VALIDATION_ERROR");

        let response = api
            .handle_event(create_event("doc", "application/pdf", "UE5HREFUQQ=="))
            .await;
        assert_eq!(response.status_code, 415);

        let response = api.handle_event(create_event("cat", "image/png", "%%%")).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response)["code"], "DECODING_ERROR");
    }

    #[tokio::test]
    async fn test_missing_path_parameter() {
        let mut event = item_event("GET", "abc");
        event["pathParameters"] = Value::Null;

        let response = api().handle_event(event).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response)["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_headers_match_case_insensitively() {
        let mut event = create_event("cat", "image/jpeg", "UE5HREFUQQ==");
        event["headers"] = json!({"image-name": "cat", "content-type": "image/jpeg"});

        let response = api().handle_event(event).await;

        assert_eq!(response.status_code, 201);
        assert_eq!(body(&response)["format"], "JPG");
    }
}
