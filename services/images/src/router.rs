//! Two-level `(resource, method)` dispatch over a route table built once at
//! startup and read-only afterwards.

use crate::error::ImageError;
use crate::request::RequestEnvelope;
use crate::response::ResponseEnvelope;
use axum::http::Method;
use futures::future::BoxFuture;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type HandlerFuture<'a> = BoxFuture<'a, Result<ResponseEnvelope, ImageError>>;

/// Handler function receiving the shared state and the request
pub type Handler<S> = for<'a> fn(&'a S, &'a RequestEnvelope) -> HandlerFuture<'a>;

/// One row of a declarative route table
pub struct Route<S> {
    pub resource: &'static str,
    pub method: Method,
    pub handler: Handler<S>,
}

impl<S> Route<S> {
    pub fn new(resource: &'static str, method: Method, handler: Handler<S>) -> Self {
        Self {
            resource,
            method,
            handler,
        }
    }
}

/// Problems found while validating a route table
#[derive(Error, Debug, PartialEq)]
pub enum RouteTableError {
    #[error("Route table is empty")]
    Empty,

    #[error("Resource path must start with '/': {0}")]
    InvalidResource(String),

    #[error("Duplicate route: {method} {resource}")]
    Duplicate { resource: String, method: String },
}

pub struct Router<S> {
    routes: HashMap<String, HashMap<Method, Handler<S>>>,
}

impl<S> Router<S> {
    /// Build the router, rejecting empty tables, relative resources and
    /// duplicate `(resource, method)` pairs
    pub fn from_table(table: Vec<Route<S>>) -> Result<Self, RouteTableError> {
        if table.is_empty() {
            return Err(RouteTableError::Empty);
        }

        let mut routes: HashMap<String, HashMap<Method, Handler<S>>> = HashMap::new();

        for route in table {
            if !route.resource.starts_with('/') {
                return Err(RouteTableError::InvalidResource(route.resource.to_string()));
            }

            let methods = routes.entry(route.resource.to_string()).or_default();
            if methods.contains_key(&route.method) {
                return Err(RouteTableError::Duplicate {
                    resource: route.resource.to_string(),
                    method: route.method.to_string(),
                });
            }
            methods.insert(route.method, route.handler);
        }

        Ok(Self { routes })
    }

    /// Find the handler for a request, distinguishing unknown resources from
    /// unsupported methods on a known resource
    pub fn resolve(&self, resource: &str, method: &Method) -> Result<Handler<S>, ImageError> {
        let methods = self
            .routes
            .get(resource)
            .ok_or_else(|| ImageError::RouteNotFound {
                resource: resource.to_string(),
                method: method.to_string(),
                resource_registered: false,
            })?;

        methods
            .get(method)
            .copied()
            .ok_or_else(|| ImageError::RouteNotFound {
                resource: resource.to_string(),
                method: method.to_string(),
                resource_registered: true,
            })
    }

    /// Route the request to exactly one handler and return its response
    pub async fn dispatch(
        &self,
        state: &S,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, ImageError> {
        let handler = match self.resolve(request.resource(), request.method()) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(
                    resource = %request.resource(),
                    method = %request.method(),
                    "Request rejected: no matching route"
                );
                metrics::counter!("dispatch.rejected").increment(1);
                return Err(e);
            }
        };

        debug!(
            resource = %request.resource(),
            method = %request.method(),
            "Request routed"
        );

        let response = handler(state, request).await?;

        info!(
            resource = %request.resource(),
            method = %request.method(),
            status = response.status_code,
            "Request completed"
        );

        Ok(response)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn methods(&self, resource: &str) -> Vec<Method> {
        self.routes
            .get(resource)
            .map(|methods| methods.keys().cloned().collect())
            .unwrap_or_default()
    }
}
