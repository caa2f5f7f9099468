//! Images Service
//!
//! Back end for an image drive. Each invocation arrives as an API gateway
//! proxy event, is normalized into a [`RequestEnvelope`], routed by
//! `(resource, method)` to one handler and answered with a JSON
//! [`ResponseEnvelope`].
//!
//! ## Features
//!
//! - **Declarative Routing**: a route table validated once at startup, with
//!   distinct errors for unknown resources and unsupported methods
//! - **Image Lifecycle**: create, read and delete across a blob store and a
//!   metadata store, with a compensating delete when metadata writes fail
//! - **Presigned Access**: every payload carries a freshly signed,
//!   time-limited URL
//! - **Pluggable Backends**: S3 and DynamoDB in production, in-memory stores
//!   for local runs and tests
//!
//! ## Architecture
//!
//! ```text
//! Lambda event / local HTTP
//!        │
//!        ▼
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ Request      │─────▶│ Router       │─────▶│ Handlers     │
//! │ Envelope     │      │ (res, meth)  │      │ /images      │
//! └──────────────┘      └──────────────┘      └──────────────┘
//!                                                    │
//!                                                    ▼
//!                                             ┌──────────────┐
//!                                             │ Image        │
//!                                             │ Manager      │
//!                                             └──────────────┘
//!                                   ┌────────────────┼────────────────┐
//!                                   ▼                ▼                ▼
//!                            ┌────────────┐   ┌────────────┐   ┌────────────┐
//!                            │ Object     │   │ Metadata   │   │ Access URL │
//!                            │ Store (S3) │   │ Store (DDB)│   │ Issuer     │
//!                            └────────────┘   └────────────┘   └────────────┘
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod handlers;
pub mod id_generator;
pub mod image;
pub mod local_server;
pub mod request;
pub mod response;
pub mod router;
pub mod storage;

pub use config::{Backend, Config, RunMode};
pub use error::{ErrorResponse, ImageError};
pub use format::ImageFormat;
pub use handlers::ImagesApi;
pub use id_generator::IdGenerator;
pub use image::{ImageManager, ImagePayload, ImageRecord, ManagerSettings};
pub use request::RequestEnvelope;
pub use response::ResponseEnvelope;
pub use router::{Handler, Route, RouteTableError, Router};
pub use storage::{AccessUrlIssuer, MetadataStore, ObjectStore, ObjectVisibility, StorageError};
