//! Storage backends for image blobs, metadata records and access URLs.
//!
//! The lifecycle manager only sees the traits defined here; concrete
//! backends are chosen at startup and injected.

pub mod dynamodb;
pub mod memory;
pub mod s3;

use crate::image::ImageRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use dynamodb::DynamoMetadataStore;
pub use memory::{MemoryMetadataStore, MemoryObjectStore, MemoryUrlIssuer};
pub use s3::{S3ObjectStore, S3UrlIssuer};

/// Errors returned by storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("{0}")]
    Signing(String),
}

/// Access attribute applied to blobs at write time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectVisibility {
    #[default]
    Private,
    /// Anyone holding the object URL may read it without signing
    PublicRead,
}

/// Time-limited URL for reading a stored object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Blob store keyed by storage key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        visibility: ObjectVisibility,
    ) -> Result<(), StorageError>;

    /// Remove the object under `key`; succeeds if it does not exist
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

/// Flat record store keyed by image id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load a record, failing with [`StorageError::NotFound`] if absent
    async fn get(&self, id: &str) -> Result<ImageRecord, StorageError>;

    /// Upsert a record
    async fn put(&self, record: &ImageRecord) -> Result<(), StorageError>;

    /// Remove a record; succeeds if it does not exist
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Issues signed, time-bounded retrieval URLs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessUrlIssuer: Send + Sync {
    async fn issue(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError>;
}

/// Compute the expiry instant for a URL issued now
pub(crate) fn expiry_from_now(ttl: Duration) -> Result<DateTime<Utc>, StorageError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| StorageError::Signing(format!("Invalid URL lifetime: {}", e)))?;

    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| StorageError::Signing("URL lifetime overflows".to_string()))
}
