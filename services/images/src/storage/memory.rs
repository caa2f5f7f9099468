//! In-process backends for local runs and tests.
//!
//! Everything is held in [`DashMap`]s; the async trait methods never wait.

use super::{
    expiry_from_now, AccessUrlIssuer, MetadataStore, ObjectStore, ObjectVisibility, PresignedUrl,
    StorageError,
};
use crate::image::ImageRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Blob held by [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub visibility: ObjectVisibility,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|object| object.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        visibility: ObjectVisibility,
    ) -> Result<(), StorageError> {
        self.objects.insert(
            key.to_owned(),
            StoredObject {
                body,
                content_type: content_type.to_owned(),
                visibility,
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.objects.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: DashMap<String, ImageRecord>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, id: &str) -> Result<ImageRecord, StorageError> {
        self.records
            .get(id)
            .map(|record| record.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_owned()))
    }

    async fn put(&self, record: &ImageRecord) -> Result<(), StorageError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.records.remove(id);
        Ok(())
    }
}

/// Issues unsigned `memory://` URLs
///
/// A per-issuer counter is embedded so repeated issues for the same key
/// yield distinct strings, as real signatures do.
#[derive(Debug, Default)]
pub struct MemoryUrlIssuer {
    issued: AtomicU64,
}

impl MemoryUrlIssuer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessUrlIssuer for MemoryUrlIssuer {
    async fn issue(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let expires_at = expiry_from_now(ttl)?;
        let nonce = self.issued.fetch_add(1, Ordering::Relaxed);

        Ok(PresignedUrl {
            url: format!(
                "memory://{}/{}?expires={}&nonce={}",
                bucket,
                key,
                expires_at.timestamp(),
                nonce
            ),
            expires_at,
        })
    }
}
