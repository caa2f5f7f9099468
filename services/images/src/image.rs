//! Image lifecycle: a blob in the object store paired with one metadata
//! record, read back through freshly issued access URLs.
//!
//! Writes and deletes touch two independent stores and are ordered, not
//! atomic:
//!
//! - create writes the blob, then the record, then issues the access URL.
//!   If the record write is rejected the blob is deleted again; if it times
//!   out the write may still land, so the blob is kept. If signing fails the
//!   record is deleted, then the blob. Cleanup is best effort: a crash or a
//!   failed cleanup leaves an orphan blob, never a record without a blob.
//! - delete removes the blob, then the record. A failure in between leaves
//!   a record whose blob is gone; a failure before the blob delete leaves
//!   both intact and the call can be retried.

use crate::error::ImageError;
use crate::format::ImageFormat;
use crate::id_generator::IdGenerator;
use crate::storage::{AccessUrlIssuer, MetadataStore, ObjectStore, ObjectVisibility, StorageError};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Metadata record persisted for every stored image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub format: ImageFormat,
    pub s3_key: String,
}

impl ImageRecord {
    pub fn new(id: String, name: String, format: ImageFormat) -> Self {
        let s3_key = storage_key(&id, format);
        Self {
            id,
            name,
            format,
            s3_key,
        }
    }
}

/// Object store key for an image: `{id}.{extension}`
pub fn storage_key(id: &str, format: ImageFormat) -> String {
    format!("{}.{}", id, format.extension())
}

/// Image representation returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    pub id: String,
    pub name: String,
    pub format: ImageFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl ImagePayload {
    fn from_record(record: &ImageRecord, uri: Option<String>) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            format: record.format,
            uri,
        }
    }
}

/// Tunables for [`ImageManager`]
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Bucket named in issued access URLs
    pub bucket: String,
    pub url_ttl: Duration,
    /// Upper bound for each individual store or issuer call
    pub call_timeout: Duration,
    pub visibility: ObjectVisibility,
    pub id_generator: IdGenerator,
}

impl ManagerSettings {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            url_ttl: Duration::from_secs(3600),
            call_timeout: Duration::from_secs(10),
            visibility: ObjectVisibility::default(),
            id_generator: IdGenerator::default(),
        }
    }
}

/// Create/read/delete operations over stored images
pub struct ImageManager {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    issuer: Arc<dyn AccessUrlIssuer>,
    settings: ManagerSettings,
}

impl ImageManager {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        issuer: Arc<dyn AccessUrlIssuer>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            objects,
            metadata,
            issuer,
            settings,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Store a new image and return it with an access URL
    ///
    /// Every call assigns a fresh id, so retrying a failed create never
    /// reuses the earlier attempt's id.
    #[instrument(skip(self, encoded_image), fields(payload_len = encoded_image.len()))]
    pub async fn create(
        &self,
        name: &str,
        content_type: &str,
        encoded_image: &str,
    ) -> Result<ImagePayload, ImageError> {
        let missing: Vec<&str> = [
            ("name", name),
            ("format", content_type),
            ("image", encoded_image),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();

        if !missing.is_empty() {
            return Err(ImageError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let format = ImageFormat::from_content_type(content_type)?;
        // Line-wrapped base64 (as printed by `base64 <file>`) is accepted.
        let compact: String = encoded_image.split_ascii_whitespace().collect();
        let image_data = STANDARD
            .decode(compact)
            .map_err(|e| ImageError::Decoding(e.to_string()))?;

        let record = ImageRecord::new(
            self.settings.id_generator.generate(),
            name.to_string(),
            format,
        );

        debug!(
            image_id = %record.id,
            s3_key = %record.s3_key,
            size_bytes = image_data.len(),
            "Storing image"
        );

        self.bounded(
            "put_object",
            self.objects.put_object(
                &record.s3_key,
                image_data,
                format.content_type(),
                self.settings.visibility,
            ),
        )
        .await?;

        if let Err(e) = self.bounded("put_item", self.metadata.put(&record)).await {
            if matches!(e, ImageError::Timeout { .. }) {
                warn!(
                    image_id = %record.id,
                    s3_key = %record.s3_key,
                    "Metadata write timed out, keeping uploaded blob"
                );
            } else {
                self.compensate_orphan_blob(&record).await;
            }
            return Err(e);
        }

        // The caller never learns the id without a URL, so an unsigned
        // image is rolled back rather than left unreachable.
        let uri = match self.issue_url(&record).await {
            Ok(uri) => uri,
            Err(e) => {
                self.compensate_unsigned_image(&record).await;
                return Err(e);
            }
        };

        info!(image_id = %record.id, format = %record.format, "Image created");
        metrics::counter!("images.created").increment(1);

        Ok(ImagePayload::from_record(&record, Some(uri)))
    }

    /// Load an image and issue a fresh access URL for it
    #[instrument(skip(self))]
    pub async fn read(&self, id: &str) -> Result<ImagePayload, ImageError> {
        let record = self.bounded("get_item", self.metadata.get(id)).await?;
        let uri = self.issue_url(&record).await?;

        metrics::counter!("images.read").increment(1);

        Ok(ImagePayload::from_record(&record, Some(uri)))
    }

    /// Remove an image's blob, then its record
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), ImageError> {
        let record = self.bounded("get_item", self.metadata.get(id)).await?;

        self.bounded("delete_object", self.objects.delete_object(&record.s3_key))
            .await?;

        if let Err(e) = self.bounded("delete_item", self.metadata.delete(id)).await {
            warn!(
                image_id = %id,
                s3_key = %record.s3_key,
                error = %e,
                "Blob deleted but metadata record remains"
            );
            return Err(e);
        }

        info!(image_id = %id, "Image deleted");
        metrics::counter!("images.deleted").increment(1);

        Ok(())
    }

    /// Listing images
    pub async fn list(&self) -> Result<Vec<ImagePayload>, ImageError> {
        Err(ImageError::NotImplemented("Listing images".to_string()))
    }

    /// Replacing an image
    pub async fn replace(&self, _id: &str) -> Result<ImagePayload, ImageError> {
        Err(ImageError::NotImplemented("Replacing an image".to_string()))
    }

    /// Partially updating an image
    pub async fn patch(&self, _id: &str) -> Result<ImagePayload, ImageError> {
        Err(ImageError::NotImplemented("Updating an image".to_string()))
    }

    async fn issue_url(&self, record: &ImageRecord) -> Result<String, ImageError> {
        let presigned = self
            .bounded(
                "presign",
                self.issuer
                    .issue(&self.settings.bucket, &record.s3_key, self.settings.url_ttl),
            )
            .await
            .map_err(|e| {
                error!(image_id = %record.id, error = %e, "Failed to issue access URL");
                e
            })?;

        Ok(presigned.url)
    }

    async fn compensate_orphan_blob(&self, record: &ImageRecord) {
        match self
            .bounded("delete_object", self.objects.delete_object(&record.s3_key))
            .await
        {
            Ok(()) => {
                warn!(
                    image_id = %record.id,
                    s3_key = %record.s3_key,
                    "Metadata write failed, removed uploaded blob"
                );
                metrics::counter!("images.create.compensated").increment(1);
            }
            Err(e) => {
                error!(
                    image_id = %record.id,
                    s3_key = %record.s3_key,
                    error = %e,
                    "Metadata write failed and blob cleanup failed, blob is orphaned"
                );
            }
        }
    }

    async fn compensate_unsigned_image(&self, record: &ImageRecord) {
        if let Err(e) = self
            .bounded("delete_item", self.metadata.delete(&record.id))
            .await
        {
            error!(
                image_id = %record.id,
                s3_key = %record.s3_key,
                error = %e,
                "Signing failed and record cleanup failed, image is unreachable"
            );
            return;
        }

        match self
            .bounded("delete_object", self.objects.delete_object(&record.s3_key))
            .await
        {
            Ok(()) => {
                warn!(
                    image_id = %record.id,
                    s3_key = %record.s3_key,
                    "Signing failed, removed record and uploaded blob"
                );
                metrics::counter!("images.create.compensated").increment(1);
            }
            Err(e) => {
                error!(
                    image_id = %record.id,
                    s3_key = %record.s3_key,
                    error = %e,
                    "Signing failed and blob cleanup failed, blob is orphaned"
                );
            }
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ImageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result.map_err(ImageError::from),
            Err(_) => Err(ImageError::Timeout {
                operation,
                timeout: self.settings.call_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        MemoryMetadataStore, MemoryObjectStore, MemoryUrlIssuer, MockAccessUrlIssuer,
        MockMetadataStore, MockObjectStore,
    };
    use async_trait::async_trait;

    const PNG_DATA_B64: &str = "UE5HREFUQQ=="; // "PNGDATA"

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        metadata: Arc<MemoryMetadataStore>,
        manager: ImageManager,
    }

    fn harness() -> Harness {
        let objects = Arc::new(MemoryObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let manager = ImageManager::new(
            objects.clone(),
            metadata.clone(),
            Arc::new(MemoryUrlIssuer::new()),
            ManagerSettings::new("image-bucket"),
        );

        Harness {
            objects,
            metadata,
            manager,
        }
    }

    fn uri_path(uri: &str) -> &str {
        uri.split('?').next().unwrap()
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key("abc", ImageFormat::Png), "abc.png");
        assert_eq!(storage_key("abc", ImageFormat::Jpg), "abc.jpg");

        let record = ImageRecord::new("xyz".to_string(), "dog".to_string(), ImageFormat::Gif);
        assert_eq!(record.s3_key, "xyz.gif");
    }

    #[test]
    fn test_payload_omits_missing_uri() {
        let record = ImageRecord::new("abc".to_string(), "cat".to_string(), ImageFormat::Png);
        let json = serde_json::to_value(ImagePayload::from_record(&record, None)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"id": "abc", "name": "cat", "format": "PNG"})
        );
    }

    #[tokio::test]
    async fn test_create_read_delete_lifecycle() {
        let h = harness();

        let created = h.manager.create("cat", "image/png", PNG_DATA_B64).await.unwrap();
        assert_eq!(created.id.len(), 16);
        assert_eq!(created.name, "cat");
        assert_eq!(created.format, ImageFormat::Png);
        let created_uri = created.uri.clone().unwrap();
        assert!(uri_path(&created_uri).ends_with(&format!("{}.png", created.id)));

        let stored = h.objects.get(&format!("{}.png", created.id)).unwrap();
        assert_eq!(stored.body, b"PNGDATA".to_vec());
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.visibility, ObjectVisibility::Private);

        let read = h.manager.read(&created.id).await.unwrap();
        assert_eq!(read.id, created.id);
        assert_eq!(read.name, created.name);
        assert_eq!(read.format, created.format);
        assert!(read.uri.is_some());

        h.manager.delete(&created.id).await.unwrap();
        assert!(h.objects.is_empty());
        assert!(h.metadata.is_empty());

        assert!(matches!(
            h.manager.read(&created.id).await,
            Err(ImageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_each_read_issues_a_new_url() {
        let h = harness();
        let created = h.manager.create("cat", "image/png", PNG_DATA_B64).await.unwrap();

        let first = h.manager.read(&created.id).await.unwrap().uri.unwrap();
        let second = h.manager.read(&created.id).await.unwrap().uri.unwrap();

        assert_ne!(first, second);
        assert_eq!(uri_path(&first), uri_path(&second));
    }

    #[tokio::test]
    async fn test_create_assigns_distinct_ids() {
        let h = harness();

        let first = h.manager.create("cat", "image/png", PNG_DATA_B64).await.unwrap();
        let second = h.manager.create("cat", "image/png", PNG_DATA_B64).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(h.metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_create_requires_all_inputs() {
        let h = harness();

        match h.manager.create("", "image/png", "").await {
            Err(ImageError::Validation(message)) => {
                assert!(message.contains("name"));
                assert!(message.contains("image"));
                assert!(!message.contains("format"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        assert!(h.objects.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unsupported_format() {
        let h = harness();

        assert!(matches!(
            h.manager.create("doc", "application/pdf", PNG_DATA_B64).await,
            Err(ImageError::UnsupportedFormat(_))
        ));
        assert!(h.objects.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_base64() {
        let h = harness();

        assert!(matches!(
            h.manager.create("cat", "image/png", "not base64!!").await,
            Err(ImageError::Decoding(_))
        ));
        assert!(h.objects.is_empty());
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_create_honours_public_visibility() {
        let objects = Arc::new(MemoryObjectStore::new());
        let mut settings = ManagerSettings::new("image-bucket");
        settings.visibility = ObjectVisibility::PublicRead;

        let manager = ImageManager::new(
            objects.clone(),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryUrlIssuer::new()),
            settings,
        );

        let created = manager.create("cat", "image/jpeg", PNG_DATA_B64).await.unwrap();
        let stored = objects.get(&format!("{}.jpg", created.id)).unwrap();

        assert_eq!(stored.visibility, ObjectVisibility::PublicRead);
        assert_eq!(created.format, ImageFormat::Jpg);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let h = harness();

        assert!(matches!(
            h.manager.read("never-created").await,
            Err(ImageError::NotFound(_))
        ));
        assert!(matches!(
            h.manager.delete("never-created").await,
            Err(ImageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_delete_is_not_found() {
        let h = harness();
        let created = h.manager.create("cat", "image/png", PNG_DATA_B64).await.unwrap();

        h.manager.delete(&created.id).await.unwrap();

        assert!(matches!(
            h.manager.delete(&created.id).await,
            Err(ImageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_placeholders_are_not_implemented() {
        let h = harness();

        assert!(matches!(h.manager.list().await, Err(ImageError::NotImplemented(_))));
        assert!(matches!(
            h.manager.replace("abc").await,
            Err(ImageError::NotImplemented(_))
        ));
        assert!(matches!(
            h.manager.patch("abc").await,
            Err(ImageError::NotImplemented(_))
        ));
    }

    #[tokio::test]
    async fn test_signing_failure_is_surfaced() {
        let mut issuer = MockAccessUrlIssuer::new();
        issuer
            .expect_issue()
            .returning(|_, _, _| Err(StorageError::Signing("no credentials".to_string())));

        let metadata = Arc::new(MemoryMetadataStore::new());
        metadata
            .put(&ImageRecord::new(
                "abc".to_string(),
                "cat".to_string(),
                ImageFormat::Png,
            ))
            .await
            .unwrap();

        let manager = ImageManager::new(
            Arc::new(MemoryObjectStore::new()),
            metadata,
            Arc::new(issuer),
            ManagerSettings::new("image-bucket"),
        );

        assert!(matches!(
            manager.read("abc").await,
            Err(ImageError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_metadata_write_removes_blob() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_put_object()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        objects
            .expect_delete_object()
            .withf(|key: &str| key.ends_with(".png"))
            .times(1)
            .returning(|_| Ok(()));

        let mut metadata = MockMetadataStore::new();
        metadata.expect_put().times(1).returning(|_| {
            Err(StorageError::Backend {
                operation: "put_item",
                message: "throttled".to_string(),
            })
        });

        let mut issuer = MockAccessUrlIssuer::new();
        issuer.expect_issue().never();

        let manager = ImageManager::new(
            Arc::new(objects),
            Arc::new(metadata),
            Arc::new(issuer),
            ManagerSettings::new("image-bucket"),
        );

        assert!(matches!(
            manager.create("cat", "image/png", PNG_DATA_B64).await,
            Err(ImageError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_blob_write_skips_metadata() {
        let mut objects = MockObjectStore::new();
        objects.expect_put_object().times(1).returning(|_, _, _, _| {
            Err(StorageError::Backend {
                operation: "put_object",
                message: "access denied".to_string(),
            })
        });
        objects.expect_delete_object().never();

        let mut metadata = MockMetadataStore::new();
        metadata.expect_put().never();

        let manager = ImageManager::new(
            Arc::new(objects),
            Arc::new(metadata),
            Arc::new(MemoryUrlIssuer::new()),
            ManagerSettings::new("image-bucket"),
        );

        assert!(matches!(
            manager.create("cat", "image/png", PNG_DATA_B64).await,
            Err(ImageError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_blob_delete_keeps_record() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        metadata
            .put(&ImageRecord::new(
                "abc".to_string(),
                "cat".to_string(),
                ImageFormat::Png,
            ))
            .await
            .unwrap();

        let mut objects = MockObjectStore::new();
        objects.expect_delete_object().times(1).returning(|_| {
            Err(StorageError::Backend {
                operation: "delete_object",
                message: "unavailable".to_string(),
            })
        });

        let manager = ImageManager::new(
            Arc::new(objects),
            metadata.clone(),
            Arc::new(MemoryUrlIssuer::new()),
            ManagerSettings::new("image-bucket"),
        );

        assert!(manager.delete("abc").await.is_err());
        assert_eq!(metadata.len(), 1);
    }

    #[tokio::test]
    async fn test_create_accepts_line_wrapped_base64() {
        let h = harness();
        let image: Vec<u8> = (0u8..60).collect();

        let encoded = STANDARD.encode(&image);
        assert_eq!(encoded.len(), 80);
        let wrapped = format!("{}\n{}\n", &encoded[..76], &encoded[76..]);

        let created = h.manager.create("cat", "image/png", &wrapped).await.unwrap();

        let stored = h.objects.get(&format!("{}.png", created.id)).unwrap();
        assert_eq!(stored.body, image);
    }

    #[tokio::test]
    async fn test_create_signing_failure_removes_image() {
        let objects = Arc::new(MemoryObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());

        let mut issuer = MockAccessUrlIssuer::new();
        issuer
            .expect_issue()
            .times(1)
            .returning(|_, _, _| Err(StorageError::Signing("no credentials".to_string())));

        let manager = ImageManager::new(
            objects.clone(),
            metadata.clone(),
            Arc::new(issuer),
            ManagerSettings::new("image-bucket"),
        );

        assert!(matches!(
            manager.create("cat", "image/png", PNG_DATA_B64).await,
            Err(ImageError::Signing(_))
        ));
        assert!(objects.is_empty());
        assert!(metadata.is_empty());
    }

    struct StalledMetadataStore;

    #[async_trait]
    impl MetadataStore for StalledMetadataStore {
        async fn get(&self, id: &str) -> Result<ImageRecord, StorageError> {
            Err(StorageError::NotFound(id.to_string()))
        }

        async fn put(&self, _record: &ImageRecord) -> Result<(), StorageError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn delete(&self, _id: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_metadata_timeout_keeps_blob() {
        let objects = Arc::new(MemoryObjectStore::new());
        let mut settings = ManagerSettings::new("image-bucket");
        settings.call_timeout = Duration::from_millis(50);

        let manager = ImageManager::new(
            objects.clone(),
            Arc::new(StalledMetadataStore),
            Arc::new(MemoryUrlIssuer::new()),
            settings,
        );

        match manager.create("cat", "image/png", PNG_DATA_B64).await {
            Err(ImageError::Timeout { operation, timeout }) => {
                assert_eq!(operation, "put_item");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
        assert_eq!(objects.len(), 1);
    }

    struct StalledObjectStore;

    #[async_trait]
    impl ObjectStore for StalledObjectStore {
        async fn put_object(
            &self,
            _key: &str,
            _body: Vec<u8>,
            _content_type: &str,
            _visibility: ObjectVisibility,
        ) -> Result<(), StorageError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn delete_object(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_call_timeout() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let mut settings = ManagerSettings::new("image-bucket");
        settings.call_timeout = Duration::from_millis(50);

        let manager = ImageManager::new(
            Arc::new(StalledObjectStore),
            metadata.clone(),
            Arc::new(MemoryUrlIssuer::new()),
            settings,
        );

        match manager.create("cat", "image/png", PNG_DATA_B64).await {
            Err(ImageError::Timeout { operation, .. }) => assert_eq!(operation, "put_object"),
            other => panic!("Expected timeout, got {:?}", other),
        }
        assert!(metadata.is_empty());
    }
}
