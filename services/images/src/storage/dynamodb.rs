use super::{MetadataStore, StorageError};
use crate::config::DynamoConfig;
use crate::format::ImageFormat;
use crate::image::ImageRecord;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

const ATTR_ID: &str = "id";
const ATTR_NAME: &str = "name";
const ATTR_FORMAT: &str = "format";
const ATTR_S3_KEY: &str = "s3_key";

/// Build a DynamoDB client, optionally pointed at DynamoDB Local
pub async fn build_client(config: &DynamoConfig) -> Client {
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;

    let mut builder = aws_sdk_dynamodb::config::Builder::from(&aws_config);

    if let Some(ref endpoint_url) = config.endpoint_url {
        builder = builder.endpoint_url(endpoint_url);
    }

    Client::from_conf(builder.build())
}

/// DynamoDB-backed implementation of [`MetadataStore`].
///
/// One item per image, partition key `id`, with flat string attributes
/// `name`, `format` and `s3_key`.
pub struct DynamoMetadataStore {
    client: Client,
    table_name: String,
}

impl DynamoMetadataStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();

        info!(table = %table_name, "DynamoDB metadata store initialized");

        Self { client, table_name }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl MetadataStore for DynamoMetadataStore {
    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn get(&self, id: &str) -> Result<ImageRecord, StorageError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_owned()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                operation: "get_item",
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let Some(item) = result.item() else {
            return Err(StorageError::NotFound(id.to_owned()));
        };

        record_from_item(item)
    }

    #[instrument(skip(self, record), fields(table = %self.table_name, image_id = %record.id))]
    async fn put(&self, record: &ImageRecord) -> Result<(), StorageError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_from_record(record)))
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                operation: "put_item",
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(image_id = %record.id, "Metadata record written");
        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        // DeleteItem on a missing key is a no-op.
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(id.to_owned()))
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                operation: "delete_item",
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(image_id = %id, "Metadata record deleted");
        Ok(())
    }
}

fn item_from_record(record: &ImageRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (ATTR_ID.to_owned(), AttributeValue::S(record.id.clone())),
        (ATTR_NAME.to_owned(), AttributeValue::S(record.name.clone())),
        (
            ATTR_FORMAT.to_owned(),
            AttributeValue::S(record.format.as_str().to_owned()),
        ),
        (ATTR_S3_KEY.to_owned(), AttributeValue::S(record.s3_key.clone())),
    ])
}

fn record_from_item(item: &HashMap<String, AttributeValue>) -> Result<ImageRecord, StorageError> {
    let format = string_attr(item, ATTR_FORMAT)?
        .parse::<ImageFormat>()
        .map_err(|e| StorageError::Backend {
            operation: "get_item",
            message: format!("invalid format attribute: {}", e),
        })?;

    Ok(ImageRecord {
        id: string_attr(item, ATTR_ID)?,
        name: string_attr(item, ATTR_NAME)?,
        format,
        s3_key: string_attr(item, ATTR_S3_KEY)?,
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<String, StorageError> {
    match item.get(name) {
        Some(AttributeValue::S(value)) => Ok(value.clone()),
        _ => Err(StorageError::Backend {
            operation: "get_item",
            message: format!("record is missing string attribute '{}'", name),
        }),
    }
}
