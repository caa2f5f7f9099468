use crate::image::ManagerSettings;
use crate::id_generator::{IdGenerator, DEFAULT_ID_LENGTH};
use crate::storage::ObjectVisibility;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Longest lifetime S3 accepts for a presigned URL
pub const MAX_PRESIGNED_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// Legacy variable naming the image bucket
const LEGACY_BUCKET_VAR: &str = "images_s3_bucket_name";
/// Legacy variable naming the metadata table
const LEGACY_TABLE_VAR: &str = "images_dynamodb_information_table";

/// Main configuration for the images service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// DynamoDB configuration
    #[serde(default)]
    pub dynamodb: DynamoConfig,
    /// Image lifecycle configuration
    #[serde(default)]
    pub images: ImagesConfig,
    /// Local HTTP server configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// How the service receives requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// AWS Lambda runtime, API gateway proxy events
    #[default]
    Lambda,
    /// Standalone HTTP server for local runs
    Http,
}

/// Which storage backends to wire up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Aws,
    /// Process-local stores, contents are lost on exit
    Memory,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub backend: Backend,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for image storage
    #[serde(default)]
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Access attribute applied to uploaded images
    #[serde(default)]
    pub object_visibility: ObjectVisibility,
}

/// DynamoDB metadata table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    /// Table holding one record per image
    #[serde(default)]
    pub table_name: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Optional endpoint URL for local development (e.g. DynamoDB Local)
    pub endpoint_url: Option<String>,
}

/// Image lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Length of generated image ids
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    /// Timeout for each storage or signing call in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

/// Local HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Prometheus exporter port, disabled when unset
    pub metrics_port: Option<u16>,
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

// Default value functions
fn default_service_name() -> String {
    "images-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    3600
}

fn default_id_length() -> usize {
    DEFAULT_ID_LENGTH
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/images").required(false))
            .add_source(config::File::with_name("/etc/image-drive/images").required(false))
            // IMAGES__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("IMAGES")
                    .separator("__")
                    .try_parsing(true),
            )
            // Variables set by the deployment stack
            .set_override_option("s3.bucket", std::env::var(LEGACY_BUCKET_VAR).ok())?
            .set_override_option("dynamodb.table_name", std::env::var(LEGACY_TABLE_VAR).ok())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.backend == Backend::Aws {
            if self.s3.bucket.trim().is_empty() {
                return Err(ConfigError::MissingField("s3.bucket".to_string()));
            }
            if self.dynamodb.table_name.trim().is_empty() {
                return Err(ConfigError::MissingField("dynamodb.table_name".to_string()));
            }
        }

        if self.images.id_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "images.id_length".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.images.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "images.call_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.s3.presigned_url_expiry_secs == 0
            || self.s3.presigned_url_expiry_secs > MAX_PRESIGNED_URL_EXPIRY_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "s3.presigned_url_expiry_secs".to_string(),
                message: format!("must be between 1 and {}", MAX_PRESIGNED_URL_EXPIRY_SECS),
            });
        }

        Ok(())
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }

    /// Get per-call storage timeout as Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.images.call_timeout_secs)
    }

    /// Settings for the image lifecycle manager
    pub fn manager_settings(&self) -> Result<ManagerSettings, ConfigError> {
        let id_generator =
            IdGenerator::new(self.images.id_length).map_err(|e| ConfigError::InvalidValue {
                field: "images.id_length".to_string(),
                message: e.to_string(),
            })?;

        Ok(ManagerSettings {
            bucket: self.s3.bucket.clone(),
            url_ttl: self.presigned_url_expiry(),
            call_timeout: self.call_timeout(),
            visibility: self.s3.object_visibility,
            id_generator,
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            mode: RunMode::default(),
            backend: Backend::default(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            presigned_url_expiry_secs: default_presigned_url_expiry_secs(),
            object_visibility: ObjectVisibility::default(),
        }
    }
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            region: default_region(),
            endpoint_url: None,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            id_length: default_id_length(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            metrics_port: None,
        }
    }
}
