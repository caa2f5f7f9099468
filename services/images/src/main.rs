use anyhow::{Context, Result};
use images_service::config::{Backend, Config, RunMode};
use images_service::local_server::start_api_server;
use images_service::storage::{
    dynamodb, s3, AccessUrlIssuer, DynamoMetadataStore, MemoryMetadataStore, MemoryObjectStore,
    MemoryUrlIssuer, MetadataStore, ObjectStore, S3ObjectStore, S3UrlIssuer,
};
use images_service::{ImageManager, ImagesApi};
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOCAL_BUCKET: &str = "local";

struct Backends {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    urls: Arc<dyn AccessUrlIssuer>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        mode = ?config.service.mode,
        backend = ?config.service.backend,
        "Starting images service"
    );

    let mut settings = config
        .manager_settings()
        .context("Invalid image manager settings")?;

    let backends = match config.service.backend {
        Backend::Aws => build_aws_backends(&config).await,
        Backend::Memory => {
            warn!("Using in-memory storage, images are lost on exit");
            if settings.bucket.is_empty() {
                settings.bucket = LOCAL_BUCKET.to_string();
            }
            Backends {
                objects: Arc::new(MemoryObjectStore::new()),
                metadata: Arc::new(MemoryMetadataStore::new()),
                urls: Arc::new(MemoryUrlIssuer::new()),
            }
        }
    };

    let manager = Arc::new(ImageManager::new(
        backends.objects,
        backends.metadata,
        backends.urls,
        settings,
    ));
    let api = Arc::new(ImagesApi::new(manager).context("Invalid route table")?);

    match config.service.mode {
        RunMode::Lambda => run_lambda(api).await,
        RunMode::Http => {
            if let Some(port) = config.api.metrics_port {
                init_metrics(port)?;
            }
            start_api_server(api, &config.api).await
        }
    }
}

/// S3 serves both blobs and presigned URLs from one client
async fn build_aws_backends(config: &Config) -> Backends {
    let s3_client = s3::build_client(&config.s3).await;
    let dynamo_client = dynamodb::build_client(&config.dynamodb).await;

    info!(
        bucket = %config.s3.bucket,
        table = %config.dynamodb.table_name,
        "AWS backends initialized"
    );

    Backends {
        objects: Arc::new(S3ObjectStore::new(s3_client.clone(), &config.s3.bucket)),
        metadata: Arc::new(DynamoMetadataStore::new(
            dynamo_client,
            &config.dynamodb.table_name,
        )),
        urls: Arc::new(S3UrlIssuer::new(s3_client)),
    }
}

async fn run_lambda(api: Arc<ImagesApi>) -> Result<()> {
    info!("Waiting for Lambda invocations");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let api = api.clone();
        async move { Ok::<_, lambda_runtime::Error>(api.handle_event(event.payload).await) }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("Lambda runtime error: {}", e))
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}
