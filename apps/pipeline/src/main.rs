mod config;
mod db;
mod errors;
mod export;
mod ingest;
mod models;
mod notify;
mod reports;
mod routes;
mod state;
mod storage;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::ingest::processor::BatchProcessor;
use crate::ingest::queue::{MessageQueue, SqsQueue};
use crate::notify::SesNotifier;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::S3ObjectStore;
use crate::store::{PgGrantStore, PgReportingStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting grant pipeline v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;

    // Shared AWS config; clients are process-wide singletons handed to workers.
    let aws_config = load_aws_config(&config).await;
    let s3 = aws_sdk_s3::Client::new(&aws_config);
    let sqs = aws_sdk_sqs::Client::new(&aws_config);
    let ses = aws_sdk_sesv2::Client::new(&aws_config);
    info!("AWS clients initialized");

    let event_queue: Arc<dyn MessageQueue> = Arc::new(SqsQueue::new(
        sqs.clone(),
        config.grants_event_queue_url.clone(),
    ));
    let archive_queue: Arc<dyn MessageQueue> =
        Arc::new(SqsQueue::new(sqs, config.archive_queue_url.clone()));

    // Ingest side: long-lived poll loop, spawned next to the HTTP server.
    let processor = BatchProcessor::new(
        Arc::new(PgGrantStore::new(pool.clone())),
        event_queue.clone(),
    );
    let ingest_task = tokio::spawn(ingest::run_ingest_loop(
        processor,
        event_queue,
        shutdown_signal(),
    ));

    // Report/export side, behind the HTTP surface.
    let state = AppState {
        store: Arc::new(PgReportingStore::new(pool.clone())),
        db: pool,
        objects: Arc::new(S3ObjectStore::new(s3)),
        notifier: Arc::new(SesNotifier::new(
            ses,
            config.notifications_from_email.clone(),
        )),
        archive_queue,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The loop finishes its in-flight batch before exiting.
    ingest_task.await?;
    Ok(())
}

async fn load_aws_config(config: &Config) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::adaptive().with_max_attempts(3));
    if let Some(endpoint) = &config.aws_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
    }
}
