mod config;
mod telemetry;

use config::ServiceConfig;
use ingest_worker::{IngestWorker, IngestWorkerConfig};
use pricefeed_domain::{IngestionConfig, RetryPolicy};
use pricefeed_nats::NatsClient;
use pricefeed_postgres::{
    MigrationRunner, PostgresClient, PostgresConfig, PostgresPriceItemRepository,
};
use std::sync::Arc;
use std::time::Duration;
use telemetry::init_telemetry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_telemetry(&config.log_level);

    info!("Starting pricefeed-all-in-one service");
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(config).await {
        error!("Service failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Service exiting normally");
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    // PostgreSQL initialization
    info!("Initializing PostgreSQL...");
    let postgres_config = build_postgres_config(&config);
    run_postgres_migrations(&postgres_config).await?;
    let postgres_client = PostgresClient::new(
        &postgres_config.host,
        postgres_config.port,
        &postgres_config.database,
        &postgres_config.username,
        &postgres_config.password,
        postgres_config.max_pool_size,
    )?;
    postgres_client.ping().await?;
    let repository = Arc::new(PostgresPriceItemRepository::new(postgres_client));

    // NATS initialization
    info!("Initializing NATS...");
    let nats_client = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?,
    );
    nats_client
        .ensure_stream(
            &config.price_documents_stream,
            "Stream for incoming price documents",
        )
        .await?;
    nats_client
        .ensure_stream(
            &config.dead_letter_stream,
            "Stream for dead-lettered price items",
        )
        .await?;

    let worker = IngestWorker::new(
        repository,
        nats_client.clone(),
        IngestWorkerConfig {
            price_documents_stream: config.price_documents_stream.clone(),
            price_documents_subject: config.price_documents_subject.clone(),
            dead_letter_stream: config.dead_letter_stream.clone(),
            consumer_name: config.consumer_name.clone(),
            nats_batch_size: config.nats_batch_size,
            nats_batch_wait_secs: config.nats_batch_wait_secs,
            ingestion: IngestionConfig {
                call_timeout: Duration::from_secs(config.call_timeout_secs),
                max_concurrent_messages: config.max_concurrent_messages,
            },
            retry_policy: RetryPolicy {
                max_attempts: config.persist_max_attempts,
                base_backoff: Duration::from_millis(config.persist_base_backoff_ms),
                max_backoff: Duration::from_millis(config.persist_max_backoff_ms),
            },
        },
    )
    .await?;

    // Shutdown on SIGINT/SIGTERM; the worker drains its current batch before
    // returning.
    let shutdown_token = CancellationToken::new();
    spawn_signal_handlers(shutdown_token.clone());

    let result = worker.run(shutdown_token).await;

    if let Ok(client) = Arc::try_unwrap(nats_client) {
        client.close().await;
    }

    result
}

fn build_postgres_config(config: &ServiceConfig) -> PostgresConfig {
    PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
        migrations_dir: config.postgres_migrations_dir.clone(),
        goose_binary_path: config.postgres_goose_binary_path.clone(),
    }
}

async fn run_postgres_migrations(config: &PostgresConfig) -> anyhow::Result<()> {
    let runner = MigrationRunner::new(
        config.goose_binary_path.clone(),
        config.migrations_dir.clone(),
        config.dsn(),
    );
    runner.run_migrations().await
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                error!("Error setting up SIGTERM handler: {}", err);
            }
        }
    });
}
