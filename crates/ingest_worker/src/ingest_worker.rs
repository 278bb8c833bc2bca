use crate::processor::create_price_document_processor;
use pricefeed_domain::{
    IngestionConfig, IngestionService, NormalizerRegistry, RetryPolicy, Validator, ValidatorConfig,
};
use pricefeed_nats::{NatsClient, NatsConsumer, NatsDeadLetterPublisher};
use pricefeed_postgres::PostgresPriceItemRepository;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct IngestWorkerConfig {
    pub price_documents_stream: String,
    pub price_documents_subject: String,
    pub dead_letter_stream: String,
    pub consumer_name: String,
    pub nats_batch_size: usize,
    pub nats_batch_wait_secs: u64,
    pub ingestion: IngestionConfig,
    pub retry_policy: RetryPolicy,
}

/// Wires the ingestion pipeline: a pull consumer on the price document
/// stream feeding the ingestion service, which persists to PostgreSQL and
/// routes failures to the dead-letter stream.
pub struct IngestWorker {
    consumer: NatsConsumer,
}

impl IngestWorker {
    pub async fn new(
        repository: Arc<PostgresPriceItemRepository>,
        nats_client: Arc<NatsClient>,
        config: IngestWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing price ingest worker");

        let dead_letter = Arc::new(NatsDeadLetterPublisher::new(
            nats_client.create_publisher_client(),
            config.dead_letter_stream.clone(),
        ));

        let service = Arc::new(IngestionService::new(
            Arc::new(NormalizerRegistry::new()),
            Validator::new(ValidatorConfig::default()),
            repository,
            dead_letter,
            config.retry_policy,
            config.ingestion,
        ));

        let processor = create_price_document_processor(service);
        let consumer = NatsConsumer::new(
            nats_client.jetstream(),
            &config.price_documents_stream,
            &config.consumer_name,
            &config.price_documents_subject,
            config.nats_batch_size,
            config.nats_batch_wait_secs,
            processor,
        )
        .await?;

        info!("Price ingest worker initialized");

        Ok(Self { consumer })
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(ctx).await
    }
}
