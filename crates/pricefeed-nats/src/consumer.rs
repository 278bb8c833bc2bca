use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer, Message};
use futures::{future::BoxFuture, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-message acknowledgment decisions for one fetched batch.
///
/// Indices refer to positions in the batch handed to the processor. A message
/// left out of both lists stays un-acked and redelivers after its ack wait.
#[derive(Debug)]
pub struct ProcessingResult {
    /// Messages that reached a terminal outcome and must be acknowledged
    pub ack: Vec<usize>,
    /// Messages to reject (Nak) for redelivery, with optional error details
    pub nak: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            nak: Vec::new(),
        }
    }

    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count).map(|i| (i, error.clone())).collect(),
        }
    }

    pub fn new(ack: Vec<usize>, nak: Vec<(usize, Option<String>)>) -> Self {
        Self { ack, nak }
    }
}

/// Batch processor invoked for each fetched batch of raw NATS messages.
/// Deserialization and pipeline logic live behind this boundary; the consumer
/// only fetches and settles acknowledgments.
pub type BatchProcessor =
    Box<dyn Fn(&[Message]) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Pull-based JetStream consumer driving the ingestion loop.
pub struct NatsConsumer {
    consumer: PullConsumer,
    batch_size: usize,
    max_wait: Duration,
    processor: BatchProcessor,
}

impl NatsConsumer {
    pub async fn new(
        jetstream: &jetstream::Context,
        stream_name: &str,
        consumer_name: &str,
        subject_filter: &str,
        batch_size: usize,
        max_wait_secs: u64,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = stream_name,
            consumer = consumer_name,
            subject = subject_filter,
            "Creating JetStream consumer"
        );

        // Durable consumer with explicit acks: anything not acked redelivers
        let consumer = jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(consumer_name.to_string()),
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: subject_filter.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
                stream_name,
            )
            .await
            .context("Failed to create consumer")?;

        info!(
            stream = stream_name,
            consumer = consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            batch_size,
            max_wait: Duration::from_secs(max_wait_secs),
            processor,
        })
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!("Starting consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error processing batch");
                        // Continue processing despite errors
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.batch_size)
            .expires(self.max_wait)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut raw_messages = Vec::new();
        while let Some(result) = messages.next().await {
            match result {
                Ok(msg) => raw_messages.push(msg),
                Err(e) => {
                    warn!(error = %e, "Error receiving message from batch");
                }
            }
        }

        if raw_messages.is_empty() {
            return Ok(());
        }

        debug!(message_count = raw_messages.len(), "Received message batch");

        let processing_result = match (self.processor)(&raw_messages).await {
            Ok(result) => result,
            Err(e) => {
                // A processor-level error means no message reached a terminal
                // outcome; Nak the whole batch for redelivery.
                error!(error = %e, "Processor returned error, rejecting all messages");
                ProcessingResult::nak_all(raw_messages.len(), Some(e.to_string()))
            }
        };

        self.settle(&raw_messages, processing_result).await;
        Ok(())
    }

    async fn settle(&self, raw_messages: &[Message], result: ProcessingResult) {
        let ack_count = result.ack.len();
        for idx in result.ack {
            if let Some(msg) = raw_messages.get(idx) {
                if let Err(e) = msg.ack().await {
                    error!(error = %e, message_index = idx, "Failed to acknowledge message");
                }
            } else {
                warn!(
                    message_index = idx,
                    batch_size = raw_messages.len(),
                    "Invalid ack index in ProcessingResult"
                );
            }
        }
        if ack_count > 0 {
            debug!(ack_count, "Acknowledged messages");
        }

        let nak_count = result.nak.len();
        for (idx, error_msg) in result.nak {
            if let Some(msg) = raw_messages.get(idx) {
                warn!(
                    message_index = idx,
                    subject = %msg.subject,
                    error = error_msg.as_deref().unwrap_or("unspecified"),
                    "Rejecting message for redelivery"
                );
                if let Err(e) = msg.ack_with(jetstream::AckKind::Nak(None)).await {
                    error!(error = %e, message_index = idx, "Failed to reject message");
                }
            } else {
                warn!(
                    message_index = idx,
                    batch_size = raw_messages.len(),
                    "Invalid nak index in ProcessingResult"
                );
            }
        }
        if nak_count > 0 {
            debug!(nak_count, "Rejected messages for redelivery");
        }
    }
}
