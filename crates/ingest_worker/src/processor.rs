use async_nats::jetstream::Message;
use bytes::Bytes;
use pricefeed_domain::{IngestionService, OutcomeStatus, RawMessage};
use pricefeed_nats::{BatchProcessor, ProcessingResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Create a BatchProcessor that runs price documents through the ingestion
/// service and maps message outcomes onto ack/nak decisions.
///
/// A message is acked once every item in it reached a terminal outcome
/// (persisted or dead-lettered); a message with any unroutable item is
/// nak'd so JetStream redelivers it.
pub fn create_price_document_processor(service: Arc<IngestionService>) -> BatchProcessor {
    Box::new(move |messages: &[Message]| {
        let service = Arc::clone(&service);

        // Extract payloads before moving into the async block; Message
        // borrows from the slice.
        let raw_messages: Vec<RawMessage> = messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| RawMessage {
                id: msg
                    .info()
                    .map(|info| info.stream_sequence.to_string())
                    .unwrap_or_else(|_| format!("{}-{}", msg.subject, idx)),
                payload: Bytes::copy_from_slice(&msg.payload),
            })
            .collect();

        Box::pin(async move {
            let outcomes = service.process_batch(raw_messages).await;

            let mut ack = Vec::new();
            let mut nak = Vec::new();
            for (idx, outcome) in outcomes.iter().enumerate() {
                if outcome.safe_to_acknowledge() {
                    if outcome.status != OutcomeStatus::FullySucceeded {
                        debug!(
                            message_id = %outcome.message_id,
                            persisted = outcome.persisted_count(),
                            dead_lettered = outcome.dead_lettered_count(),
                            "message acknowledged with dead-lettered items"
                        );
                    }
                    ack.push(idx);
                } else {
                    warn!(
                        message_id = %outcome.message_id,
                        "message has unroutable items, leaving for redelivery"
                    );
                    nak.push((idx, Some("dead-letter delivery failed".to_string())));
                }
            }

            Ok(ProcessingResult::new(ack, nak))
        })
    })
}
