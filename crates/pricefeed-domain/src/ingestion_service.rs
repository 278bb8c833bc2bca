use crate::dead_letter::{DeadLetterEnvelope, DeadLetterPublisher, FailureStage};
use crate::envelope::{parse_document, RawMessage};
use crate::error::IngestError;
use crate::normalizer::{EnvelopeHeader, NormalizerRegistry};
use crate::outcome::{ItemDisposition, MessageOutcome};
use crate::record::PriceRecord;
use crate::repository::{PriceItemRepository, RecordPersistence, UpsertBatchInput};
use crate::retry::RetryPolicy;
use crate::validator::Validator;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Upper bound on each external call (persist, dead-letter publish).
    /// A persist timeout counts as a transient failure.
    pub call_timeout: Duration,
    /// Bound on messages processed concurrently within one batch.
    pub max_concurrent_messages: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            max_concurrent_messages: 4,
        }
    }
}

/// Drives one message through Intake -> Normalize -> Validate -> Upsert and
/// routes failures to the dead-letter destination.
///
/// Failure isolation is per item: one bad item never blocks its siblings,
/// and every item of every message ends up either persisted, dead-lettered,
/// or explicitly reported unroutable. Nothing is dropped silently.
pub struct IngestionService {
    registry: Arc<NormalizerRegistry>,
    validator: Validator,
    repository: Arc<dyn PriceItemRepository>,
    dead_letter: Arc<dyn DeadLetterPublisher>,
    retry_policy: RetryPolicy,
    config: IngestionConfig,
}

impl IngestionService {
    pub fn new(
        registry: Arc<NormalizerRegistry>,
        validator: Validator,
        repository: Arc<dyn PriceItemRepository>,
        dead_letter: Arc<dyn DeadLetterPublisher>,
        retry_policy: RetryPolicy,
        config: IngestionConfig,
    ) -> Self {
        Self {
            registry,
            validator,
            repository,
            dead_letter,
            retry_policy,
            config,
        }
    }

    /// Process a batch of raw messages, returning one outcome per message in
    /// input order. Messages are independent units of work and run
    /// concurrently up to the configured bound.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn process_batch(&self, messages: Vec<RawMessage>) -> Vec<MessageOutcome> {
        futures::stream::iter(messages)
            .map(|message| self.process_message(message))
            .buffered(self.config.max_concurrent_messages.max(1))
            .collect()
            .await
    }

    /// Process one message end-to-end.
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn process_message(&self, message: RawMessage) -> MessageOutcome {
        let doc = match parse_document(&message.payload) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(error = %err, "document failed intake parsing");
                let envelope =
                    DeadLetterEnvelope::for_message(&message.payload, FailureStage::Intake, &err);
                let disposition = self
                    .route(envelope, FailureStage::Intake, err.to_string())
                    .await;
                return MessageOutcome::new(message.id, vec![(0, disposition)]);
            }
        };

        let strategy = self.registry.resolve(doc.provider.as_deref());

        let header = match strategy.normalize_header(&doc) {
            Ok(header) => header,
            Err(err) => {
                // Envelope metadata is shared by every item; without it no
                // item can form a natural key, so each one dead-letters.
                warn!(error = %err, "envelope header failed normalization");
                let mut dispositions = Vec::with_capacity(doc.items.len());
                for (idx, item) in doc.items.iter().enumerate() {
                    let envelope =
                        DeadLetterEnvelope::for_item(item, FailureStage::Normalize, &err, None);
                    let disposition = self
                        .route(envelope, FailureStage::Normalize, err.to_string())
                        .await;
                    dispositions.push((idx, disposition));
                }
                return MessageOutcome::new(message.id, dispositions);
            }
        };

        // Normalize and validate each item independently
        let mut candidates: Vec<(usize, PriceRecord)> = Vec::new();
        let mut dispositions: Vec<(usize, ItemDisposition)> = Vec::new();
        for (idx, item) in doc.items.iter().enumerate() {
            match strategy
                .normalize_item(&header, item)
                .and_then(|record| self.validator.validate(&record).map(|()| record))
            {
                Ok(record) => candidates.push((idx, record)),
                Err(err) => {
                    let stage = item_failure_stage(&err);
                    debug!(index = idx, error = %err, stage = ?stage, "item rejected");
                    let envelope = DeadLetterEnvelope::for_item(item, stage, &err, Some(&header));
                    let disposition = self.route(envelope, stage, err.to_string()).await;
                    dispositions.push((idx, disposition));
                }
            }
        }

        if !candidates.is_empty() {
            let records: Vec<PriceRecord> =
                candidates.iter().map(|(_, r)| r.clone()).collect();
            let persisted = self.persist_with_retry(records).await.and_then(|outcome| {
                // A repository must report one result per record; anything
                // else would let records vanish without a disposition.
                if outcome.results.len() == candidates.len() {
                    Ok(outcome)
                } else {
                    Err(IngestError::PermanentPersistence(format!(
                        "repository returned {} results for {} records",
                        outcome.results.len(),
                        candidates.len()
                    )))
                }
            });
            match persisted {
                Ok(outcome) => {
                    for ((idx, _), result) in candidates.iter().zip(outcome.results) {
                        match result {
                            RecordPersistence::Persisted => {
                                dispositions.push((*idx, ItemDisposition::Persisted));
                            }
                            RecordPersistence::Failed { detail } => {
                                let err = IngestError::PermanentPersistence(detail);
                                let envelope = DeadLetterEnvelope::for_item(
                                    &doc.items[*idx],
                                    FailureStage::Upsert,
                                    &err,
                                    Some(&header),
                                );
                                let disposition = self
                                    .route(envelope, FailureStage::Upsert, err.to_string())
                                    .await;
                                dispositions.push((*idx, disposition));
                            }
                        }
                    }
                }
                Err(err) => {
                    // Retries exhausted or a permanent batch failure; every
                    // surviving item dead-letters at the upsert stage.
                    error!(error = %err, "batch persist failed");
                    for (idx, _) in &candidates {
                        let envelope = DeadLetterEnvelope::for_item(
                            &doc.items[*idx],
                            FailureStage::Upsert,
                            &err,
                            Some(&header),
                        );
                        let disposition = self
                            .route(envelope, FailureStage::Upsert, err.to_string())
                            .await;
                        dispositions.push((*idx, disposition));
                    }
                }
            }
        }

        dispositions.sort_by_key(|(idx, _)| *idx);
        let outcome = MessageOutcome::new(message.id, dispositions);
        debug!(
            status = ?outcome.status,
            persisted = outcome.persisted_count(),
            dead_lettered = outcome.dead_lettered_count(),
            "message processed"
        );
        outcome
    }

    /// Persist one message's validated records, retrying transient failures
    /// per the bounded policy. A call timeout counts as transient. The upsert
    /// is idempotent, so a retry after an ambiguous failure cannot duplicate
    /// rows.
    async fn persist_with_retry(
        &self,
        records: Vec<PriceRecord>,
    ) -> Result<crate::repository::PersistOutcome, IngestError> {
        let input = UpsertBatchInput { records };
        let mut attempt: u32 = 1;
        loop {
            let result = tokio::time::timeout(
                self.config.call_timeout,
                self.repository.upsert_batch(input.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(IngestError::TransientPersistence(anyhow::anyhow!(
                    "persist call exceeded {:?}",
                    self.config.call_timeout
                )))
            });

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_transient() => match self.retry_policy.backoff_after(attempt) {
                    Some(backoff) => {
                        warn!(
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %err,
                            "transient persistence failure, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(attempt, error = %err, "retry budget exhausted");
                        return Err(err);
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver a dead-letter envelope, reporting delivery failure as an
    /// unroutable disposition rather than swallowing it.
    async fn route(
        &self,
        envelope: DeadLetterEnvelope,
        stage: FailureStage,
        reason: String,
    ) -> ItemDisposition {
        let delivery = tokio::time::timeout(
            self.config.call_timeout,
            self.dead_letter.publish(&envelope),
        )
        .await
        .unwrap_or_else(|_| {
            Err(IngestError::DeadLetterDelivery(format!(
                "publish exceeded {:?}",
                self.config.call_timeout
            )))
        });

        match delivery {
            Ok(()) => ItemDisposition::DeadLettered { stage, reason },
            Err(err) => {
                error!(error = %err, stage = ?stage, "dead-letter delivery failed");
                ItemDisposition::Unroutable {
                    stage,
                    reason: format!("{reason}; dead-letter delivery failed: {err}"),
                }
            }
        }
    }
}

fn item_failure_stage(err: &IngestError) -> FailureStage {
    match err {
        IngestError::Normalization(_) => FailureStage::Normalize,
        IngestError::SchemaValidation(_) | IngestError::SemanticValidation(_) => {
            FailureStage::Validate
        }
        _ => FailureStage::Upsert,
    }
}
