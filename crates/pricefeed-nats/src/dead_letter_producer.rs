use crate::traits::JetStreamPublisher;
use async_trait::async_trait;
use pricefeed_domain::{DeadLetterEnvelope, DeadLetterPublisher, DomainResult, IngestError};
use std::sync::Arc;
use tracing::{debug, info};

/// NATS JetStream publisher for dead-letter envelopes.
///
/// Serializes envelopes to JSON and publishes to `{base_subject}.{stage}` so
/// operators can subscribe per failure stage for triage.
pub struct NatsDeadLetterPublisher {
    jetstream: Arc<dyn JetStreamPublisher>,
    base_subject: String,
}

impl NatsDeadLetterPublisher {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, base_subject: String) -> Self {
        info!(
            "Created NatsDeadLetterPublisher with base subject: {}",
            base_subject
        );
        Self {
            jetstream,
            base_subject,
        }
    }

    fn subject_for(&self, envelope: &DeadLetterEnvelope) -> String {
        let stage = match envelope.stage {
            pricefeed_domain::FailureStage::Intake => "intake",
            pricefeed_domain::FailureStage::Normalize => "normalize",
            pricefeed_domain::FailureStage::Validate => "validate",
            pricefeed_domain::FailureStage::Upsert => "upsert",
        };
        format!("{}.{}", self.base_subject, stage)
    }
}

#[async_trait]
impl DeadLetterPublisher for NatsDeadLetterPublisher {
    async fn publish(&self, envelope: &DeadLetterEnvelope) -> DomainResult<()> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| IngestError::DeadLetterDelivery(e.to_string()))?;

        let subject = self.subject_for(envelope);

        debug!(
            subject = %subject,
            error_kind = %envelope.error_kind,
            size_bytes = payload.len(),
            "Publishing dead-letter envelope"
        );

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| IngestError::DeadLetterDelivery(e.to_string()))?;

        info!(
            subject = %subject,
            error_kind = %envelope.error_kind,
            "Successfully published dead-letter envelope"
        );

        Ok(())
    }
}
