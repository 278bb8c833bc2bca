use crate::error::{DomainResult, IngestError};
use crate::normalizer::EnvelopeHeader;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pipeline stage at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    Intake,
    Normalize,
    Validate,
    Upsert,
}

/// Best-effort extracted fields for triage; present when the envelope header
/// was readable at the time of failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyingFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

impl From<&EnvelopeHeader> for IdentifyingFields {
    fn from(header: &EnvelopeHeader) -> Self {
        Self {
            provider: Some(header.provider.clone()),
            branch: Some(header.branch.clone()),
            ts: Some(header.ts),
        }
    }
}

/// Record published to the dead-letter destination. Carries enough context
/// for diagnosis and replay: the failing stage, structured error kind and
/// detail, the failure time, and the smallest enclosing payload (whole
/// message for intake failures, single item otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEnvelope {
    pub stage: FailureStage,
    pub error_kind: String,
    pub error_detail: String,
    pub failed_at: DateTime<Utc>,
    pub original_payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifying_fields: Option<IdentifyingFields>,
}

impl DeadLetterEnvelope {
    /// Envelope for a whole-message failure; the raw body is carried as a
    /// string so even non-JSON payloads survive for replay.
    pub fn for_message(payload: &[u8], stage: FailureStage, error: &IngestError) -> Self {
        Self {
            stage,
            error_kind: error.kind().to_string(),
            error_detail: error.to_string(),
            failed_at: Utc::now(),
            original_payload: Value::String(String::from_utf8_lossy(payload).into_owned()),
            identifying_fields: None,
        }
    }

    /// Envelope for a single-item failure.
    pub fn for_item(
        item: &Value,
        stage: FailureStage,
        error: &IngestError,
        header: Option<&EnvelopeHeader>,
    ) -> Self {
        Self {
            stage,
            error_kind: error.kind().to_string(),
            error_detail: error.to_string(),
            failed_at: Utc::now(),
            original_payload: item.clone(),
            identifying_fields: header.map(IdentifyingFields::from),
        }
    }
}

/// Publishing port for the dead-letter destination.
///
/// A delivery failure must be reported to the caller, never swallowed; the
/// orchestrator turns it into a not-safe-to-acknowledge outcome.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, envelope: &DeadLetterEnvelope) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_serializes_to_spec_strings() {
        for (stage, expected) in [
            (FailureStage::Intake, "\"Intake\""),
            (FailureStage::Normalize, "\"Normalize\""),
            (FailureStage::Validate, "\"Validate\""),
            (FailureStage::Upsert, "\"Upsert\""),
        ] {
            assert_eq!(serde_json::to_string(&stage).unwrap(), expected);
        }
    }

    #[test]
    fn test_message_envelope_preserves_non_json_payload() {
        let err = IngestError::Parse("body is not valid JSON".to_string());
        let env = DeadLetterEnvelope::for_message(b"{broken", FailureStage::Intake, &err);
        assert_eq!(env.original_payload, json!("{broken"));
        assert_eq!(env.error_kind, "parse_error");
        assert!(env.identifying_fields.is_none());
    }

    #[test]
    fn test_item_envelope_carries_identifying_fields() {
        let header = EnvelopeHeader {
            provider: "yohananof".to_string(),
            branch: "main".to_string(),
            doc_type: "promoFull".to_string(),
            ts: "2025-08-12T20:29:15Z".parse().unwrap(),
            src_key: None,
            etag: None,
        };
        let err = IngestError::SemanticValidation("'price' must be >= 0".to_string());
        let item = json!({"product": "Bad", "price": -1});
        let env = DeadLetterEnvelope::for_item(&item, FailureStage::Validate, &err, Some(&header));

        let fields = env.identifying_fields.unwrap();
        assert_eq!(fields.provider.as_deref(), Some("yohananof"));
        assert_eq!(fields.branch.as_deref(), Some("main"));
        assert_eq!(env.original_payload, item);
    }
}
