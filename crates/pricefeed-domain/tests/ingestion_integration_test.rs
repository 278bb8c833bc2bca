use pricefeed_domain::{
    IngestionConfig, IngestionService, ItemDisposition, NormalizerRegistry, OutcomeStatus,
    RawMessage, RetryPolicy, Validator,
};
use std::sync::Arc;

// In-memory fakes standing in for the Postgres repository and the NATS
// dead-letter producer.
mod fakes {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use pricefeed_domain::{
        DeadLetterEnvelope, DeadLetterPublisher, DomainResult, IngestError, NaturalKey,
        PersistOutcome, PriceItemRepository, PriceRecord, UpsertBatchInput,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mimics the store's conditional upsert: insert if absent, overwrite
    /// and refresh `updated_at` if present.
    pub struct InMemoryPriceItemRepository {
        rows: Mutex<HashMap<NaturalKey, (PriceRecord, DateTime<Utc>)>>,
    }

    impl InMemoryPriceItemRepository {
        pub fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
            }
        }

        pub fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn get(&self, key: &NaturalKey) -> Option<(PriceRecord, DateTime<Utc>)> {
            self.rows.lock().unwrap().get(key).cloned()
        }

        pub fn rows_snapshot(&self) -> Vec<(NaturalKey, PriceRecord)> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .map(|(key, (record, _))| (key.clone(), record.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl PriceItemRepository for InMemoryPriceItemRepository {
        async fn upsert_batch(&self, input: UpsertBatchInput) -> DomainResult<PersistOutcome> {
            let mut rows = self.rows.lock().unwrap();
            for record in &input.records {
                rows.insert(record.natural_key(), (record.clone(), Utc::now()));
            }
            Ok(PersistOutcome::all_persisted(input.records.len()))
        }
    }

    /// Records every delivered dead-letter envelope; optionally refuses
    /// delivery to exercise the unroutable path.
    pub struct RecordingDeadLetterPublisher {
        pub delivered: Mutex<Vec<DeadLetterEnvelope>>,
        pub fail_delivery: bool,
    }

    impl RecordingDeadLetterPublisher {
        pub fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_delivery: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_delivery: true,
            }
        }
    }

    #[async_trait]
    impl DeadLetterPublisher for RecordingDeadLetterPublisher {
        async fn publish(&self, envelope: &DeadLetterEnvelope) -> DomainResult<()> {
            if self.fail_delivery {
                return Err(IngestError::DeadLetterDelivery(
                    "broker unavailable".to_string(),
                ));
            }
            self.delivered.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }
}

use fakes::{InMemoryPriceItemRepository, RecordingDeadLetterPublisher};

fn service(
    repository: Arc<InMemoryPriceItemRepository>,
    dead_letter: Arc<RecordingDeadLetterPublisher>,
) -> IngestionService {
    IngestionService::new(
        Arc::new(NormalizerRegistry::new()),
        Validator::default(),
        repository,
        dead_letter,
        RetryPolicy::default(),
        IngestionConfig::default(),
    )
}

const CANONICAL_DOC: &str = r#"{
    "provider": "yohananof", "branch": "main", "type": "promoFull",
    "timestamp": "2025-08-12T20:29:15Z",
    "items": [
        {"product": "Example A", "price": 12.0, "unit": "unit"},
        {"product": "Example B", "price": 9.9, "unit": "unit"}
    ]
}"#;

#[tokio::test]
async fn test_canonical_scenario_inserts_two_rows() {
    let repo = Arc::new(InMemoryPriceItemRepository::new());
    let dlq = Arc::new(RecordingDeadLetterPublisher::new());
    let svc = service(repo.clone(), dlq.clone());

    let outcome = svc
        .process_message(RawMessage::new("m1", CANONICAL_DOC.as_bytes().to_vec()))
        .await;

    assert_eq!(outcome.status, OutcomeStatus::FullySucceeded);
    assert_eq!(repo.row_count(), 2);
    assert!(dlq.delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let repo = Arc::new(InMemoryPriceItemRepository::new());
    let dlq = Arc::new(RecordingDeadLetterPublisher::new());
    let svc = service(repo.clone(), dlq.clone());

    let first = svc
        .process_message(RawMessage::new("m1", CANONICAL_DOC.as_bytes().to_vec()))
        .await;
    let keys: Vec<_> = repo
        .rows_snapshot()
        .into_iter()
        .collect();

    // Redelivery of the identical message: same rows, same values
    let second = svc
        .process_message(RawMessage::new("m1-redelivered", CANONICAL_DOC.as_bytes().to_vec()))
        .await;

    assert_eq!(first.status, OutcomeStatus::FullySucceeded);
    assert_eq!(second.status, OutcomeStatus::FullySucceeded);
    assert_eq!(repo.row_count(), 2);
    for (key, record) in keys {
        let (stored, _updated_at) = repo.get(&key).unwrap();
        assert_eq!(stored, record);
    }
}

#[tokio::test]
async fn test_malformed_input_isolation() {
    let repo = Arc::new(InMemoryPriceItemRepository::new());
    let dlq = Arc::new(RecordingDeadLetterPublisher::new());
    let svc = service(repo.clone(), dlq.clone());

    let outcome = svc
        .process_message(RawMessage::new("bad", b"\x00not utf8 json\xff".to_vec()))
        .await;

    assert_eq!(outcome.status, OutcomeStatus::FullyFailed);
    assert_eq!(repo.row_count(), 0);
    assert_eq!(dlq.delivered.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_batch_isolation_and_no_silent_loss() {
    let doc = r#"{
        "provider": "p", "branch": "b", "type": "pricesFull",
        "timestamp": "2025-08-12T20:29:15Z",
        "items": [
            {"product": "Item 0", "price": 1.0},
            {"product": "Item 1", "price": -5.0},
            {"product": "Item 2", "price": 2.0},
            {"product": "Item 3", "price": 3.0}
        ]
    }"#;
    let repo = Arc::new(InMemoryPriceItemRepository::new());
    let dlq = Arc::new(RecordingDeadLetterPublisher::new());
    let svc = service(repo.clone(), dlq.clone());

    let outcome = svc
        .process_message(RawMessage::new("m1", doc.as_bytes().to_vec()))
        .await;

    assert_eq!(outcome.status, OutcomeStatus::PartiallySucceeded);
    assert_eq!(repo.row_count(), 3);

    let delivered = dlq.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].original_payload["product"], "Item 1");

    // persisted + dead-lettered == item count
    assert_eq!(outcome.persisted_count() + outcome.dead_lettered_count(), 4);
}

#[tokio::test]
async fn test_unroutable_messages_are_reported_not_dropped() {
    let repo = Arc::new(InMemoryPriceItemRepository::new());
    let dlq = Arc::new(RecordingDeadLetterPublisher::failing());
    let svc = service(repo.clone(), dlq);

    let outcome = svc
        .process_message(RawMessage::new("bad", b"{broken".to_vec()))
        .await;

    assert!(!outcome.safe_to_acknowledge());
    assert!(matches!(
        outcome.items[0].1,
        ItemDisposition::Unroutable { .. }
    ));
}

#[tokio::test]
async fn test_batch_of_mixed_messages() {
    let repo = Arc::new(InMemoryPriceItemRepository::new());
    let dlq = Arc::new(RecordingDeadLetterPublisher::new());
    let svc = service(repo.clone(), dlq.clone());

    let outcomes = svc
        .process_batch(vec![
            RawMessage::new("ok", CANONICAL_DOC.as_bytes().to_vec()),
            RawMessage::new("broken", b"not json at all".to_vec()),
        ])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].safe_to_acknowledge());
    assert!(outcomes[1].safe_to_acknowledge());
    assert_eq!(outcomes[1].status, OutcomeStatus::FullyFailed);
    assert_eq!(repo.row_count(), 2);
    assert_eq!(dlq.delivered.lock().unwrap().len(), 1);
}
