use crate::error::DomainResult;
use crate::record::PriceRecord;
use async_trait::async_trait;

/// Input for the idempotent batch upsert. All records belong to one message
/// and must be written within a single transaction-like unit.
#[derive(Debug, Clone)]
pub struct UpsertBatchInput {
    pub records: Vec<PriceRecord>,
}

/// Per-record persistence verdict, parallel to the input order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPersistence {
    Persisted,
    /// A store-level constraint rejected this record. Not retryable; the
    /// caller routes it to the dead-letter destination.
    Failed { detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub results: Vec<RecordPersistence>,
}

impl PersistOutcome {
    pub fn all_persisted(count: usize) -> Self {
        Self {
            results: vec![RecordPersistence::Persisted; count],
        }
    }

    pub fn persisted_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, RecordPersistence::Persisted))
            .count()
    }
}

/// Storage port for validated price records.
///
/// Implementations perform a conditional upsert keyed on the natural key:
/// insert if absent, overwrite stored fields and refresh `updated_at` if
/// present. Re-running the same batch must be an effective no-op.
///
/// Error contract: transient failures (connectivity, timeouts) fail the whole
/// call with [`IngestError::TransientPersistence`] so the caller can retry;
/// constraint-style failures on individual records are reported per record
/// while siblings make forward progress.
///
/// [`IngestError::TransientPersistence`]: crate::error::IngestError::TransientPersistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PriceItemRepository: Send + Sync {
    async fn upsert_batch(&self, input: UpsertBatchInput) -> DomainResult<PersistOutcome>;
}
