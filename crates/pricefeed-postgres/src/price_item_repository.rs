use crate::client::PostgresClient;
use crate::models::PriceItemRow;
use async_trait::async_trait;
use pricefeed_domain::{
    DomainResult, IngestError, NaturalKey, PersistOutcome, PriceItemRepository, PriceRecord,
    RecordPersistence, UpsertBatchInput,
};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

const UPSERT_SQL: &str = "\
    INSERT INTO price_items (provider, branch, doc_type, ts, product, unit, price, src_key, etag)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (provider, branch, doc_type, ts, product)
    DO UPDATE SET
      unit       = EXCLUDED.unit,
      price      = EXCLUDED.price,
      src_key    = EXCLUDED.src_key,
      etag       = EXCLUDED.etag,
      updated_at = NOW()";

/// How one write attempt failed.
enum AttemptFailure {
    /// Connectivity-class failure; the whole batch is retryable.
    Transient(anyhow::Error),
    /// A store constraint rejected exactly one record.
    Constraint { index: usize, detail: String },
}

/// PostgreSQL implementation of [`PriceItemRepository`].
///
/// All records of one message are written inside a single transaction via
/// the conditional upsert on the natural key. A constraint failure on one
/// record rolls the transaction back, excludes that record, and retries the
/// remainder so siblings always make forward progress.
#[derive(Clone)]
pub struct PostgresPriceItemRepository {
    client: PostgresClient,
}

impl PostgresPriceItemRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn try_upsert(
        &self,
        records: &[PriceRecord],
        excluded: &HashMap<usize, String>,
    ) -> Result<(), AttemptFailure> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(AttemptFailure::Transient)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| AttemptFailure::Transient(e.into()))?;

        for (index, record) in records.iter().enumerate() {
            if excluded.contains_key(&index) {
                continue;
            }
            if let Err(e) = tx
                .execute(
                    UPSERT_SQL,
                    &[
                        &record.provider,
                        &record.branch,
                        &record.doc_type,
                        &record.ts,
                        &record.product,
                        &record.unit,
                        &record.price,
                        &record.src_key,
                        &record.etag,
                    ],
                )
                .await
            {
                // Dropping the transaction rolls it back
                return Err(classify(index, e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| AttemptFailure::Transient(e.into()))
    }

    /// Current row for a natural key, if any.
    pub async fn get_item(&self, key: &NaturalKey) -> DomainResult<Option<PriceItemRow>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(IngestError::TransientPersistence)?;
        let row = conn
            .query_opt(
                "SELECT provider, branch, doc_type, ts, product, unit, price, src_key, etag, updated_at
                 FROM price_items
                 WHERE provider = $1 AND branch = $2 AND doc_type = $3 AND ts = $4 AND product = $5",
                &[&key.provider, &key.branch, &key.doc_type, &key.ts, &key.product],
            )
            .await
            .map_err(|e| IngestError::TransientPersistence(e.into()))?;
        Ok(row.as_ref().map(PriceItemRow::from))
    }

    pub async fn count(&self) -> DomainResult<i64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(IngestError::TransientPersistence)?;
        let row = conn
            .query_one("SELECT COUNT(*) FROM price_items", &[])
            .await
            .map_err(|e| IngestError::TransientPersistence(e.into()))?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl PriceItemRepository for PostgresPriceItemRepository {
    #[instrument(skip(self, input), fields(record_count = input.records.len()))]
    async fn upsert_batch(&self, input: UpsertBatchInput) -> DomainResult<PersistOutcome> {
        if input.records.is_empty() {
            return Ok(PersistOutcome::all_persisted(0));
        }

        let mut excluded: HashMap<usize, String> = HashMap::new();
        loop {
            match self.try_upsert(&input.records, &excluded).await {
                Ok(()) => break,
                Err(AttemptFailure::Transient(e)) => {
                    return Err(IngestError::TransientPersistence(e));
                }
                Err(AttemptFailure::Constraint { index, detail }) => {
                    warn!(
                        index,
                        detail = %detail,
                        "record rejected by store constraint, excluding and retrying batch"
                    );
                    excluded.insert(index, detail);
                }
            }
        }

        let results = (0..input.records.len())
            .map(|index| match excluded.remove(&index) {
                Some(detail) => RecordPersistence::Failed { detail },
                None => RecordPersistence::Persisted,
            })
            .collect::<Vec<_>>();

        let outcome = PersistOutcome { results };
        debug!(
            persisted = outcome.persisted_count(),
            rejected = input.records.len() - outcome.persisted_count(),
            "batch upsert complete"
        );
        Ok(outcome)
    }
}

/// SQLSTATE classes 22 (data exception) and 23 (integrity constraint) mark
/// the statement's record as permanently unpersistable; anything else is
/// treated as connectivity and retried at batch granularity.
fn classify(index: usize, error: tokio_postgres::Error) -> AttemptFailure {
    if let Some(db_err) = error.as_db_error() {
        let code = db_err.code().code();
        if code.starts_with("22") || code.starts_with("23") {
            return AttemptFailure::Constraint {
                index,
                detail: format!("{} ({})", db_err.message(), code),
            };
        }
    }
    AttemptFailure::Transient(error.into())
}
