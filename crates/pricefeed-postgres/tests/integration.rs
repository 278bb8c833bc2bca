use pricefeed_domain::{
    PriceItemRepository, PriceRecord, RecordPersistence, UpsertBatchInput,
};
use pricefeed_postgres::{PostgresClient, PostgresPriceItemRepository};
use rust_decimal::Decimal;
use std::str::FromStr;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

const MIGRATION: &str = include_str!("../migrations/00001_create_price_items.sql");

async fn start_postgres() -> (
    testcontainers::ContainerAsync<Postgres>,
    PostgresClient,
    PostgresPriceItemRepository,
) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let client = PostgresClient::new(
        &host.to_string(),
        port,
        "postgres",
        "postgres",
        "postgres",
        5,
    )
    .unwrap();
    client.ping().await.unwrap();

    // Apply the up-section of the migration directly; goose is not required
    // inside the test environment.
    let up_sql = MIGRATION
        .split("-- +goose Down")
        .next()
        .unwrap();
    let conn = client.get_connection().await.unwrap();
    conn.batch_execute(up_sql).await.unwrap();

    let repository = PostgresPriceItemRepository::new(client.clone());
    (postgres, client, repository)
}

fn record(product: &str, price: &str) -> PriceRecord {
    PriceRecord {
        provider: "yohananof".to_string(),
        branch: "main".to_string(),
        doc_type: "promoFull".to_string(),
        ts: "2025-08-12T20:29:15Z".parse().unwrap(),
        product: product.to_string(),
        unit: "unit".to_string(),
        price: Decimal::from_str(price).unwrap(),
        src_key: Some("prices/yohananof/main.json".to_string()),
        etag: Some("\"abc123\"".to_string()),
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_postgres_connection() {
    let (_container, client, _repo) = start_postgres().await;
    client.ping().await.unwrap();
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_upsert_is_idempotent() {
    let (_container, _client, repo) = start_postgres().await;

    let input = UpsertBatchInput {
        records: vec![record("Example A", "12.0"), record("Example B", "9.9")],
    };

    let first = repo.upsert_batch(input.clone()).await.unwrap();
    assert_eq!(first.persisted_count(), 2);
    assert_eq!(repo.count().await.unwrap(), 2);

    let stored_before = repo
        .get_item(&input.records[0].natural_key())
        .await
        .unwrap()
        .unwrap();

    // Redelivery of the identical batch: no new rows, values unchanged,
    // updated_at may advance
    let second = repo.upsert_batch(input.clone()).await.unwrap();
    assert_eq!(second.persisted_count(), 2);
    assert_eq!(repo.count().await.unwrap(), 2);

    let stored_after = repo
        .get_item(&input.records[0].natural_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_after.price, stored_before.price);
    assert_eq!(stored_after.unit, stored_before.unit);
    assert!(stored_after.updated_at >= stored_before.updated_at);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_reprocessing_with_new_values_overwrites() {
    let (_container, _client, repo) = start_postgres().await;

    repo.upsert_batch(UpsertBatchInput {
        records: vec![record("Example A", "12.0")],
    })
    .await
    .unwrap();

    // Corrected price for the same natural key
    let mut corrected = record("Example A", "11.5");
    corrected.etag = Some("\"def456\"".to_string());
    repo.upsert_batch(UpsertBatchInput {
        records: vec![corrected.clone()],
    })
    .await
    .unwrap();

    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo
        .get_item(&corrected.natural_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.price, Decimal::from_str("11.5").unwrap());
    assert_eq!(stored.etag.as_deref(), Some("\"def456\""));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_natural_key_uniqueness_across_batches() {
    let (_container, _client, repo) = start_postgres().await;

    for price in ["1.0", "2.0", "3.0"] {
        repo.upsert_batch(UpsertBatchInput {
            records: vec![record("Example A", price), record("Example B", price)],
        })
        .await
        .unwrap();
    }

    assert_eq!(repo.count().await.unwrap(), 2);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_constraint_failure_excludes_record_and_spares_siblings() {
    let (_container, client, repo) = start_postgres().await;

    // Tighten the schema so one record trips a store-level constraint the
    // pipeline's own validation would not have caught.
    let conn = client.get_connection().await.unwrap();
    conn.batch_execute("ALTER TABLE price_items ADD CONSTRAINT price_nonneg CHECK (price >= 0)")
        .await
        .unwrap();

    let outcome = repo
        .upsert_batch(UpsertBatchInput {
            records: vec![
                record("Good A", "1.0"),
                record("Bad", "-5.0"),
                record("Good B", "2.0"),
            ],
        })
        .await
        .unwrap();

    assert_eq!(outcome.results[0], RecordPersistence::Persisted);
    assert!(matches!(
        outcome.results[1],
        RecordPersistence::Failed { .. }
    ));
    assert_eq!(outcome.results[2], RecordPersistence::Persisted);
    assert_eq!(repo.count().await.unwrap(), 2);
}
