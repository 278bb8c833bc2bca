use chrono::{DateTime, Utc};
use pricefeed_domain::PriceRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

/// `price_items` row with the store-assigned write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceItemRow {
    pub provider: String,
    pub branch: String,
    pub doc_type: String,
    pub ts: DateTime<Utc>,
    pub product: String,
    pub unit: String,
    pub price: Decimal,
    pub src_key: Option<String>,
    pub etag: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for PriceItemRow {
    fn from(row: &Row) -> Self {
        Self {
            provider: row.get("provider"),
            branch: row.get("branch"),
            doc_type: row.get("doc_type"),
            ts: row.get("ts"),
            product: row.get("product"),
            unit: row.get("unit"),
            price: row.get("price"),
            src_key: row.get("src_key"),
            etag: row.get("etag"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<PriceItemRow> for PriceRecord {
    fn from(row: PriceItemRow) -> Self {
        PriceRecord {
            provider: row.provider,
            branch: row.branch,
            doc_type: row.doc_type,
            ts: row.ts,
            product: row.product,
            unit: row.unit,
            price: row.price,
            src_key: row.src_key,
            etag: row.etag,
        }
    }
}
