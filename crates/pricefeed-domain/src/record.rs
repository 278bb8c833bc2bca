use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical price record, the unit of persistence.
///
/// Constructed by the normalizer from one envelope item, checked by the
/// validator, written by the repository via an idempotent conditional upsert
/// keyed on [`NaturalKey`]. `updated_at` is assigned by the store on write
/// and is deliberately absent here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
pub struct PriceRecord {
    #[garde(length(min = 1))]
    pub provider: String,
    #[garde(length(min = 1))]
    pub branch: String,
    #[garde(length(min = 1))]
    pub doc_type: String,
    #[garde(skip)]
    pub ts: DateTime<Utc>,
    #[garde(length(min = 1))]
    pub product: String,
    #[garde(length(min = 1))]
    pub unit: String,
    #[garde(skip)]
    pub price: Decimal,
    #[garde(skip)]
    pub src_key: Option<String>,
    #[garde(skip)]
    pub etag: Option<String>,
}

impl PriceRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            provider: self.provider.clone(),
            branch: self.branch.clone(),
            doc_type: self.doc_type.clone(),
            ts: self.ts,
            product: self.product.clone(),
        }
    }
}

/// The uniqueness constraint for persisted records:
/// (provider, branch, doc_type, ts, product).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub provider: String,
    pub branch: String,
    pub doc_type: String,
    pub ts: DateTime<Utc>,
    pub product: String,
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.provider,
            self.branch,
            self.doc_type,
            self.ts.to_rfc3339(),
            self.product
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn record() -> PriceRecord {
        PriceRecord {
            provider: "yohananof".to_string(),
            branch: "main".to_string(),
            doc_type: "promoFull".to_string(),
            ts: "2025-08-12T20:29:15Z".parse().unwrap(),
            product: "Example A".to_string(),
            unit: "unit".to_string(),
            price: Decimal::from_f64(12.0).unwrap(),
            src_key: None,
            etag: None,
        }
    }

    #[test]
    fn test_natural_key_ignores_non_key_fields() {
        let a = record();
        let mut b = record();
        b.price = Decimal::from_f64(9.9).unwrap();
        b.unit = "kg".to_string();
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_natural_key_display() {
        let key = record().natural_key();
        assert_eq!(
            key.to_string(),
            "yohananof/main/promoFull/2025-08-12T20:29:15+00:00/Example A"
        );
    }
}
