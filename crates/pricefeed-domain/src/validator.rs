use crate::error::{DomainResult, IngestError};
use crate::record::PriceRecord;
use chrono::{DateTime, Duration, Utc};
use garde::{Report, Validate};

/// Bounds for the semantic checks.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Records timestamped before this instant are considered corrupt.
    pub min_ts: DateTime<Utc>,
    /// Allowed clock skew into the future.
    pub max_future_skew: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            // 2000-01-01T00:00:00Z
            min_ts: DateTime::from_timestamp(946_684_800, 0)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            max_future_skew: Duration::hours(48),
        }
    }
}

/// Checks canonical records against schema and semantic rules.
///
/// Deterministic and side-effect-free; the verdict for one record never
/// depends on other records.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, record: &PriceRecord) -> DomainResult<()> {
        validate_struct(record)?;

        // Normalizer strategies are expected to trim, but a whitespace-only
        // key field must never reach the natural key regardless.
        for (name, value) in [("product", &record.product), ("unit", &record.unit)] {
            if value.trim().is_empty() {
                return Err(IngestError::SemanticValidation(format!(
                    "'{name}' must be non-empty after trimming"
                )));
            }
        }
        if record.price.is_sign_negative() {
            return Err(IngestError::SemanticValidation(format!(
                "'price' must be >= 0, got {}",
                record.price
            )));
        }
        if record.ts < self.config.min_ts {
            return Err(IngestError::SemanticValidation(format!(
                "'ts' {} predates the accepted epoch {}",
                record.ts.to_rfc3339(),
                self.config.min_ts.to_rfc3339()
            )));
        }
        let max_ts = Utc::now() + self.config.max_future_skew;
        if record.ts > max_ts {
            return Err(IngestError::SemanticValidation(format!(
                "'ts' {} is too far in the future",
                record.ts.to_rfc3339()
            )));
        }

        Ok(())
    }
}

/// Convert a garde validation report into a schema validation error.
pub fn validate_struct<T>(value: &T) -> Result<(), IngestError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| IngestError::SchemaValidation(format_validation_errors(&report)))
}

fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            if path.to_string().is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn record() -> PriceRecord {
        PriceRecord {
            provider: "yohananof".to_string(),
            branch: "main".to_string(),
            doc_type: "promoFull".to_string(),
            ts: "2025-08-12T20:29:15Z".parse().unwrap(),
            product: "Example A".to_string(),
            unit: "unit".to_string(),
            price: Decimal::from_str("12.0").unwrap(),
            src_key: None,
            etag: None,
        }
    }

    #[test]
    fn test_valid_record_passes() {
        assert!(Validator::default().validate(&record()).is_ok());
    }

    #[test]
    fn test_empty_fields_fail_schema_check() {
        for field in ["provider", "branch", "doc_type", "product", "unit"] {
            let mut rec = record();
            match field {
                "provider" => rec.provider.clear(),
                "branch" => rec.branch.clear(),
                "doc_type" => rec.doc_type.clear(),
                "product" => rec.product.clear(),
                _ => rec.unit.clear(),
            }
            let err = Validator::default().validate(&rec).unwrap_err();
            assert!(
                matches!(err, IngestError::SchemaValidation(_)),
                "empty {field} accepted"
            );
            assert!(err.to_string().contains(field));
        }
    }

    #[test]
    fn test_whitespace_only_fields_fail_semantic_check() {
        let mut rec = record();
        rec.product = "   ".to_string();
        let err = Validator::default().validate(&rec).unwrap_err();
        assert!(
            matches!(err, IngestError::SemanticValidation(_)),
            "whitespace-only product accepted"
        );
        assert!(err.to_string().contains("product"));

        let mut rec = record();
        rec.unit = "\t".to_string();
        let err = Validator::default().validate(&rec).unwrap_err();
        assert!(
            matches!(err, IngestError::SemanticValidation(_)),
            "whitespace-only unit accepted"
        );
        assert!(err.to_string().contains("unit"));
    }

    #[test]
    fn test_negative_price_fails_semantic_check() {
        let mut rec = record();
        rec.price = Decimal::from_str("-0.01").unwrap();
        let err = Validator::default().validate(&rec).unwrap_err();
        assert!(matches!(err, IngestError::SemanticValidation(_)));
    }

    #[test]
    fn test_timestamp_window() {
        let mut rec = record();
        rec.ts = "1999-12-31T23:59:59Z".parse().unwrap();
        assert!(matches!(
            Validator::default().validate(&rec).unwrap_err(),
            IngestError::SemanticValidation(_)
        ));

        let mut rec = record();
        rec.ts = Utc::now() + Duration::days(30);
        assert!(matches!(
            Validator::default().validate(&rec).unwrap_err(),
            IngestError::SemanticValidation(_)
        ));

        // Modest future skew is tolerated
        let mut rec = record();
        rec.ts = Utc::now() + Duration::hours(1);
        assert!(Validator::default().validate(&rec).is_ok());
    }

    #[test]
    fn test_order_independence() {
        let a = record();
        let mut b = record();
        b.product = "Example B".to_string();
        let validator = Validator::default();
        let forward = (validator.validate(&a).is_ok(), validator.validate(&b).is_ok());
        let reverse = (validator.validate(&b).is_ok(), validator.validate(&a).is_ok());
        assert_eq!(forward, (reverse.1, reverse.0));
    }
}
