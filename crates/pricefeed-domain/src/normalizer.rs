use crate::envelope::PriceDocument;
use crate::error::{DomainResult, IngestError};
use crate::record::PriceRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_BRANCH: &str = "default";
const DEFAULT_UNIT: &str = "unit";
const DEFAULT_DOC_TYPE: &str = "pricesFull";
const ALLOWED_DOC_TYPES: [&str; 2] = ["pricesFull", "promoFull"];

/// Envelope-level fields after normalization, shared by every item of one
/// document.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeHeader {
    pub provider: String,
    pub branch: String,
    pub doc_type: String,
    pub ts: DateTime<Utc>,
    pub src_key: Option<String>,
    pub etag: Option<String>,
}

/// Provider-specific normalization strategy.
///
/// One implementation per provider family; the registry selects a strategy
/// once per envelope. Implementations are pure and total over well-formed
/// input, and an item failure must never depend on sibling items.
pub trait ProviderNormalizer: Send + Sync {
    /// Normalize the envelope metadata shared by all items.
    fn normalize_header(&self, doc: &PriceDocument) -> DomainResult<EnvelopeHeader>;

    /// Normalize one raw item payload into a canonical record.
    fn normalize_item(&self, header: &EnvelopeHeader, item: &Value) -> DomainResult<PriceRecord>;
}

/// Canonical normalization rules shared by all current providers.
#[derive(Debug, Default, Clone)]
pub struct DefaultProviderNormalizer;

impl DefaultProviderNormalizer {
    fn canonical_doc_type(raw: Option<&str>) -> String {
        let trimmed = raw.unwrap_or_default().trim();
        if ALLOWED_DOC_TYPES.contains(&trimmed) {
            trimmed.to_string()
        } else {
            DEFAULT_DOC_TYPE.to_string()
        }
    }

    fn parse_timestamp(raw: Option<&str>) -> DomainResult<DateTime<Utc>> {
        let trimmed = raw.unwrap_or_default().trim();
        if trimmed.is_empty() {
            // Providers occasionally omit the capture time; stamping the
            // ingest time preserves the record instead of losing it.
            return Ok(Utc::now());
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }
        // Offset-less timestamps are interpreted as UTC
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(naive.and_utc());
        }
        Err(IngestError::Normalization(format!(
            "'timestamp' is not a valid ISO-8601 instant: {trimmed:?}"
        )))
    }

    fn coerce_price(raw: &Value) -> DomainResult<Decimal> {
        let parsed = match raw {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        let price = parsed.ok_or_else(|| {
            IngestError::Normalization(format!("'price' is not coercible to a decimal: {raw}"))
        })?;
        if price.is_sign_negative() {
            return Err(IngestError::Normalization(format!(
                "'price' must be a non-negative decimal, got {price}"
            )));
        }
        Ok(price)
    }

    fn text_field(item: &serde_json::Map<String, Value>, name: &str) -> DomainResult<Option<String>> {
        match item.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(other) => Err(IngestError::Normalization(format!(
                "'{name}' must be a string, got {other}"
            ))),
        }
    }
}

impl ProviderNormalizer for DefaultProviderNormalizer {
    fn normalize_header(&self, doc: &PriceDocument) -> DomainResult<EnvelopeHeader> {
        let provider = doc
            .provider
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let branch = {
            let trimmed = doc.branch.as_deref().unwrap_or_default().trim();
            if trimmed.is_empty() {
                DEFAULT_BRANCH.to_string()
            } else {
                trimmed.to_string()
            }
        };

        Ok(EnvelopeHeader {
            provider,
            branch,
            doc_type: Self::canonical_doc_type(doc.doc_type.as_deref()),
            ts: Self::parse_timestamp(doc.timestamp.as_deref())?,
            src_key: doc
                .src_key
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            etag: doc
                .etag
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    fn normalize_item(&self, header: &EnvelopeHeader, item: &Value) -> DomainResult<PriceRecord> {
        let fields = item.as_object().ok_or_else(|| {
            IngestError::Normalization(format!("item must be an object, got {item}"))
        })?;

        let product = Self::text_field(fields, "product")?.ok_or_else(|| {
            IngestError::Normalization("'product' is missing".to_string())
        })?;

        let unit = match Self::text_field(fields, "unit")? {
            Some(u) if !u.is_empty() => u.to_lowercase(),
            _ => DEFAULT_UNIT.to_string(),
        };

        let price = Self::coerce_price(fields.get("price").ok_or_else(|| {
            IngestError::Normalization("'price' is missing".to_string())
        })?)?;

        // Item-level change-tracking tokens win over document-level ones
        let src_key = Self::text_field(fields, "src_key")?
            .filter(|s| !s.is_empty())
            .or_else(|| header.src_key.clone());
        let etag = Self::text_field(fields, "etag")?
            .filter(|s| !s.is_empty())
            .or_else(|| header.etag.clone());

        Ok(PriceRecord {
            provider: header.provider.clone(),
            branch: header.branch.clone(),
            doc_type: header.doc_type.clone(),
            ts: header.ts,
            product,
            unit,
            price,
            src_key,
            etag,
        })
    }
}

/// Maps provider ids to normalization strategies.
///
/// The strategy is resolved once per envelope from the raw provider field;
/// unknown providers fall back to the default strategy.
pub struct NormalizerRegistry {
    strategies: HashMap<String, Arc<dyn ProviderNormalizer>>,
    default_strategy: Arc<dyn ProviderNormalizer>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            default_strategy: Arc::new(DefaultProviderNormalizer),
        }
    }

    /// Register a provider-specific strategy, replacing any previous one.
    pub fn with_strategy(
        mut self,
        provider: impl Into<String>,
        strategy: Arc<dyn ProviderNormalizer>,
    ) -> Self {
        self.strategies
            .insert(provider.into().trim().to_lowercase(), strategy);
        self
    }

    pub fn resolve(&self, provider: Option<&str>) -> &Arc<dyn ProviderNormalizer> {
        provider
            .map(|p| p.trim().to_lowercase())
            .and_then(|p| self.strategies.get(&p))
            .unwrap_or(&self.default_strategy)
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
