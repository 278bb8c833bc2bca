use crate::error::{DomainResult, IngestError};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

/// One queue message as handed over by the transport layer: an opaque
/// reference for acknowledgment bookkeeping plus the raw body bytes.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

/// Wire shape of a provider price document.
///
/// Header fields are typed strings per the published contract; items stay as
/// raw JSON values so that one malformed item cannot fail deserialization of
/// its siblings. Item-level interpretation belongs to the normalizer.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceDocument {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub items: Vec<Value>,
    /// Document-level change-tracking tokens; items may carry their own,
    /// which take precedence.
    #[serde(default)]
    pub src_key: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
}

/// Parse raw message bytes into a [`PriceDocument`].
///
/// Tolerates a UTF-8 BOM and one level of double-encoded JSON (a JSON string
/// whose content is itself a JSON document), both of which occur in provider
/// uploads. Any structural failure is whole-message fatal.
pub fn parse_document(payload: &[u8]) -> DomainResult<PriceDocument> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| IngestError::Parse(format!("body is not valid UTF-8: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let mut value: Value = serde_json::from_str(text)
        .map_err(|e| IngestError::Parse(format!("body is not valid JSON: {e}")))?;

    // Unwrap double-encoded documents
    if let Value::String(inner) = value {
        let inner = inner.trim_start_matches('\u{feff}');
        value = serde_json::from_str(inner)
            .map_err(|e| IngestError::Parse(format!("double-encoded body is not valid JSON: {e}")))?;
    }

    if !value.is_object() {
        return Err(IngestError::Parse("document must be an object".to_string()));
    }

    let doc: PriceDocument = serde_json::from_value(value)
        .map_err(|e| IngestError::Parse(format!("document shape invalid: {e}")))?;

    if doc.items.is_empty() {
        return Err(IngestError::Parse(
            "'items' must be a non-empty array".to_string(),
        ));
    }

    Ok(doc)
}
