use thiserror::Error;

pub type DomainResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed document: {0}")]
    Parse(String),

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Semantic validation failed: {0}")]
    SemanticValidation(String),

    #[error("Transient persistence failure: {0}")]
    TransientPersistence(#[source] anyhow::Error),

    #[error("Permanent persistence failure: {0}")]
    PermanentPersistence(String),

    #[error("Dead-letter delivery failed: {0}")]
    DeadLetterDelivery(String),
}

impl IngestError {
    /// Stable machine-readable kind, carried on dead-letter envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Parse(_) => "parse_error",
            IngestError::Normalization(_) => "normalization_error",
            IngestError::SchemaValidation(_) => "schema_validation_error",
            IngestError::SemanticValidation(_) => "semantic_validation_error",
            IngestError::TransientPersistence(_) => "transient_persistence_error",
            IngestError::PermanentPersistence(_) => "permanent_persistence_error",
            IngestError::DeadLetterDelivery(_) => "dead_letter_delivery_error",
        }
    }

    /// Transient failures are the only retryable class.
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::TransientPersistence(_))
    }
}
