pub mod dead_letter;
pub mod envelope;
pub mod error;
pub mod ingestion_service;
pub mod normalizer;
pub mod outcome;
pub mod record;
pub mod repository;
pub mod retry;
pub mod validator;

pub use dead_letter::{DeadLetterEnvelope, DeadLetterPublisher, FailureStage, IdentifyingFields};
pub use envelope::{parse_document, PriceDocument, RawMessage};
pub use error::{DomainResult, IngestError};
pub use ingestion_service::{IngestionConfig, IngestionService};
pub use normalizer::{
    DefaultProviderNormalizer, EnvelopeHeader, NormalizerRegistry, ProviderNormalizer,
};
pub use outcome::{ItemDisposition, MessageOutcome, OutcomeStatus};
pub use record::{NaturalKey, PriceRecord};
pub use repository::{PersistOutcome, PriceItemRepository, RecordPersistence, UpsertBatchInput};
pub use retry::RetryPolicy;
pub use validator::{validate_struct, Validator, ValidatorConfig};

#[cfg(any(test, feature = "testing"))]
pub use dead_letter::MockDeadLetterPublisher;
#[cfg(any(test, feature = "testing"))]
pub use repository::MockPriceItemRepository;
