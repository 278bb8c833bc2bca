pub mod ingest_worker;
pub mod processor;

pub use ingest_worker::{IngestWorker, IngestWorkerConfig};
pub use processor::create_price_document_processor;
